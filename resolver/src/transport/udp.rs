use std::collections::VecDeque;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::rc::Rc;

use collections::bytes::Bytes;
use log::warn;
use runtime::event_loop::{EventLoop, Monitor, WatchId, READABLE};

/// Per-notification `recvfrom` budget, so draining one socket's buffer never starves the others.
const RECV_BUDGET: usize = 1024;
const DATAGRAM_MAX: usize = 65535;

struct Socket {
	socket: UdpSocket,
	watch: WatchId,
	subscribers: usize,
	backlog: VecDeque<(IpAddr, Bytes)>,
}

/// A pool of non-blocking UDP sockets. Lazily opened up to `floor`; once at `floor` the send
/// cursor just cycles between existing sockets, never opening more.
pub struct UdpPool {
	floor: usize,
	sockets: Vec<Socket>,
	current: usize,
	rcvbuf: Option<usize>,
	sndbuf: Option<usize>,
}

impl UdpPool {
	pub fn new(floor: usize) -> Self {
		UdpPool { floor: floor.max(1), sockets: Vec::new(), current: 0, rcvbuf: None, sndbuf: None }
	}

	pub fn set_buffer_sizes(&mut self, rcvbuf: Option<usize>, sndbuf: Option<usize>) {
		self.rcvbuf = rcvbuf;
		self.sndbuf = sndbuf;
	}

	/// Picks the socket to send on (opening one if below `floor`), sends `query`, and returns the
	/// socket index the caller should subscribe against.
	pub fn send(&mut self, peer: SocketAddr, query: &[u8], event_loop: &mut dyn EventLoop, monitor_for: impl Fn(usize) -> Rc<dyn Monitor>) -> io::Result<usize> {
		let index = self.select(peer.ip(), event_loop, monitor_for)?;
		self.sockets[index].socket.send_to(query, peer)?;
		Ok(index)
	}

	fn select(&mut self, peer: IpAddr, event_loop: &mut dyn EventLoop, monitor_for: impl Fn(usize) -> Rc<dyn Monitor>) -> io::Result<usize> {
		if self.sockets.len() < self.floor {
			self.open(peer, event_loop, monitor_for)?;
			return Ok(self.current);
		}

		if let Some(idx) = self.sockets.iter().position(|s| s.subscribers == 0) {
			self.current = idx;
		}

		Ok(self.current)
	}

	fn open(&mut self, peer: IpAddr, event_loop: &mut dyn EventLoop, monitor_for: impl Fn(usize) -> Rc<dyn Monitor>) -> io::Result<()> {
		let bind: SocketAddr = match peer {
			IpAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
			IpAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
		};

		let socket = open_socket(bind, self.rcvbuf, self.sndbuf)?;

		let index = self.sockets.len();
		let watch = event_loop.add(runtime::raw_fd(&socket), READABLE, monitor_for(index));

		self.sockets.push(Socket { socket, watch, subscribers: 0, backlog: VecDeque::new() });
		self.current = index;

		Ok(())
	}

	pub fn note_subscribed(&mut self, index: usize) {
		if let Some(s) = self.sockets.get_mut(index) {
			s.subscribers += 1;
		}
	}

	pub fn note_unsubscribed(&mut self, index: usize) {
		if let Some(s) = self.sockets.get_mut(index) {
			s.subscribers = s.subscribers.saturating_sub(1);
		}
	}

	/// Drains up to [`RECV_BUDGET`] datagrams from `index`'s OS buffer into its inbound backlog,
	/// without parsing any of them.
	pub fn drain_readable(&mut self, index: usize) {
		let Some(socket) = self.sockets.get_mut(index) else { return };
		let mut buf = [0u8; DATAGRAM_MAX];

		for _ in 0..RECV_BUDGET {
			match socket.socket.recv_from(&mut buf) {
				Ok((n, from)) => {
					let mut bytes = Bytes::new(n);
					bytes.copy_from_slice(&buf[..n]);
					socket.backlog.push_back((from.ip(), bytes));
				}
				Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
				Err(e) => {
					warn!("udp recv error: {e}");
					break;
				}
			}
		}
	}

	pub fn pop_backlog(&mut self) -> Option<(IpAddr, Bytes)> {
		for socket in &mut self.sockets {
			if let Some(item) = socket.backlog.pop_front() {
				return Some(item);
			}
		}

		None
	}

	pub fn has_backlog(&self) -> bool {
		self.sockets.iter().any(|s| !s.backlog.is_empty())
	}
}

/// Builds the socket via `socket2` so `SO_RCVBUF`/`SO_SNDBUF` can be set through its safe,
/// portable API before handing back a plain `std::net::UdpSocket` for the rest of the pool to use.
fn open_socket(bind: SocketAddr, rcvbuf: Option<usize>, sndbuf: Option<usize>) -> io::Result<UdpSocket> {
	let domain = match bind {
		SocketAddr::V4(_) => socket2::Domain::IPV4,
		SocketAddr::V6(_) => socket2::Domain::IPV6,
	};

	let socket = socket2::Socket::new(domain, socket2::Type::DGRAM, Some(socket2::Protocol::UDP))?;
	socket.set_nonblocking(true)?;
	socket.bind(&bind.into())?;

	if let Some(size) = rcvbuf {
		socket.set_recv_buffer_size(size)?;
	}
	if let Some(size) = sndbuf {
		socket.set_send_buffer_size(size)?;
	}

	Ok(socket.into())
}

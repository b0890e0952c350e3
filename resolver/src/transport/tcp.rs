use std::collections::{HashMap, VecDeque};
use std::io::{self, Read, Write};
use std::net::{IpAddr, SocketAddr, TcpStream};
use std::rc::Rc;

use collections::bytes::Bytes;
use log::warn;
use runtime::event_loop::{EventLoop, Monitor, WatchId, READABLE, WRITABLE};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum State {
	Connecting,
	Connected,
	/// Connect or a read failed; subscribers have been notified, awaiting teardown.
	Failed,
}

struct Connection {
	stream: TcpStream,
	watch: WatchId,
	state: State,
	/// 2-byte length prefix plus payload accumulated so far.
	filled: Vec<u8>,
	target_len: Option<usize>,
	backlog: VecDeque<Bytes>,
	subscribers: usize,
}

/// At most one TCP connection per peer IP. Frames are 2-byte length-prefixed per RFC 7766.
#[derive(Default)]
pub struct TcpPool {
	connections: HashMap<IpAddr, Connection>,
}

impl TcpPool {
	pub fn new() -> Self {
		TcpPool::default()
	}

	pub fn state(&self, peer: IpAddr) -> Option<State> {
		self.connections.get(&peer).map(|c| c.state)
	}

	/// Obtains a connection to `peer`, opening a new non-blocking socket with `TCP_NODELAY` and
	/// issuing `connect` if none exists yet. Existing connections, in any state, are reused.
	pub fn connect(&mut self, peer: IpAddr, event_loop: &mut dyn EventLoop, monitor_for: impl Fn(IpAddr) -> Rc<dyn Monitor>) -> io::Result<()> {
		if self.connections.contains_key(&peer) {
			return Ok(());
		}

		let addr = SocketAddr::new(peer, 53);
		let stream = connect_nonblocking(addr)?;
		stream.set_nodelay(true)?;

		let watch = event_loop.add(runtime::raw_fd(&stream), READABLE | WRITABLE, monitor_for(peer));

		self.connections.insert(
			peer,
			Connection { stream, watch, state: State::Connecting, filled: Vec::new(), target_len: None, backlog: VecDeque::new(), subscribers: 0 },
		);

		Ok(())
	}

	pub fn note_subscribed(&mut self, peer: IpAddr) {
		if let Some(c) = self.connections.get_mut(&peer) {
			c.subscribers += 1;
		}
	}

	pub fn note_unsubscribed(&mut self, peer: IpAddr) {
		if let Some(c) = self.connections.get_mut(&peer) {
			c.subscribers = c.subscribers.saturating_sub(1);
		}
	}

	/// Called on writable/readable notification for a connecting socket; confirms the connect
	/// completed successfully via `take_error`.
	pub fn poll_connect(&mut self, peer: IpAddr) -> io::Result<bool> {
		let Some(conn) = self.connections.get_mut(&peer) else { return Ok(false) };

		if conn.state != State::Connecting {
			return Ok(true);
		}

		match conn.stream.take_error()? {
			Some(e) => {
				conn.state = State::Failed;
				Err(e)
			}
			None => {
				conn.state = State::Connected;
				Ok(true)
			}
		}
	}

	/// Sends a 2-byte length-prefixed query. Only valid once connected. Blocking mode is toggled
	/// on temporarily since the frame is small and a partial write here would be unusual.
	pub fn send(&mut self, peer: IpAddr, query: &[u8]) -> io::Result<()> {
		let Some(conn) = self.connections.get_mut(&peer) else {
			return Err(io::Error::new(io::ErrorKind::NotConnected, "no tcp connection to peer"));
		};

		conn.stream.set_nonblocking(false)?;
		let result = (|| {
			conn.stream.write_all(&(query.len() as u16).to_be_bytes())?;
			conn.stream.write_all(query)
		})();
		conn.stream.set_nonblocking(true)?;

		result
	}

	/// Drains whatever is currently readable, assembling complete length-prefixed frames into the
	/// connection's backlog. May deliver multiple frames per readiness notification.
	pub fn drain_readable(&mut self, peer: IpAddr) {
		let Some(conn) = self.connections.get_mut(&peer) else { return };
		let mut buf = [0u8; 4096];

		loop {
			match conn.stream.read(&mut buf) {
				Ok(0) => {
					conn.state = State::Failed;
					break;
				}
				Ok(n) => conn.filled.extend_from_slice(&buf[..n]),
				Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
				Err(e) => {
					warn!("tcp read error from {peer}: {e}");
					conn.state = State::Failed;
					break;
				}
			}

			drain_frames(conn);
		}

		drain_frames(conn);
	}

	pub fn pop_backlog(&mut self, peer: IpAddr) -> Option<Bytes> {
		self.connections.get_mut(&peer).and_then(|c| c.backlog.pop_front())
	}

	pub fn failed_peers(&self) -> Vec<IpAddr> {
		self.connections.iter().filter(|(_, c)| c.state == State::Failed).map(|(peer, _)| *peer).collect()
	}

	/// Tears down a connection once it has no subscribers and no undelivered frames.
	pub fn reap(&mut self, peer: IpAddr, event_loop: &mut dyn EventLoop, monitor: &Rc<dyn Monitor>) {
		let release = matches!(self.connections.get(&peer), Some(c) if c.subscribers == 0 && c.backlog.is_empty());

		if release {
			if let Some(conn) = self.connections.remove(&peer) {
				event_loop.remove(conn.watch, runtime::raw_fd(&conn.stream), monitor);
			}
		}
	}
}

fn drain_frames(conn: &mut Connection) {
	loop {
		if conn.target_len.is_none() {
			if conn.filled.len() < 2 {
				break;
			}

			let len = u16::from_be_bytes([conn.filled[0], conn.filled[1]]) as usize;
			conn.target_len = Some(len);
		}

		let target = conn.target_len.unwrap();

		if conn.filled.len() < 2 + target {
			break;
		}

		let mut frame = Bytes::new(target);
		frame.copy_from_slice(&conn.filled[2..2 + target]);
		conn.backlog.push_back(frame);

		conn.filled.drain(0..2 + target);
		conn.target_len = None;
	}
}

fn connect_nonblocking(addr: SocketAddr) -> io::Result<TcpStream> {
	let domain = match addr {
		SocketAddr::V4(_) => socket2::Domain::IPV4,
		SocketAddr::V6(_) => socket2::Domain::IPV6,
	};

	let socket = socket2::Socket::new(domain, socket2::Type::STREAM, Some(socket2::Protocol::TCP))?;
	socket.set_nonblocking(true)?;

	match socket.connect(&addr.into()) {
		Ok(()) => {}
		Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
		Err(e) => return Err(e),
	}

	Ok(socket.into())
}

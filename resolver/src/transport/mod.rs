pub mod subscriptions;
pub mod tcp;
pub mod udp;

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::rc::Rc;

use collections::bytes::Bytes;
use runtime::event_loop::{EventLoop, Monitor};

pub use subscriptions::Subscriptions;
pub use tcp::TcpPool;
pub use udp::UdpPool;

/// Owns the UDP socket pool, the TCP connection pool, and the demultiplexing subscription table
/// shared between them. The Scheduler is the only caller; this module knows nothing about
/// Lookups beyond their opaque arena index.
pub struct Transport {
	pub udp: UdpPool,
	pub tcp: TcpPool,
	pub subscriptions: Subscriptions,
}

impl Transport {
	pub fn new(udp_floor: usize, rcvbuf: Option<usize>, sndbuf: Option<usize>) -> Self {
		let mut udp = UdpPool::new(udp_floor);
		udp.set_buffer_sizes(rcvbuf, sndbuf);

		Transport { udp, tcp: TcpPool::new(), subscriptions: Subscriptions::default() }
	}

	/// Sends a UDP datagram to `peer:53` and returns the socket index the caller should remember
	/// on its Lookup (to later call [`UdpPool::note_unsubscribed`] with).
	pub fn send_udp(&mut self, peer: IpAddr, query: &[u8], event_loop: &mut dyn EventLoop, monitor_for: impl Fn(usize) -> Rc<dyn Monitor>) -> io::Result<usize> {
		let addr = SocketAddr::new(peer, 53);
		let index = self.udp.send(addr, query, event_loop, monitor_for)?;
		self.udp.note_subscribed(index);
		Ok(index)
	}

	pub fn drain_udp_readable(&mut self, index: usize) {
		self.udp.drain_readable(index);
	}

	pub fn pop_udp_backlog(&mut self) -> Option<(IpAddr, Bytes)> {
		self.udp.pop_backlog()
	}

	pub fn has_udp_backlog(&self) -> bool {
		self.udp.has_backlog()
	}

	/// Connects (or reuses an existing connection) to `peer` and marks the caller as one of its
	/// subscribers, mirroring [`Transport::send_udp`]'s subscribe-on-send.
	pub fn connect_tcp(&mut self, peer: IpAddr, event_loop: &mut dyn EventLoop, monitor_for: impl Fn(IpAddr) -> Rc<dyn Monitor>) -> io::Result<()> {
		self.tcp.connect(peer, event_loop, monitor_for)?;
		self.tcp.note_subscribed(peer);
		Ok(())
	}

	pub fn send_tcp(&mut self, peer: IpAddr, query: &[u8]) -> io::Result<()> {
		self.tcp.send(peer, query)
	}

	pub fn drain_tcp_readable(&mut self, peer: IpAddr) {
		self.tcp.drain_readable(peer);
	}

	pub fn pop_tcp_backlog(&mut self, peer: IpAddr) -> Option<Bytes> {
		self.tcp.pop_backlog(peer)
	}
}

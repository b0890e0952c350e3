//! The two Lookup variants the Scheduler arena holds. A search-path expansion is not a third
//! variant here: it is a [`crate::context::Handler`] wrapper that submits ordinary `Remote`/`Local`
//! lookups recursively with itself as the sub-handler (see `context::SearchHandler`).

use std::net::IpAddr;
use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::context::Handler;
use crate::wire::{Name, Query, Response};

/// Arena index into the Scheduler's slab. Plain `usize` rather than a pointer/reference, so
/// subscription tables and queues can refer to a Lookup without tangling its lifetime with theirs.
pub type LookupId = usize;

pub enum Lookup {
	Remote(RemoteLookup),
	Local(LocalLookup),
}

impl Lookup {
	pub fn handler(&self) -> &Rc<dyn Handler> {
		match self {
			Lookup::Remote(r) => &r.handler,
			Lookup::Local(l) => &l.handler,
		}
	}

	pub fn finished(&self) -> bool {
		match self {
			Lookup::Remote(r) => r.finished,
			Lookup::Local(l) => l.finished,
		}
	}

	pub fn set_finished(&mut self) {
		match self {
			Lookup::Remote(r) => r.finished = true,
			Lookup::Local(l) => l.finished = true,
		}
	}

	/// A `LocalLookup` is born exhausted: it never sends anything, it only waits for its
	/// zero-delay timer to fire on the next tick.
	pub fn exhausted(&self) -> bool {
		match self {
			Lookup::Remote(r) => r.exhausted(),
			Lookup::Local(_) => true,
		}
	}
}

/// Tracks whether a `RemoteLookup` is still talking UDP, or has fallen back to TCP after a
/// truncated response.
pub enum TcpState {
	None,
	/// Waiting on the TCP pool to hand back a connection to this peer.
	Connecting(IpAddr),
	/// Query sent over TCP; waiting for a full framed response.
	AwaitingResponse(IpAddr),
}

pub struct RemoteLookup {
	pub handler: Rc<dyn Handler>,
	pub query: Query,
	pub question_name: Name,
	pub qtype: u16,
	pub rd: bool,

	pub servers: Rc<[IpAddr]>,
	pub start_index: usize,
	pub attempts: u32,
	pub interval: Duration,
	pub spread: Duration,
	pub expire: Duration,

	pub count: u32,
	pub start: Instant,
	pub udp_socket: Option<usize>,
	pub tcp: TcpState,
	/// Every peer a datagram has been sent to, so a finished/cancelled lookup can unsubscribe from
	/// all of them, not just the most recent one.
	pub subscribed_peers: Vec<IpAddr>,

	/// Set once the terminal callback has fired; the Scheduler drops the entry right after.
	pub finished: bool,
	/// Set when a truncated response was seen, so late UDP datagrams are no longer consulted.
	pub truncated_response: Option<Response>,
}

impl RemoteLookup {
	pub fn nservers(&self) -> u32 {
		self.servers.len() as u32
	}

	/// All configured attempts across all servers have been sent; only late responses and the
	/// final expiry timer remain.
	pub fn exhausted(&self) -> bool {
		self.nservers() == 0 || self.count >= self.attempts * self.nservers()
	}

	pub fn current_server(&self) -> IpAddr {
		let index = (self.count as usize + self.start_index) % self.servers.len();
		self.servers[index]
	}

	pub fn expired(&self, now: Instant) -> bool {
		now >= self.start + self.expire
	}

	pub fn time_until_expire(&self, now: Instant) -> Duration {
		(self.start + self.expire).checked_duration_since(now).unwrap_or(Duration::ZERO)
	}

	/// Seconds until the next thing this lookup needs to happen, per the per-attempt/per-round
	/// schedule. Mid-round: a small inter-server `spread`. At a round boundary: the time until the
	/// next full round, capped by `expire`.
	pub fn delay(&self, now: Instant) -> Duration {
		let nservers = self.nservers();

		if nservers == 0 {
			return Duration::ZERO;
		}

		if self.count % nservers != 0 {
			return self.spread;
		}

		let rounds = self.count / nservers;
		let next_time = self.start + self.interval * rounds;
		let target = next_time.min(self.start + self.expire);

		target.checked_duration_since(now).unwrap_or(Duration::ZERO)
	}
}

pub struct LocalLookup {
	pub handler: Rc<dyn Handler>,
	pub response: Response,
	pub finished: bool,
}

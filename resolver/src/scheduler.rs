//! Owns the Lookup arena and the three admission queues, and drives every state transition from
//! either a timer firing or a socket becoming readable. Single-threaded, reentrancy-safe: a
//! mutable borrow of [`Inner`] is always dropped before a user [`Handler`] callback runs, and
//! reacquired fresh afterward, so a handler calling back into `Operation::cancel`/`install` mid-
//! callback observes consistent state instead of double-borrowing a `RefCell`.

use std::cell::{Cell, RefCell};
use std::net::IpAddr;
use std::rc::{Rc, Weak};
use std::time::{Duration, Instant};

use collections::bytes::Bytes;
use log::warn;
use runtime::event_loop::{EventLoop, Monitor, TimerHandler, TimerId};
use slab::Slab;

use crate::config::HostsTable;
use crate::context::Handler;
use crate::fake;
use crate::lookup::{Lookup, LookupId, TcpState};
use crate::transport::Transport;
use crate::wire::{self, Response};

use crate::wire::{RCODE_NXDOMAIN as NXDOMAIN, RCODE_SERVFAIL as SERVFAIL};

struct Inner {
	event_loop: Box<dyn EventLoop>,
	transport: Transport,
	hosts: Rc<HostsTable>,

	lookups: Slab<Lookup>,
	scheduled: Vec<LookupId>,
	active: Vec<LookupId>,
	ready: Vec<LookupId>,
	/// Lookups waiting on a TCP connection to `peer` (key) after a truncated UDP response.
	tcp_waiters: std::collections::HashMap<IpAddr, Vec<LookupId>>,

	inflight: usize,
	capacity: usize,
	max_calls_per_tick: usize,

	main_timer: Option<TimerId>,
	self_weak: Weak<RefCell<Inner>>,
}

/// A handle to the Lookup arena and its admission queues. Cloning shares the same underlying
/// state; [`crate::context::Context`] holds one clone, `Operation` handles hold weak references.
#[derive(Clone)]
pub struct Scheduler {
	inner: Rc<RefCell<Inner>>,
}

impl Scheduler {
	pub fn new(event_loop: Box<dyn EventLoop>, hosts: Rc<HostsTable>, capacity: usize, max_calls_per_tick: usize, udp_floor: usize, rcvbuf: Option<usize>, sndbuf: Option<usize>) -> Scheduler {
		let inner = Rc::new_cyclic(|weak| {
			RefCell::new(Inner {
				event_loop,
				transport: Transport::new(udp_floor, rcvbuf, sndbuf),
				hosts,
				lookups: Slab::new(),
				scheduled: Vec::new(),
				active: Vec::new(),
				ready: Vec::new(),
				tcp_waiters: std::collections::HashMap::new(),
				inflight: 0,
				capacity,
				max_calls_per_tick,
				main_timer: None,
				self_weak: weak.clone(),
			})
		});

		Scheduler { inner }
	}

	/// Admits a freshly constructed Lookup per §4.7: a `LocalLookup` goes straight to `ready` with
	/// a zero-delay wakeup; a `RemoteLookup` executes its first attempt immediately if capacity and
	/// nameservers allow, otherwise waits in `scheduled`.
	pub fn add(&self, lookup: Lookup) -> LookupId {
		let mut inner = self.inner.borrow_mut();
		let now = Instant::now();

		if lookup.exhausted() {
			let id = inner.lookups.insert(lookup);
			inner.ready.insert(0, id);
			inner.inflight += 1;
			inner.arm_timer(Duration::ZERO);
			return id;
		}

		let no_servers = matches!(&lookup, Lookup::Remote(r) if r.servers.is_empty());

		if no_servers || inner.inflight >= inner.capacity {
			let id = inner.lookups.insert(lookup);
			inner.scheduled.push(id);
			inner.recompute_timer(now);
			return id;
		}

		let id = inner.lookups.insert(lookup);
		inner.inflight += 1;
		inner.execute_remote(id, now);
		inner.active.push(id);
		inner.recompute_timer(now);
		id
	}

	pub fn cancel(&self, id: LookupId) {
		let handler = {
			let mut inner = self.inner.borrow_mut();
			let was_scheduled = inner.scheduled.contains(&id);
			inner.detach(id);

			let Some(lookup) = inner.lookups.try_remove(id) else { return };

			if !was_scheduled {
				inner.inflight = inner.inflight.saturating_sub(1);
			}

			lookup.handler().clone()
		};

		handler.on_cancelled(Operation::new(self.inner.clone(), id));

		let mut inner = self.inner.borrow_mut();
		inner.proceed();
		let now = Instant::now();
		inner.recompute_timer(now);
	}

	pub fn install(&self, id: LookupId, handler: Rc<dyn Handler>) {
		let mut inner = self.inner.borrow_mut();

		if let Some(lookup) = inner.lookups.get_mut(id) {
			match lookup {
				Lookup::Remote(r) => r.handler = handler,
				Lookup::Local(l) => l.handler = handler,
			}
		}
	}

	/// Shares ownership of the arena with `Context`/`Operation` handles, within the crate only.
	pub(crate) fn handle(&self) -> InnerHandle {
		self.inner.clone()
	}
}

impl Inner {
	fn arm_timer(&mut self, delay: Duration) {
		if let Some(old) = self.main_timer.take() {
			let handler: Rc<dyn TimerHandler> = Rc::new(MainTimer { inner: self.self_weak.clone() });
			self.event_loop.cancel(old, &handler);
		}

		let handler: Rc<dyn TimerHandler> = Rc::new(MainTimer { inner: self.self_weak.clone() });
		self.main_timer = Some(self.event_loop.timer(delay, handler));
	}

	/// Per the §4.7 invariant: the timer is armed iff `active`/`ready` are non-empty or a socket
	/// has buffered data, at the minimum delay across all of them (0 if anything is buffered).
	fn recompute_timer(&mut self, now: Instant) {
		if self.transport.has_udp_backlog() {
			self.arm_timer(Duration::ZERO);
			return;
		}

		let min_delay = self
			.active
			.iter()
			.chain(self.ready.iter())
			.filter_map(|&id| self.lookups.get(id))
			.filter_map(|lookup| match lookup {
				Lookup::Remote(r) => Some(r.delay(now).min(r.time_until_expire(now))),
				Lookup::Local(_) => Some(Duration::ZERO),
			})
			.min();

		if !self.scheduled.is_empty() {
			self.arm_timer(Duration::ZERO);
		} else if let Some(delay) = min_delay {
			self.arm_timer(delay);
		} else {
			self.main_timer.take();
		}
	}

	/// Sends the next UDP attempt for `id` and schedules its next wakeup. Never invokes user code.
	fn execute_remote(&mut self, id: LookupId, now: Instant) {
		let self_weak = self.self_weak.clone();

		let (peer, bytes, txid) = {
			let Some(Lookup::Remote(r)) = self.lookups.get(id) else { return };
			(r.current_server(), r.query.bytes.clone(), r.query.id)
		};

		let monitor_for = move |index: usize| -> Rc<dyn Monitor> { Rc::new(UdpMonitor { inner: self_weak.clone(), index }) };

		let sent = self.transport.send_udp(peer, &bytes, self.event_loop.as_mut(), monitor_for);

		if let Some(Lookup::Remote(r)) = self.lookups.get_mut(id) {
			if let Ok(socket_index) = sent {
				r.udp_socket = Some(socket_index);
				self.transport.subscriptions.subscribe(txid, peer, id);

				if !r.subscribed_peers.contains(&peer) {
					r.subscribed_peers.push(peer);
				}
			}

			r.count += 1;
		}
	}

	/// Removes all bookkeeping (subscriptions, sockets) for a finished or cancelled Lookup. Does
	/// not remove it from the arena or touch `inflight`; callers do that around the user callback.
	fn detach(&mut self, id: LookupId) {
		let Some(lookup) = self.lookups.get(id) else { return };

		let mut tcp_peer = None;

		if let Lookup::Remote(r) = lookup {
			let txid = r.query.id;
			for &peer in &r.subscribed_peers {
				self.transport.subscriptions.unsubscribe(txid, peer, id);
			}
			if let Some(socket) = r.udp_socket {
				self.transport.udp.note_unsubscribed(socket);
			}
			if let TcpState::Connecting(peer) | TcpState::AwaitingResponse(peer) = r.tcp {
				tcp_peer = Some(peer);
			}
		}

		self.scheduled.retain(|&x| x != id);
		self.active.retain(|&x| x != id);
		self.ready.retain(|&x| x != id);

		for waiters in self.tcp_waiters.values_mut() {
			waiters.retain(|&x| x != id);
		}

		if let Some(peer) = tcp_peer {
			self.transport.tcp.note_unsubscribed(peer);

			let monitor: Rc<dyn Monitor> = Rc::new(TcpMonitor { inner: self.self_weak.clone(), peer });
			self.transport.tcp.reap(peer, self.event_loop.as_mut(), &monitor);
		}
	}

	/// Pops a `scheduled`/`active`/`ready` slot into whichever queue it belongs in next, promoting
	/// queued-up lookups now that `inflight` has room.
	fn proceed(&mut self) {
		let now = Instant::now();

		while self.inflight < self.capacity && !self.scheduled.is_empty() {
			let id = self.scheduled.remove(0);

			if !self.lookups.contains(id) {
				continue;
			}

			self.inflight += 1;
			self.execute_remote(id, now);
			self.active.push(id);
		}
	}
}

/// A weak, clonable reference into the Scheduler's arena, used by the public `Operation` handle
/// and by the glue objects registered with the event loop.
pub(crate) type InnerHandle = Rc<RefCell<Inner>>;

/// The user-facing handle for an in-flight query. Cloned freely; cancellation and handler
/// replacement are valid until the terminal callback has fired.
///
/// `id` is an `Rc<Cell<_>>` rather than a plain `LookupId` so that a search-path wrapper (see
/// `context::SearchHandler`) can redirect a single long-lived `Operation` across the series of
/// underlying sub-lookups it submits, without the caller ever holding a stale id.
#[derive(Clone)]
pub struct Operation {
	pub(crate) inner: InnerHandle,
	pub(crate) id: Rc<Cell<LookupId>>,
}

impl Operation {
	pub(crate) fn new(inner: InnerHandle, id: LookupId) -> Operation {
		Operation { inner, id: Rc::new(Cell::new(id)) }
	}

	pub(crate) fn redirect(&self, id: LookupId) {
		self.id.set(id);
	}

	pub fn cancel(&self) {
		Scheduler { inner: self.inner.clone() }.cancel(self.id.get())
	}

	pub fn install(&self, handler: Rc<dyn Handler>) {
		Scheduler { inner: self.inner.clone() }.install(self.id.get(), handler)
	}
}

struct UdpMonitor {
	inner: Weak<RefCell<Inner>>,
	index: usize,
}

impl Monitor for UdpMonitor {
	fn notify(&self, readable: bool, _writable: bool) {
		let Some(inner) = self.inner.upgrade() else { return };

		if readable {
			let mut guard = inner.borrow_mut();
			guard.transport.drain_udp_readable(self.index);
			guard.arm_timer(Duration::ZERO);
		}
	}
}

struct TcpMonitor {
	inner: Weak<RefCell<Inner>>,
	peer: IpAddr,
}

impl Monitor for TcpMonitor {
	fn notify(&self, _readable: bool, _writable: bool) {
		let Some(inner) = self.inner.upgrade() else { return };
		{
			let mut guard = inner.borrow_mut();
			guard.transport.drain_tcp_readable(self.peer);
			guard.arm_timer(Duration::ZERO);
		}
	}
}

struct MainTimer {
	inner: Weak<RefCell<Inner>>,
}

impl TimerHandler for MainTimer {
	fn notify(&self) {
		let Some(inner) = self.inner.upgrade() else { return };
		tick(&inner);
	}
}

/// Runs one pass of §4.7's five steps. Free function (rather than a method) so that every user
/// callback happens with no `RefCell` borrow held anywhere on the stack.
pub(crate) fn tick(inner: &Rc<RefCell<Inner>>) {
	let max_calls = inner.borrow().max_calls_per_tick;
	let mut calls = 0usize;

	while calls < max_calls {
		let next = { inner.borrow_mut().transport.pop_udp_backlog() };
		let Some((peer, bytes)) = next else { break };
		calls += deliver_udp_datagram(inner, peer, bytes);
	}

	while calls < max_calls {
		let peers: Vec<IpAddr> = { inner.borrow().tcp_waiters.keys().copied().collect() };
		let mut delivered_any = false;

		for peer in peers {
			while calls < max_calls {
				let frame = { inner.borrow_mut().transport.pop_tcp_backlog(peer) };
				match frame {
					Some(bytes) => {
						calls += deliver_tcp_frame(inner, peer, bytes);
						delivered_any = true;
					}
					None => break,
				}
			}
		}

		check_tcp_connections(inner);

		if !delivered_any {
			break;
		}
	}

	let now = Instant::now();

	while calls < max_calls {
		let due = { inner.borrow_mut().pop_due(now, false) };
		let Some(id) = due else { break };
		calls += process_remote_expiry(inner, id, now);
	}

	while calls < max_calls {
		let due = { inner.borrow_mut().pop_due(now, true) };
		let Some(id) = due else { break };
		calls += process_remote_expiry(inner, id, now);
	}

	{
		let mut guard = inner.borrow_mut();
		guard.proceed();
		let now = Instant::now();
		guard.recompute_timer(now);
	}
}

impl Inner {
	/// Pops the front of `ready` (if `ready_queue`) or `active` if it is due (`delay`/`expire`
	/// elapsed), re-inserting it at the back otherwise. A linear scan rather than a real priority
	/// queue — fine at the scale a single-threaded stub resolver operates at.
	fn pop_due(&mut self, now: Instant, ready_queue: bool) -> Option<LookupId> {
		let queue = if ready_queue { &mut self.ready } else { &mut self.active };

		let position = queue.iter().position(|&id| match self.lookups.get(id) {
			Some(Lookup::Remote(r)) => {
				if ready_queue {
					r.expired(now)
				} else {
					r.delay(now) == Duration::ZERO
				}
			}
			Some(Lookup::Local(_)) => true,
			None => true,
		})?;

		Some(queue.remove(position))
	}
}

/// Parses one UDP datagram, matches it to a subscribed RemoteLookup, and dispatches per §4.6.1.
/// Returns 1 if a user callback was issued, 0 otherwise (so the tick's call budget only counts
/// actual deliveries).
fn deliver_udp_datagram(inner: &Rc<RefCell<Inner>>, peer: IpAddr, bytes: Bytes) -> usize {
	let response = match wire::Response::parse(bytes) {
		Ok(r) => r,
		Err(_) => return 0,
	};

	let subscriber = {
		let guard = inner.borrow();
		let candidates = guard.transport.subscriptions.subscribers(response.id, peer).to_vec();
		candidates.into_iter().find(|&id| {
			matches!(guard.lookups.get(id), Some(Lookup::Remote(r)) if wire::matches(&r.query, &response) && !r.finished && matches!(r.tcp, TcpState::None))
		})
	};

	let Some(id) = subscriber else { return 0 };

	handle_remote_response(inner, id, peer, response)
}

fn handle_remote_response(inner: &Rc<RefCell<Inner>>, id: LookupId, peer: IpAddr, response: Response) -> usize {
	if response.truncated() {
		begin_tcp_fallback(inner, id, peer, response);
		return 0;
	}

	if response.rcode != 0 {
		if response.rcode == NXDOMAIN {
			let override_response = {
				let guard = inner.borrow();
				match guard.lookups.get(id) {
					Some(Lookup::Remote(r)) if guard.hosts.contains_host(&r.question_name.0) => Some(fake::nxdomain_override(r.query.id, r.rd, &r.query.question)),
					_ => None,
				}
			};

			if let Some(fake_response) = override_response {
				return finish_remote(inner, id, |handler, op| handler.on_received(op, fake_response));
			}
		}

		let rcode = response.rcode;
		return finish_remote(inner, id, move |handler, op| handler.on_failure(op, rcode));
	}

	finish_remote(inner, id, move |handler, op| handler.on_received(op, response))
}

fn begin_tcp_fallback(inner: &Rc<RefCell<Inner>>, id: LookupId, peer: IpAddr, response: Response) {
	let self_weak = { inner.borrow().self_weak.clone() };

	{
		let mut guard = inner.borrow_mut();

		if let Some(Lookup::Remote(r)) = guard.lookups.get_mut(id) {
			r.tcp = TcpState::Connecting(peer);
			r.truncated_response = Some(response);
		}

		guard.tcp_waiters.entry(peer).or_default().push(id);

		let monitor_for = move |p: IpAddr| -> Rc<dyn Monitor> { Rc::new(TcpMonitor { inner: self_weak.clone(), peer: p }) };

		let Inner { transport, event_loop, .. } = &mut *guard;
		let _ = transport.connect_tcp(peer, event_loop.as_mut(), monitor_for);
	}
}

fn check_tcp_connections(inner: &Rc<RefCell<Inner>>) {
	let (connected, failed): (Vec<IpAddr>, Vec<IpAddr>) = {
		let mut guard = inner.borrow_mut();
		let peers: Vec<IpAddr> = guard.tcp_waiters.keys().copied().collect();

		// Connect completion only ever surfaces here: the socket's readable/writable notification
		// just drives `drain_tcp_readable`, so a still-`Connecting` peer needs its pending
		// `take_error` checked before `state(peer)` can report anything but `Connecting` forever.
		for &peer in &peers {
			if guard.transport.tcp.state(peer) == Some(crate::transport::tcp::State::Connecting) {
				if let Err(e) = guard.transport.tcp.poll_connect(peer) {
					warn!("tcp connect to {peer}: {e}");
				}
			}
		}

		let mut connected = Vec::new();
		let mut failed = Vec::new();

		for peer in peers {
			match guard.transport.tcp.state(peer) {
				Some(crate::transport::tcp::State::Connected) => connected.push(peer),
				Some(crate::transport::tcp::State::Failed) => failed.push(peer),
				_ => {}
			}
		}

		(connected, failed)
	};

	for peer in connected {
		let waiters = {
			let mut guard = inner.borrow_mut();
			guard.tcp_waiters.remove(&peer).unwrap_or_default()
		};

		for id in waiters {
			let bytes = {
				let guard = inner.borrow();
				match guard.lookups.get(id) {
					Some(Lookup::Remote(r)) if matches!(r.tcp, TcpState::Connecting(p) if p == peer) => Some(r.query.bytes.clone()),
					_ => None,
				}
			};

			let Some(bytes) = bytes else { continue };

			let mut guard = inner.borrow_mut();
			let _ = guard.transport.send_tcp(peer, &bytes);

			if let Some(Lookup::Remote(r)) = guard.lookups.get_mut(id) {
				r.tcp = TcpState::AwaitingResponse(peer);
			}
		}
	}

	for peer in failed {
		let waiters = {
			let mut guard = inner.borrow_mut();
			guard.tcp_waiters.remove(&peer).unwrap_or_default()
		};

		for id in waiters {
			fallback_to_truncated(inner, id);
		}
	}
}

fn fallback_to_truncated(inner: &Rc<RefCell<Inner>>, id: LookupId) {
	let truncated = {
		let guard = inner.borrow();
		match guard.lookups.get(id) {
			Some(Lookup::Remote(r)) => r.truncated_response.clone(),
			_ => None,
		}
	};

	if let Some(response) = truncated {
		finish_remote(inner, id, move |handler, op| handler.on_received(op, response));
	}
}

fn deliver_tcp_frame(inner: &Rc<RefCell<Inner>>, peer: IpAddr, bytes: Bytes) -> usize {
	let response = match wire::Response::parse(bytes) {
		Ok(r) => r,
		Err(_) => return 0,
	};

	let subscriber = {
		let guard = inner.borrow();
		guard
			.lookups
			.iter()
			.find(|(_, lookup)| matches!(lookup, Lookup::Remote(r) if matches!(r.tcp, TcpState::AwaitingResponse(p) if p == peer) && wire::matches(&r.query, &response)))
			.map(|(id, _)| id)
	};

	let Some(id) = subscriber else { return 0 };

	handle_remote_response(inner, id, peer, response)
}

/// Per-attempt pacing (`delay`) fired, or the lookup is in `ready` and `expire` has elapsed.
/// Implements the "Timer expiry" behavior of §4.6.1.
fn process_remote_expiry(inner: &Rc<RefCell<Inner>>, id: LookupId, now: Instant) -> usize {
	let decision = {
		let guard = inner.borrow();
		match guard.lookups.get(id) {
			Some(Lookup::Local(l)) => Decision::DeliverLocal(l.response.clone()),
			Some(Lookup::Remote(r)) => {
				if r.expired(now) {
					if guard.transport.has_udp_backlog() {
						Decision::Defer
					} else if !matches!(r.tcp, TcpState::None) {
						Decision::RearmToExpire
					} else {
						Decision::Timeout
					}
				} else if !matches!(r.tcp, TcpState::None) {
					Decision::RearmToExpire
				} else {
					Decision::Retry
				}
			}
			None => Decision::Defer,
		}
	};

	match decision {
		Decision::DeliverLocal(response) => finish_local(inner, id, response),
		Decision::Timeout => finish_remote(inner, id, |handler, op| {
			handler.on_timeout(op.clone());
			handler.on_failure(op, SERVFAIL);
		}),
		Decision::RearmToExpire => {
			let mut guard = inner.borrow_mut();
			guard.ready.push(id);
			0
		}
		Decision::Retry => {
			let mut guard = inner.borrow_mut();
			guard.execute_remote(id, now);

			if let Some(Lookup::Remote(r)) = guard.lookups.get(id) {
				if r.exhausted() {
					guard.ready.push(id);
				} else {
					guard.active.push(id);
				}
			}

			0
		}
		Decision::Defer => {
			let mut guard = inner.borrow_mut();
			guard.ready.push(id);
			0
		}
	}
}

enum Decision {
	DeliverLocal(Response),
	Timeout,
	RearmToExpire,
	Retry,
	Defer,
}

fn finish_local(inner: &Rc<RefCell<Inner>>, id: LookupId, response: Response) -> usize {
	finish(inner, id, move |handler, op| handler.on_received(op, response))
}

fn finish_remote(inner: &Rc<RefCell<Inner>>, id: LookupId, deliver: impl FnOnce(&dyn Handler, Operation)) -> usize {
	finish(inner, id, deliver)
}

/// Detaches `id` from every queue/subscription, removes it from the arena, decrements `inflight`,
/// drops the borrow, then invokes `deliver`. This is the one place a user callback is reached from
/// inside the scheduler, and the one place the reentrancy-safety ordering matters.
fn finish(inner: &Rc<RefCell<Inner>>, id: LookupId, deliver: impl FnOnce(&dyn Handler, Operation)) -> usize {
	let handler = {
		let mut guard = inner.borrow_mut();
		guard.detach(id);

		let Some(mut lookup) = guard.lookups.try_remove(id) else { return 0 };
		lookup.set_finished();
		guard.inflight = guard.inflight.saturating_sub(1);

		lookup.handler().clone()
	};

	let op = Operation::new(inner.clone(), id);
	deliver(handler.as_ref(), op);

	1
}

#[cfg(test)]
mod tests {
	use std::net::{IpAddr, Ipv4Addr};

	use runtime::reactor::PollEventLoop;

	use super::*;
	use crate::lookup::RemoteLookup;
	use crate::wire::{Query, QueryOptions, TYPE_A};

	struct Silent;

	impl Handler for Silent {}

	fn remote_lookup(id: u16, name: &str, servers: Rc<[IpAddr]>) -> RemoteLookup {
		let query = Query::build(id, &wire::Name::from_str(name), TYPE_A, QueryOptions::default()).unwrap();

		RemoteLookup {
			handler: Rc::new(Silent),
			question_name: wire::Name::from_str(name),
			qtype: TYPE_A,
			rd: true,
			servers,
			start_index: 0,
			attempts: 1,
			interval: Duration::from_secs(1),
			spread: Duration::from_millis(10),
			expire: Duration::from_secs(5),
			count: 0,
			start: Instant::now(),
			udp_socket: None,
			tcp: TcpState::None,
			subscribed_peers: Vec::new(),
			finished: false,
			truncated_response: None,
			query,
		}
	}

	proptest::proptest! {
		/// However many `RemoteLookup`s are submitted, `inflight` never exceeds `capacity` — the
		/// excess always lands in `scheduled` instead of being admitted past the configured limit.
		#[test]
		fn inflight_never_exceeds_capacity(capacity in 1usize..6, submitted in 1usize..12) {
			let event_loop = Box::new(PollEventLoop::new());
			let servers: Rc<[IpAddr]> = vec![IpAddr::V4(Ipv4Addr::new(127, 0, 0, 18))].into();

			let scheduler = Scheduler::new(event_loop, Rc::new(HostsTable::default()), capacity, 64, 1, None, None);

			for i in 0..submitted {
				scheduler.add(Lookup::Remote(remote_lookup(i as u16, "capacity-test.example", servers.clone())));
			}

			let inflight = scheduler.inner.borrow().inflight;
			proptest::prop_assert!(inflight <= capacity);
		}
	}
}

use core::time::Duration;
use std::cell::RefCell;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};
use std::io;
use std::rc::Rc;
use std::time::Instant;

use log::trace;

use crate::event_loop::{EventLoop, IdleHandler, IdleId, Monitor, RawFd, TimerHandler, TimerId, WatchId, READABLE, WRITABLE};

#[cfg(unix)]
mod sys {
	pub use libc::{poll, pollfd as Poll, POLLERR, POLLHUP, POLLIN, POLLNVAL, POLLOUT};
}

#[cfg(windows)]
mod sys {
	pub use windows_sys::Win32::Networking::WinSock::{
		WSAPoll as poll, POLLERR, POLLHUP, POLLRDNORM as POLLIN, POLLWRNORM as POLLOUT, WSAPOLLFD as Poll,
	};

	/// WSAPoll doesn't surface a distinct "invalid fd" bit.
	pub const POLLNVAL: i16 = 0;
}

fn as_timeout(t: Option<Duration>) -> i32 {
	t.and_then(|d| d.as_millis().try_into().ok()).unwrap_or(-1)
}

struct Watch {
	id: WatchId,
	fd: RawFd,
	monitor: Rc<dyn Monitor>,
}

struct TimerEntry {
	at: Instant,
	id: TimerId,
	handler: Rc<dyn TimerHandler>,
}

impl PartialEq for TimerEntry {
	fn eq(&self, other: &Self) -> bool {
		self.at == other.at && self.id == other.id
	}
}

impl Eq for TimerEntry {}

impl PartialOrd for TimerEntry {
	fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
		Some(self.cmp(other))
	}
}

impl Ord for TimerEntry {
	fn cmp(&self, other: &Self) -> std::cmp::Ordering {
		self.at.cmp(&other.at).then(self.id.cmp(&other.id))
	}
}

#[derive(Default)]
struct State {
	fds: Vec<sys::Poll>,
	watches: Vec<Watch>,
	next_watch: WatchId,

	timers: BinaryHeap<Reverse<TimerEntry>>,
	cancelled: HashSet<TimerId>,
	next_timer: TimerId,

	idles: Vec<(IdleId, Rc<dyn IdleHandler>)>,
	next_idle: IdleId,
}

/// A `poll(2)`/`WSAPoll`-based [`EventLoop`] implementation.
///
/// Intended for applications that don't already embed an event loop of their own. Backed by an
/// `Rc<RefCell<_>>`, so `Clone` is cheap and shares the same underlying state: the handle passed
/// to [`crate::Context`] (or whatever resolver/scheduler is registering against it) and the handle
/// the application drives with [`PollEventLoop::run`] can be two clones of the same loop. This
/// matters because a [`TimerHandler`]/[`Monitor`] notified from inside `run`/`poll`/`fire_expired`
/// is free to immediately register a new timer or watch on the very instance driving it — the
/// borrow that read the due work is always dropped before the callback runs, the same
/// reentrancy-safe discipline the Scheduler applies to its own state.
///
/// One instance (and its clones) should be confined to a single OS thread: everything here is
/// `Rc`-based and not `Send`.
#[derive(Clone, Default)]
pub struct PollEventLoop {
	state: Rc<RefCell<State>>,
}

impl PollEventLoop {
	pub fn new() -> Self {
		Self::default()
	}

	fn translate(events: u8) -> i16 {
		let mut mask: i16 = 0;

		if events & READABLE != 0 {
			mask |= sys::POLLIN;
		}

		if events & WRITABLE != 0 {
			mask |= sys::POLLOUT;
		}

		mask
	}

	/// Whether any filedescriptor is currently being watched.
	pub fn has_watches(&self) -> bool {
		!self.state.borrow().fds.is_empty()
	}

	/// The soonest a timer will fire, or `None` if no timers (other than cancelled ones) are armed.
	pub fn next_wait(&self, now: Instant) -> Option<Duration> {
		let mut state = self.state.borrow_mut();

		loop {
			let Reverse(top) = state.timers.peek()?;

			if state.cancelled.remove(&top.id) {
				state.timers.pop();
				continue;
			}

			return Some(top.at.saturating_duration_since(now));
		}
	}

	/// Fire (and remove) every timer whose deadline is at or before `now`. Due handlers are
	/// collected before any of them runs, so a handler re-arming a timer mid-callback never
	/// re-borrows the state this method is still inspecting.
	pub fn fire_expired(&self, now: Instant) {
		let mut due: Vec<Rc<dyn TimerHandler>> = Vec::new();

		{
			let mut state = self.state.borrow_mut();

			loop {
				let Some(Reverse(top)) = state.timers.peek() else { break };

				if state.cancelled.remove(&top.id) {
					state.timers.pop();
					continue;
				}

				if top.at > now {
					break;
				}

				let Reverse(entry) = state.timers.pop().expect("just peeked");
				due.push(entry.handler);
			}
		}

		for handler in due {
			handler.notify();
		}
	}

	/// Notify every registered idle watcher once.
	pub fn fire_idle(&self) {
		let idles: Vec<Rc<dyn IdleHandler>> = self.state.borrow().idles.iter().map(|(_, h)| h.clone()).collect();

		for handler in idles {
			handler.idle();
		}
	}

	pub fn has_idles(&self) -> bool {
		!self.state.borrow().idles.is_empty()
	}

	/// Block (up to `timeout`) waiting for a watched filedescriptor to become active, notifying
	/// monitors for whichever fired. Returns whether anything was ready.
	pub fn poll(&self, timeout: Option<Duration>) -> io::Result<bool> {
		let mut fds = { self.state.borrow().fds.clone() };

		if fds.is_empty() {
			// Nothing to poll on; `poll(2)`/`WSAPoll` with zero descriptors is unreliable across
			// platforms, so just sleep out the requested timeout ourselves.
			if let Some(timeout) = timeout {
				std::thread::sleep(timeout);
			}

			return Ok(false);
		}

		let ret = unsafe { sys::poll(fds.as_mut_ptr(), fds.len() as _, as_timeout(timeout)) };

		if ret < 0 {
			return Err(io::Error::last_os_error());
		}

		let mut pending = ret as usize;

		if pending == 0 {
			return Ok(false);
		}

		let fired: Vec<(Rc<dyn Monitor>, bool, bool)> = {
			let state = self.state.borrow();
			let mut fired = Vec::new();

			for idx in 0..fds.len() {
				let revents = fds[idx].revents;

				if revents == 0 {
					continue;
				}

				trace!("fd {} revents={:#x}", state.watches[idx].fd, revents);

				let readable = revents & (sys::POLLIN | sys::POLLERR | sys::POLLHUP | sys::POLLNVAL) != 0;
				let writable = revents & sys::POLLOUT != 0;

				fired.push((state.watches[idx].monitor.clone(), readable, writable));

				pending -= 1;

				if pending == 0 {
					break;
				}
			}

			fired
		};

		for (monitor, readable, writable) in fired {
			monitor.notify(readable, writable);
		}

		Ok(true)
	}

	/// Run until `should_stop` returns true, driving timers, idle watchers and I/O readiness.
	pub fn run(&self, mut should_stop: impl FnMut() -> bool) -> io::Result<()> {
		let mut now = Instant::now();

		loop {
			if should_stop() {
				return Ok(());
			}

			self.fire_expired(now);

			let timeout = if self.has_idles() { Some(Duration::ZERO) } else { self.next_wait(now) };

			if timeout.is_none() && !self.has_watches() {
				return Ok(());
			}

			let had_io = self.poll(timeout)?;

			now = Instant::now();

			if !had_io && self.has_idles() {
				self.fire_idle();
			}
		}
	}
}

impl EventLoop for PollEventLoop {
	fn add(&mut self, fd: RawFd, events: u8, monitor: Rc<dyn Monitor>) -> WatchId {
		let mut state = self.state.borrow_mut();

		let id = state.next_watch;
		state.next_watch += 1;

		state.fds.push(sys::Poll { fd, events: Self::translate(events), revents: 0 });
		state.watches.push(Watch { id, fd, monitor });

		id
	}

	fn update(&mut self, id: WatchId, fd: RawFd, events: u8, monitor: Rc<dyn Monitor>) -> WatchId {
		let mut state = self.state.borrow_mut();
		let idx = state.watches.iter().position(|w| w.id == id).expect("watch id is registered");

		state.fds[idx] = sys::Poll { fd, events: Self::translate(events), revents: 0 };
		state.watches[idx] = Watch { id, fd, monitor };

		id
	}

	fn remove(&mut self, id: WatchId, _fd: RawFd, _monitor: &Rc<dyn Monitor>) {
		let mut state = self.state.borrow_mut();
		let idx = state.watches.iter().position(|w| w.id == id).expect("watch id is registered");

		state.fds.swap_remove(idx);
		state.watches.swap_remove(idx);
	}

	fn timer(&mut self, timeout: Duration, handler: Rc<dyn TimerHandler>) -> TimerId {
		let mut state = self.state.borrow_mut();

		let id = state.next_timer;
		state.next_timer += 1;

		state.timers.push(Reverse(TimerEntry { at: Instant::now() + timeout, id, handler }));

		id
	}

	fn cancel(&mut self, id: TimerId, _timer: &Rc<dyn TimerHandler>) {
		self.state.borrow_mut().cancelled.insert(id);
	}

	fn idle(&mut self, idle: Rc<dyn IdleHandler>) -> IdleId {
		let mut state = self.state.borrow_mut();

		let id = state.next_idle;
		state.next_idle += 1;

		state.idles.push((id, idle));

		id
	}
}

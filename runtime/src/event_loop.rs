use core::time::Duration;
use std::rc::Rc;

/// A raw OS socket descriptor: an `int` on Unix, a `SOCKET` on Windows.
#[cfg(unix)]
pub type RawFd = std::os::raw::c_int;
#[cfg(windows)]
pub type RawFd = usize;

/// Interest bit requesting notification when a filedescriptor becomes readable.
pub const READABLE: u8 = 1;
/// Interest bit requesting notification when a filedescriptor becomes writable.
pub const WRITABLE: u8 = 2;

pub type WatchId = u64;
pub type TimerId = u64;
pub type IdleId = u64;

/// Notified when a filedescriptor watched via [`EventLoop::add`]/[`EventLoop::update`] becomes active.
pub trait Monitor {
	/// `readable`/`writable` reflect which of the requested interests fired.
	fn notify(&self, readable: bool, writable: bool);
}

/// Notified when a timer set via [`EventLoop::timer`] expires.
pub trait TimerHandler {
	fn notify(&self);
}

/// Notified once per loop iteration in which the event loop has no other pending work.
pub trait IdleHandler {
	fn idle(&self);
}

/// The event loop abstraction the resolver is built against.
///
/// The resolver never touches a filedescriptor or a timer directly; it is handed an
/// implementation of this trait so it can be driven by whatever event loop the embedding
/// application already runs. [`crate::reactor::PollEventLoop`] is a ready-to-use implementation
/// based on `poll(2)`/`WSAPoll`, for applications with no event loop of their own.
pub trait EventLoop {
	/// Start watching `fd` for the given interest bits (see [`READABLE`]/[`WRITABLE`]).
	///
	/// Returns an identifier that must be passed back to [`update`](Self::update) or
	/// [`remove`](Self::remove) for this watch.
	fn add(&mut self, fd: RawFd, events: u8, monitor: Rc<dyn Monitor>) -> WatchId;

	/// Change the interest bits (and/or monitor) for an existing watch.
	fn update(&mut self, id: WatchId, fd: RawFd, events: u8, monitor: Rc<dyn Monitor>) -> WatchId;

	/// Stop watching a filedescriptor.
	fn remove(&mut self, id: WatchId, fd: RawFd, monitor: &Rc<dyn Monitor>);

	/// Arm a one-shot timer that notifies `timer` after `timeout` elapses.
	fn timer(&mut self, timeout: Duration, timer: Rc<dyn TimerHandler>) -> TimerId;

	/// Cancel a timer that has not yet fired. A no-op if it already fired.
	fn cancel(&mut self, id: TimerId, timer: &Rc<dyn TimerHandler>);

	/// Register a persistent idle watcher, notified whenever the loop has no other work.
	fn idle(&mut self, idle: Rc<dyn IdleHandler>) -> IdleId;
}

use crate::event_loop::RawFd;

#[cfg(unix)]
pub use std::os::fd::AsRawFd;
#[cfg(windows)]
pub use std::os::windows::io::AsRawSocket as AsRawFd;

/// Extract the raw OS descriptor backing a socket, for registration with an [`crate::event_loop::EventLoop`].
pub fn raw_fd<T: AsRawFd>(socket: &T) -> RawFd {
	#[cfg(unix)]
	{
		socket.as_raw_fd()
	}

	#[cfg(windows)]
	{
		socket.as_raw_socket() as RawFd
	}
}

mod hosts;
mod resolvconf;

use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

pub use hosts::HostsTable;
pub use resolvconf::ResolvConf;

use crate::error::{Error, Result};

/// Immutable per-lookup configuration: nameservers, search path, hosts table, and the knobs that
/// drive retry/timeout behavior and resource sizing.
#[derive(Clone, Debug)]
pub struct Config {
	pub(crate) nameservers: Vec<IpAddr>,
	pub(crate) search: Vec<String>,
	pub(crate) ndots: u32,
	pub(crate) hosts: HostsTable,

	pub(crate) dnssec: bool,
	pub(crate) capacity: usize,
	pub(crate) interval: Duration,
	pub(crate) expire: Duration,
	pub(crate) timeout: Duration,
	pub(crate) attempts: u32,
	pub(crate) spread: Duration,
	pub(crate) rotate: bool,
	pub(crate) sockets: usize,
	pub(crate) edns_size: u16,
	pub(crate) max_calls_per_tick: usize,
	pub(crate) rcvbuf: Option<usize>,
	pub(crate) sndbuf: Option<usize>,
}

impl Default for Config {
	fn default() -> Self {
		Config {
			nameservers: Vec::new(),
			search: Vec::new(),
			ndots: 1,
			hosts: HostsTable::default(),

			dnssec: false,
			capacity: 32768,
			interval: Duration::from_secs(2),
			expire: Duration::from_secs(60),
			timeout: Duration::from_secs(5),
			attempts: 2,
			spread: Duration::from_millis(100),
			rotate: false,
			sockets: 1,
			edns_size: 1200,
			max_calls_per_tick: 64,
			rcvbuf: None,
			sndbuf: None,
		}
	}
}

impl Config {
	pub fn builder() -> ConfigBuilder {
		ConfigBuilder(Config::default())
	}

	/// Loads nameservers/search/ndots/rotate/timeout/attempts from `resolv.conf` and the hosts
	/// table from `hosts`, layering them onto the defaults.
	pub fn from_files(resolv_conf: &Path, hosts: &Path) -> Result<Config> {
		let resolv_text = std::fs::read_to_string(resolv_conf).map_err(|source| Error::Io { path: resolv_conf.to_owned(), source })?;
		let hosts_text = std::fs::read_to_string(hosts).map_err(|source| Error::Io { path: hosts.to_owned(), source })?;

		let resolvconf = resolvconf::parse(&resolv_text);
		let hosts = hosts::parse(&hosts_text);

		let mut builder = ConfigBuilder(Config::default());
		builder.0.nameservers = resolvconf.nameservers;
		builder.0.search = resolvconf.search;
		builder.0.ndots = resolvconf.ndots;
		builder.0.rotate = resolvconf.rotate;
		builder.0.timeout = resolvconf.timeout;
		builder.0.attempts = resolvconf.attempts;
		builder.0.hosts = hosts;

		if builder.0.nameservers.is_empty() {
			return Err(Error::NoNameservers);
		}

		Ok(builder.0)
	}

	#[cfg(unix)]
	pub fn from_system() -> Result<Config> {
		Config::from_files(Path::new("/etc/resolv.conf"), Path::new("/etc/hosts"))
	}

	pub fn nameservers(&self) -> &[IpAddr] {
		&self.nameservers
	}

	pub fn search(&self) -> &[String] {
		&self.search
	}

	pub fn ndots(&self) -> u32 {
		self.ndots
	}

	pub fn hosts(&self) -> &HostsTable {
		&self.hosts
	}
}

/// Builder for [`Config`], exposing the setters from the public API surface.
pub struct ConfigBuilder(Config);

impl ConfigBuilder {
	pub fn nameserver(mut self, ip: IpAddr) -> Self {
		self.0.nameservers.push(ip);
		self
	}

	pub fn clear_nameservers(mut self) -> Self {
		self.0.nameservers.clear();
		self
	}

	pub fn dnssec(mut self, enabled: bool) -> Self {
		self.0.dnssec = enabled;
		self
	}

	pub fn capacity(mut self, n: usize) -> Self {
		self.0.capacity = n;
		self
	}

	pub fn interval(mut self, seconds: u64) -> Self {
		self.0.interval = Duration::from_secs(seconds);
		self
	}

	pub fn expire(mut self, seconds: u64) -> Self {
		self.0.expire = Duration::from_secs(seconds);
		self
	}

	pub fn timeout(mut self, seconds: u64) -> Self {
		self.0.timeout = Duration::from_secs(seconds.min(30));
		self
	}

	pub fn attempts(mut self, n: u32) -> Self {
		self.0.attempts = n.min(5);
		self
	}

	pub fn spread(mut self, seconds: f64) -> Self {
		self.0.spread = Duration::from_secs_f64(seconds.max(0.0));
		self
	}

	pub fn rotate(mut self, enabled: bool) -> Self {
		self.0.rotate = enabled;
		self
	}

	/// Sets the floor of the UDP socket pool. The pool only ever grows from here.
	pub fn sockets(mut self, n: usize) -> Self {
		self.0.sockets = n.max(1);
		self
	}

	pub fn buffersize(mut self, bytes: u16) -> Self {
		self.0.edns_size = bytes;
		self
	}

	/// Sets `SO_RCVBUF`/`SO_SNDBUF` on every socket the UDP pool opens. `None` leaves the OS
	/// default in place.
	pub fn socket_buffersize(mut self, rcvbuf: Option<usize>, sndbuf: Option<usize>) -> Self {
		self.0.rcvbuf = rcvbuf;
		self.0.sndbuf = sndbuf;
		self
	}

	pub fn max_calls_per_tick(mut self, n: usize) -> Self {
		self.0.max_calls_per_tick = n.max(1);
		self
	}

	pub fn search(mut self, paths: impl IntoIterator<Item = String>) -> Self {
		self.0.search = paths.into_iter().collect();
		self
	}

	pub fn ndots(mut self, n: u32) -> Self {
		self.0.ndots = n;
		self
	}

	pub fn hosts(mut self, hosts: HostsTable) -> Self {
		self.0.hosts = hosts;
		self
	}

	pub fn build(self) -> Config {
		self.0
	}
}

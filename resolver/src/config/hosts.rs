use std::collections::HashMap;
use std::net::IpAddr;

/// The parsed /etc/hosts table: a host→IPs multimap and its IP→hosts inverse.
///
/// Hostname comparisons are case-insensitive; keys are stored lowercased.
#[derive(Clone, Debug, Default)]
pub struct HostsTable {
	host_to_ips: HashMap<String, Vec<IpAddr>>,
	ip_to_hosts: HashMap<IpAddr, Vec<String>>,
}

impl HostsTable {
	pub fn ips_for(&self, host: &str) -> &[IpAddr] {
		self.host_to_ips.get(&host.to_ascii_lowercase()).map(Vec::as_slice).unwrap_or(&[])
	}

	pub fn hosts_for(&self, ip: &IpAddr) -> &[String] {
		self.ip_to_hosts.get(ip).map(Vec::as_slice).unwrap_or(&[])
	}

	pub fn contains_host(&self, host: &str) -> bool {
		self.host_to_ips.contains_key(&host.to_ascii_lowercase())
	}
}

/// Parses an /etc/hosts-style file: one IP followed by whitespace-separated hostnames per line,
/// `#` comments. Lines without a parseable IP, or with no hostnames, are skipped.
pub fn parse(text: &str) -> HostsTable {
	let mut table = HostsTable::default();

	for line in text.lines() {
		let line = match line.split_once('#') {
			Some((before, _)) => before,
			None => line,
		};

		let mut tokens = line.split_whitespace();

		let Some(ip) = tokens.next().and_then(|s| s.parse::<IpAddr>().ok()) else { continue };

		for host in tokens {
			let lower = host.to_ascii_lowercase();

			table.host_to_ips.entry(lower).or_default().push(ip);
			table.ip_to_hosts.entry(ip).or_default().push(host.to_owned());
		}
	}

	table
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn resolves_both_directions_case_insensitively() {
		let table = parse("10.0.0.5 mybox MyBox.local\n# a comment\n::1 localhost\n");

		assert_eq!(table.ips_for("MYBOX"), &["10.0.0.5".parse::<IpAddr>().unwrap()]);
		assert_eq!(table.ips_for("mybox.local"), &["10.0.0.5".parse::<IpAddr>().unwrap()]);
		assert!(table.contains_host("mybox"));
		assert_eq!(table.hosts_for(&"::1".parse().unwrap()), &["localhost".to_owned()]);
	}

	#[test]
	fn skips_lines_without_a_valid_ip() {
		let table = parse("not-an-ip somehost\n");
		assert!(!table.contains_host("somehost"));
	}
}

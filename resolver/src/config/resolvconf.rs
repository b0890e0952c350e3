use std::net::IpAddr;
use std::time::Duration;

/// Values parsed out of a resolv.conf-style file. Only the produced values matter to the core —
/// how the text is tokenized is an implementation detail mirrored from common resolv.conf parsers.
#[derive(Clone, Debug)]
pub struct ResolvConf {
	pub nameservers: Vec<IpAddr>,
	pub search: Vec<String>,
	pub ndots: u32,
	pub rotate: bool,
	pub timeout: Duration,
	pub attempts: u32,
}

impl Default for ResolvConf {
	fn default() -> Self {
		ResolvConf { nameservers: Vec::new(), search: Vec::new(), ndots: 1, rotate: false, timeout: Duration::from_secs(5), attempts: 2 }
	}
}

/// Parses resolv.conf text. Unrecognized or malformed lines are skipped rather than treated as
/// fatal, matching the permissive behavior real resolvers apply to a file they don't control.
///
/// Repeated `search` (and `domain`, its single-path alias) lines replace rather than accumulate —
/// whichever appears last in the file wins.
pub fn parse(text: &str) -> ResolvConf {
	let mut conf = ResolvConf::default();

	for line in text.lines() {
		let line = line.trim();

		if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
			continue;
		}

		let Some((keyword, rest)) = line.split_once(char::is_whitespace) else { continue };
		let rest = rest.trim();

		match keyword {
			"nameserver" => {
				if let Ok(ip) = rest.parse::<IpAddr>() {
					conf.nameservers.push(ip);
				}
			}
			"domain" => {
				conf.search = vec![rest.to_owned()];
			}
			"search" => {
				conf.search = rest.split_whitespace().map(str::to_owned).collect();
			}
			"options" => {
				for option in rest.split_whitespace() {
					apply_option(&mut conf, option);
				}
			}
			_ => {}
		}
	}

	conf
}

fn apply_option(conf: &mut ResolvConf, option: &str) {
	if option == "rotate" {
		conf.rotate = true;
	} else if let Some(value) = option.strip_prefix("timeout:") {
		if let Ok(seconds) = value.parse::<u64>() {
			conf.timeout = Duration::from_secs(seconds.min(30));
		}
	} else if let Some(value) = option.strip_prefix("attempts:") {
		if let Ok(n) = value.parse::<u32>() {
			conf.attempts = n.min(5);
		}
	} else if let Some(value) = option.strip_prefix("ndots:") {
		if let Ok(n) = value.parse::<u32>() {
			conf.ndots = n;
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_nameservers_and_search() {
		let conf = parse("nameserver 1.1.1.1\nnameserver 8.8.8.8\nsearch corp.local lab.local\noptions ndots:2 rotate timeout:45 attempts:9\n");

		assert_eq!(conf.nameservers.len(), 2);
		assert_eq!(conf.search, vec!["corp.local", "lab.local"]);
		assert_eq!(conf.ndots, 2);
		assert!(conf.rotate);
		assert_eq!(conf.timeout, Duration::from_secs(30));
		assert_eq!(conf.attempts, 5);
	}

	#[test]
	fn last_search_directive_wins() {
		let conf = parse("search first.example\nsearch second.example third.example\n");
		assert_eq!(conf.search, vec!["second.example", "third.example"]);
	}

	#[test]
	fn domain_replaces_search_with_single_path() {
		let conf = parse("search a.example b.example\ndomain c.example\n");
		assert_eq!(conf.search, vec!["c.example"]);
	}

	#[test]
	fn ignores_malformed_lines() {
		let conf = parse("this is not a directive\nnameserver not-an-ip\n");
		assert!(conf.nameservers.is_empty());
	}
}

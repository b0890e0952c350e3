//! The public entry point: validates and submits queries, applies the hosts short-circuit, and
//! wraps under-`ndots` names in a search-path expansion before handing the lookup to the
//! [`Scheduler`].

use std::cell::Cell;
use std::net::IpAddr;
use std::rc::{Rc, Weak};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use runtime::event_loop::EventLoop;

use crate::config::Config;
use crate::lookup::{Lookup, LookupId, RemoteLookup, TcpState, LocalLookup};
use crate::scheduler::{Operation, Scheduler};
use crate::wire::{self, Name, Query, QueryOptions, Question, Response, RCODE_NXDOMAIN, RCODE_SERVFAIL, TYPE_A, TYPE_AAAA, TYPE_PTR};

/// Bits the caller may override on a per-query basis; anything left `None` falls back to the
/// `Context`'s `Config` default.
#[derive(Clone, Copy, Debug, Default)]
pub struct QueryFlags {
	pub recursion_desired: Option<bool>,
	pub dnssec_ok: Option<bool>,
	pub ad: Option<bool>,
	pub cd: Option<bool>,
}

/// Callbacks a submitted query is delivered through. Exactly one of `on_resolved`/`on_failure`/
/// `on_cancelled` fires per accepted query; `on_timeout` fires at most once, always immediately
/// before the `on_failure(SERVFAIL)` it precedes.
///
/// `on_received` is the raw entry point the Scheduler actually calls: its default dispatches a
/// truncated response to `on_failure(SERVFAIL)` and everything else to `on_resolved`. Implementors
/// normally only need `on_resolved`/`on_failure`/`on_timeout`/`on_cancelled`.
pub trait Handler {
	fn on_resolved(&self, _op: Operation, _response: Response) {}
	fn on_failure(&self, _op: Operation, _rcode: u16) {}
	fn on_timeout(&self, _op: Operation) {}
	fn on_cancelled(&self, _op: Operation) {}

	fn on_received(&self, op: Operation, response: Response) {
		if response.truncated() {
			self.on_failure(op, RCODE_SERVFAIL);
		} else {
			self.on_resolved(op, response);
		}
	}
}

/// Owns the Scheduler and the configuration every submitted query is built against.
#[derive(Clone)]
pub struct Context {
	scheduler: Scheduler,
	config: Rc<Config>,
}

impl Context {
	pub fn new(event_loop: Box<dyn EventLoop>, config: Config) -> Context {
		let config = Rc::new(config);
		let hosts = Rc::new(config.hosts().clone());

		let scheduler = Scheduler::new(event_loop, hosts, config.capacity, config.max_calls_per_tick, config.sockets, config.rcvbuf, config.sndbuf);

		Context { scheduler, config }
	}

	/// Submits a forward query. Returns `None` without issuing any callback if `domain` doesn't
	/// fit the wire format or `qtype` isn't one this crate knows how to decode an answer for.
	pub fn query(&self, domain: &str, qtype: u16, flags: QueryFlags, handler: Rc<dyn Handler>) -> Option<Operation> {
		if !supported_qtype(qtype) {
			return None;
		}

		let name = Name::from_str(domain);

		if name.is_root() || name.encode(&mut Vec::new()).is_err() {
			return None;
		}

		if let Some(ips) = self.hosts_forward(&name, qtype) {
			let rd = flags.recursion_desired.unwrap_or(true);
			let question = Question { name: name.clone(), qtype, qclass: wire::CLASS_IN };
			let response = crate::fake::forward(0, rd, &question, ips);
			let id = self.scheduler.add(Lookup::Local(LocalLookup { handler, response, finished: false }));
			return Some(Operation::new(self.scheduler.handle(), id));
		}

		let wrap_in_search = !domain.ends_with('.') && name.dot_count() < self.config.ndots as usize && !self.config.search.is_empty();

		if wrap_in_search {
			return Some(self.submit_search(name, qtype, flags, handler));
		}

		let id = self.submit_remote(&name, qtype, flags, handler)?;
		Some(Operation::new(self.scheduler.handle(), id))
	}

	/// Reverse PTR shortcut: composes `d.c.b.a.in-addr.arpa` (v4) or the 32-nibble `.ip6.arpa`
	/// name (v6), consults the hosts table, and otherwise submits an ordinary `RemoteLookup`.
	pub fn query_ptr(&self, ip: IpAddr, handler: Rc<dyn Handler>) -> Operation {
		let name = reverse_name(ip);

		if let Some(hosts) = self.hosts_reverse(&ip) {
			let question = Question { name: name.clone(), qtype: TYPE_PTR, qclass: wire::CLASS_IN };
			let response = crate::fake::reverse(0, true, &question, hosts);
			let id = self.scheduler.add(Lookup::Local(LocalLookup { handler, response, finished: false }));
			return Operation::new(self.scheduler.handle(), id);
		}

		let flags = QueryFlags::default();
		let id = self.submit_remote(&name, TYPE_PTR, flags, handler).expect("a reverse name built from a valid IpAddr always fits the wire format");

		Operation::new(self.scheduler.handle(), id)
	}

	fn hosts_forward(&self, name: &Name, qtype: u16) -> Option<&[IpAddr]> {
		if qtype != TYPE_A && qtype != TYPE_AAAA {
			return None;
		}

		let ips = self.config.hosts().ips_for(&name.0);
		let matching = ips.iter().any(|ip| matches!((qtype, ip), (t, IpAddr::V4(_)) if t == TYPE_A) || matches!((qtype, ip), (t, IpAddr::V6(_)) if t == TYPE_AAAA));

		if matching {
			Some(ips)
		} else {
			None
		}
	}

	fn hosts_reverse(&self, ip: &IpAddr) -> Option<&[String]> {
		let hosts = self.config.hosts().hosts_for(ip);
		if hosts.is_empty() {
			None
		} else {
			Some(hosts)
		}
	}

	fn submit_search(&self, base: Name, qtype: u16, flags: QueryFlags, user: Rc<dyn Handler>) -> Operation {
		let redirect = Rc::new(Cell::new(0usize));

		let search = Rc::new_cyclic(|weak| SearchHandler {
			self_weak: weak.clone(),
			scheduler: self.scheduler.clone(),
			config: self.config.clone(),
			user,
			base,
			qtype,
			flags,
			cursor: Cell::new(0),
			redirect: redirect.clone(),
		});

		let first = search.config.search[0].clone();
		let candidate = search.base.join(&first);
		let handler: Rc<dyn Handler> = search.clone();

		let id = self.submit_remote(&candidate, qtype, flags, handler).expect("a validated domain joined with a search suffix still fits the wire format");

		redirect.set(id);

		Operation { inner: self.scheduler.handle(), id: redirect }
	}

	fn submit_remote(&self, name: &Name, qtype: u16, flags: QueryFlags, handler: Rc<dyn Handler>) -> Option<LookupId> {
		let lookup = build_remote(&self.config, name, qtype, flags, handler)?;
		Some(self.scheduler.add(Lookup::Remote(lookup)))
	}
}

fn supported_qtype(qtype: u16) -> bool {
	matches!(qtype, wire::TYPE_A | wire::TYPE_AAAA | wire::TYPE_PTR | wire::TYPE_CNAME | wire::TYPE_MX | wire::TYPE_TXT | wire::TYPE_NS | wire::TYPE_SOA | wire::TYPE_TLSA | wire::TYPE_CAA | wire::TYPE_RRSIG | wire::TYPE_DNSKEY)
}

/// Builds a `RemoteLookup` ready to hand to the Scheduler. Fails only if `name`/`qtype` can't be
/// encoded into a query (oversized name) — `Context::query` has already screened for that, so in
/// practice this only fails for a search candidate that grows past the wire limit after joining.
fn build_remote(config: &Config, name: &Name, qtype: u16, flags: QueryFlags, handler: Rc<dyn Handler>) -> Option<RemoteLookup> {
	let servers: Rc<[IpAddr]> = config.nameservers().into();

	let opts = QueryOptions {
		recursion_desired: flags.recursion_desired.unwrap_or(true),
		ad: flags.ad.unwrap_or(false),
		cd: flags.cd.unwrap_or(false),
		dnssec_ok: flags.dnssec_ok.unwrap_or(config.dnssec),
		edns_payload: config.edns_size,
	};

	let id = wire::id::generate(|_| false);
	let query = build_query(id, name, qtype, opts)?;

	let start_index = if config.rotate { rotate_start_index(servers.len()) } else { 0 };

	// `interval` is the round spacing, capped by the resolv.conf `timeout` ceiling.
	let interval = config.interval.min(config.timeout);

	Some(RemoteLookup {
		handler,
		query,
		question_name: name.clone(),
		qtype,
		rd: opts.recursion_desired,
		servers,
		start_index,
		attempts: config.attempts,
		interval,
		spread: config.spread,
		expire: config.expire,
		count: 0,
		start: Instant::now(),
		udp_socket: None,
		tcp: TcpState::None,
		subscribed_peers: Vec::new(),
		finished: false,
		truncated_response: None,
	})
}

fn build_query(id: u16, name: &Name, qtype: u16, opts: QueryOptions) -> Option<Query> {
	Query::build(id, name, qtype, opts).ok()
}

fn rotate_start_index(nservers: usize) -> usize {
	if nservers == 0 {
		return 0;
	}

	let seed = SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_nanos() as usize).unwrap_or(0);

	seed % nservers
}

/// Composes the reverse-lookup name per RFC 1035 §3.5/RFC 3596: `d.c.b.a.in-addr.arpa` for v4,
/// the 32-nibble (least-significant first) `.ip6.arpa` name for v6.
fn reverse_name(ip: IpAddr) -> Name {
	match ip {
		IpAddr::V4(v4) => {
			let octets = v4.octets();
			Name(format!("{}.{}.{}.{}.in-addr.arpa", octets[3], octets[2], octets[1], octets[0]))
		}
		IpAddr::V6(v6) => {
			let mut labels = Vec::with_capacity(32);

			for byte in v6.octets().iter().rev() {
				labels.push(format!("{:x}", byte & 0xf));
				labels.push(format!("{:x}", byte >> 4));
			}

			Name(format!("{}.ip6.arpa", labels.join(".")))
		}
	}
}

/// Wraps a user `Handler` behind the under-`ndots` search-path expansion: advances to the next
/// configured suffix when a candidate comes back NXDOMAIN or with zero answers of the requested
/// type, and forwards whatever the final (bare-domain) attempt returns verbatim.
struct SearchHandler {
	self_weak: Weak<SearchHandler>,
	scheduler: Scheduler,
	config: Rc<Config>,
	user: Rc<dyn Handler>,
	base: Name,
	qtype: u16,
	flags: QueryFlags,
	/// Index into `config.search` of the candidate currently in flight. Equal to
	/// `config.search.len()` while the final bare-domain attempt is outstanding.
	cursor: Cell<usize>,
	redirect: Rc<Cell<LookupId>>,
}

impl SearchHandler {
	fn on_bare_attempt(&self) -> bool {
		self.cursor.get() == self.config.search.len()
	}

	fn outer(&self) -> Operation {
		Operation { inner: self.scheduler.handle(), id: self.redirect.clone() }
	}

	fn advance(&self) {
		let next = self.cursor.get() + 1;
		self.cursor.set(next);

		let candidate = if next < self.config.search.len() { self.base.join(&self.config.search[next]) } else { self.base.clone() };

		let handler: Rc<dyn Handler> = self.self_weak.upgrade().expect("SearchHandler outlives the sub-lookup it just submitted");

		match build_remote(&self.config, &candidate, self.qtype, self.flags, handler) {
			Some(lookup) => {
				let id = self.scheduler.add(Lookup::Remote(lookup));
				self.redirect.set(id);
			}
			None => self.user.on_failure(self.outer(), RCODE_SERVFAIL),
		}
	}
}

impl Handler for SearchHandler {
	fn on_received(&self, _op: Operation, response: Response) {
		if self.on_bare_attempt() {
			self.user.on_received(self.outer(), response);
			return;
		}

		let has_answer = response.answers.iter().any(|r| r.rtype == self.qtype);

		if has_answer {
			self.user.on_received(self.outer(), response);
		} else {
			self.advance();
		}
	}

	fn on_failure(&self, _op: Operation, rcode: u16) {
		if self.on_bare_attempt() || rcode != RCODE_NXDOMAIN {
			self.user.on_failure(self.outer(), rcode);
		} else {
			self.advance();
		}
	}

	fn on_timeout(&self, _op: Operation) {
		self.user.on_timeout(self.outer());
	}

	fn on_cancelled(&self, _op: Operation) {
		self.user.on_cancelled(self.outer());
	}
}

/// End-to-end scenarios driving a real [`runtime::reactor::PollEventLoop`] against fake
/// nameservers bound to loopback addresses on port 53 (these tests must run with permission to
/// bind a privileged port). Each fake nameserver runs on its own address so the tests can run
/// concurrently without colliding.
#[cfg(test)]
mod tests {
	use std::cell::RefCell;
	use std::io::{Read, Write};
	use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener, UdpSocket};
	use std::sync::atomic::{AtomicBool, Ordering};
	use std::sync::Arc;
	use std::thread;
	use std::time::Duration;

	use runtime::reactor::PollEventLoop;

	use super::*;
	use crate::wire::{RCODE_NOERROR, RCODE_NXDOMAIN, TYPE_A};

	/// Hand-packs a minimal response: header + the echoed question + zero or more A answers
	/// pointing back at it. `Response` has no general encoder of its own — the crate only ever
	/// needs to build outgoing queries — so test fixtures roll their own, the same way `fake.rs`
	/// does for synthesized hosts-table answers.
	fn encode_response(id: u16, rcode: u16, truncated: bool, question: &[u8], qtype: u16, answers: &[[u8; 4]]) -> Vec<u8> {
		let mut buf = Vec::new();
		buf.extend_from_slice(&id.to_be_bytes());

		let mut flags: u16 = rcode & 0xf;
		flags |= 1 << 15; // qr
		if truncated {
			flags |= 1 << 9; // tc
		}
		buf.extend_from_slice(&flags.to_be_bytes());

		buf.extend_from_slice(&1u16.to_be_bytes()); // qdcount
		buf.extend_from_slice(&(answers.len() as u16).to_be_bytes());
		buf.extend_from_slice(&0u16.to_be_bytes());
		buf.extend_from_slice(&0u16.to_be_bytes());

		buf.extend_from_slice(question);

		for ip in answers {
			buf.push(0xc0);
			buf.push(0x0c); // pointer back at the question's name, right after the header
			buf.extend_from_slice(&qtype.to_be_bytes());
			buf.extend_from_slice(&1u16.to_be_bytes()); // class IN
			buf.extend_from_slice(&0u32.to_be_bytes()); // ttl
			buf.extend_from_slice(&4u16.to_be_bytes());
			buf.extend_from_slice(ip);
		}

		buf
	}

	/// Pulls the transaction id, the dotted question name, and the raw question-section bytes out
	/// of a query datagram, so a fake nameserver can branch on the name and echo the question
	/// verbatim without re-encoding it.
	fn split_query(datagram: &[u8]) -> (u16, String, Vec<u8>) {
		let id = u16::from_be_bytes([datagram[0], datagram[1]]);

		let mut cursor = 12;
		let mut labels = Vec::new();

		while datagram[cursor] != 0 {
			let len = datagram[cursor] as usize;
			labels.push(String::from_utf8_lossy(&datagram[cursor + 1..cursor + 1 + len]).into_owned());
			cursor += len + 1;
		}

		cursor += 1 + 4; // root label + QTYPE + QCLASS

		(id, labels.join("."), datagram[12..cursor].to_vec())
	}

	fn udp_fake_server(addr: SocketAddr, respond: impl Fn(u16, &str, &[u8]) -> Vec<u8> + Send + 'static, stop: Arc<AtomicBool>) -> thread::JoinHandle<()> {
		let socket = UdpSocket::bind(addr).expect("bind loopback:53 (test must run with permission to bind a privileged port)");
		socket.set_read_timeout(Some(Duration::from_millis(50))).unwrap();

		thread::spawn(move || {
			let mut buf = [0u8; 512];

			while !stop.load(Ordering::Relaxed) {
				if let Ok((n, peer)) = socket.recv_from(&mut buf) {
					let (id, qname, question) = split_query(&buf[..n]);
					let reply = respond(id, &qname, &question);
					let _ = socket.send_to(&reply, peer);
				}
			}
		})
	}

	/// Accepts exactly one TCP connection, reads one length-prefixed query, writes back one
	/// length-prefixed reply, and keeps looping for new connections until `stop` is set.
	fn tcp_fake_server(addr: SocketAddr, respond: impl Fn(u16, &str, &[u8]) -> Vec<u8> + Send + 'static, stop: Arc<AtomicBool>) -> thread::JoinHandle<()> {
		let listener = TcpListener::bind(addr).expect("bind loopback:53 (test must run with permission to bind a privileged port)");
		listener.set_nonblocking(true).unwrap();

		thread::spawn(move || {
			while !stop.load(Ordering::Relaxed) {
				let mut stream = match listener.accept() {
					Ok((stream, _)) => stream,
					Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
						thread::sleep(Duration::from_millis(20));
						continue;
					}
					Err(_) => break,
				};

				stream.set_read_timeout(Some(Duration::from_millis(200))).ok();

				let mut len_buf = [0u8; 2];
				if stream.read_exact(&mut len_buf).is_err() {
					continue;
				}

				let mut msg = vec![0u8; u16::from_be_bytes(len_buf) as usize];
				if stream.read_exact(&mut msg).is_err() {
					continue;
				}

				let (id, qname, question) = split_query(&msg);
				let reply = respond(id, &qname, &question);

				let mut framed = (reply.len() as u16).to_be_bytes().to_vec();
				framed.extend_from_slice(&reply);
				let _ = stream.write_all(&framed);
			}
		})
	}

	#[derive(Default)]
	struct Collected {
		responses: Vec<Response>,
		failures: Vec<u16>,
		timeouts: usize,
		cancellations: usize,
	}

	/// Records every terminal callback and flips `done` once one fires, so the test's driving loop
	/// knows when to stop. `on_timeout` is always immediately followed by `on_failure(SERVFAIL)`
	/// (see `scheduler::Decision::Timeout`), so only the latter needs to signal completion.
	struct Recorder {
		collected: RefCell<Collected>,
		done: Rc<Cell<bool>>,
	}

	impl Handler for Recorder {
		fn on_resolved(&self, _op: Operation, response: Response) {
			self.collected.borrow_mut().responses.push(response);
			self.done.set(true);
		}

		fn on_failure(&self, _op: Operation, rcode: u16) {
			self.collected.borrow_mut().failures.push(rcode);
			self.done.set(true);
		}

		fn on_timeout(&self, _op: Operation) {
			self.collected.borrow_mut().timeouts += 1;
		}

		fn on_cancelled(&self, _op: Operation) {
			self.collected.borrow_mut().cancellations += 1;
			self.done.set(true);
		}
	}

	fn run_with_deadline(reactor: &PollEventLoop, done: &Rc<Cell<bool>>, deadline: Duration) {
		let start = Instant::now();
		reactor.run(|| done.get() || start.elapsed() > deadline).unwrap();
	}

	fn loopback(last: u8) -> SocketAddr {
		SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, last)), 53)
	}

	#[test]
	fn resolves_a_record_happy_path() {
		let addr = loopback(11);
		let stop = Arc::new(AtomicBool::new(false));
		let server = udp_fake_server(addr, |id, _qname, question| encode_response(id, RCODE_NOERROR, false, question, TYPE_A, &[[93, 184, 216, 34]]), stop.clone());

		let reactor = PollEventLoop::new();
		let config = Config::builder().nameserver(addr.ip()).build();
		let context = Context::new(Box::new(reactor.clone()), config);

		let done = Rc::new(Cell::new(false));
		let recorder = Rc::new(Recorder { collected: RefCell::new(Collected::default()), done: done.clone() });

		let op = context.query("example.com.", TYPE_A, QueryFlags::default(), recorder.clone());
		assert!(op.is_some());

		run_with_deadline(&reactor, &done, Duration::from_secs(2));

		stop.store(true, Ordering::Relaxed);
		server.join().unwrap();

		let collected = recorder.collected.borrow();
		assert!(collected.failures.is_empty());
		assert_eq!(collected.responses.len(), 1);
		assert_eq!(&*collected.responses[0].answers[0].rdata, &[93, 184, 216, 34]);
	}

	#[test]
	fn truncated_udp_response_falls_back_to_tcp() {
		let addr = loopback(12);
		let stop = Arc::new(AtomicBool::new(false));

		let udp = udp_fake_server(addr, |id, _qname, question| encode_response(id, RCODE_NOERROR, true, question, TYPE_A, &[]), stop.clone());
		let tcp = tcp_fake_server(addr, |id, _qname, question| encode_response(id, RCODE_NOERROR, false, question, TYPE_A, &[[198, 51, 100, 7]]), stop.clone());

		let reactor = PollEventLoop::new();
		let config = Config::builder().nameserver(addr.ip()).build();
		let context = Context::new(Box::new(reactor.clone()), config);

		let done = Rc::new(Cell::new(false));
		let recorder = Rc::new(Recorder { collected: RefCell::new(Collected::default()), done: done.clone() });

		context.query("big.example.", TYPE_A, QueryFlags::default(), recorder.clone());

		run_with_deadline(&reactor, &done, Duration::from_secs(3));

		stop.store(true, Ordering::Relaxed);
		udp.join().unwrap();
		tcp.join().unwrap();

		let collected = recorder.collected.borrow();
		assert!(collected.failures.is_empty());
		assert_eq!(collected.responses.len(), 1);
		assert!(!collected.responses[0].truncated());
		assert_eq!(&*collected.responses[0].answers[0].rdata, &[198, 51, 100, 7]);
	}

	#[test]
	fn retries_across_servers_when_first_is_silent() {
		let silent = loopback(13);
		let responsive = loopback(14);
		let stop = Arc::new(AtomicBool::new(false));

		// Bound but unresponsive, simulating a nameserver that drops every datagram it receives.
		let silent_socket = UdpSocket::bind(silent).expect("bind loopback:53 (test must run with permission to bind a privileged port)");
		silent_socket.set_read_timeout(Some(Duration::from_millis(50))).unwrap();
		let silent_stop = stop.clone();
		let silent_thread = thread::spawn(move || {
			let mut buf = [0u8; 512];
			while !silent_stop.load(Ordering::Relaxed) {
				let _ = silent_socket.recv_from(&mut buf);
			}
		});

		let responsive_thread = udp_fake_server(responsive, |id, _qname, question| encode_response(id, RCODE_NOERROR, false, question, TYPE_A, &[[203, 0, 113, 9]]), stop.clone());

		let reactor = PollEventLoop::new();
		let config = Config::builder().nameserver(silent.ip()).nameserver(responsive.ip()).attempts(1).spread(0.05).interval(1).build();
		let context = Context::new(Box::new(reactor.clone()), config);

		let done = Rc::new(Cell::new(false));
		let recorder = Rc::new(Recorder { collected: RefCell::new(Collected::default()), done: done.clone() });

		context.query("retry.example.", TYPE_A, QueryFlags::default(), recorder.clone());

		run_with_deadline(&reactor, &done, Duration::from_secs(3));

		stop.store(true, Ordering::Relaxed);
		silent_thread.join().unwrap();
		responsive_thread.join().unwrap();

		let collected = recorder.collected.borrow();
		assert!(collected.failures.is_empty());
		assert_eq!(collected.responses.len(), 1);
		assert_eq!(&*collected.responses[0].answers[0].rdata, &[203, 0, 113, 9]);
	}

	/// The hosts table only maps the name to a v6 address, so `hosts_forward` never short-circuits
	/// an A query for it — this exercises the Scheduler's own NXDOMAIN-override path, not the
	/// upfront hosts shortcut in `Context::query`.
	#[test]
	fn nxdomain_is_overridden_by_a_matching_hosts_entry() {
		let addr = loopback(15);
		let stop = Arc::new(AtomicBool::new(false));
		let server = udp_fake_server(addr, |id, _qname, question| encode_response(id, RCODE_NXDOMAIN, false, question, TYPE_A, &[]), stop.clone());

		let dir = std::env::temp_dir().join(format!("resolver-nxdomain-override-test-{}", std::process::id()));
		std::fs::create_dir_all(&dir).unwrap();
		let resolv_path = dir.join("resolv.conf");
		let hosts_path = dir.join("hosts");
		std::fs::write(&resolv_path, format!("nameserver {}\n", addr.ip())).unwrap();
		std::fs::write(&hosts_path, "::9 overridden.example\n").unwrap();

		let config = Config::from_files(&resolv_path, &hosts_path).unwrap();
		let _ = std::fs::remove_dir_all(&dir);

		let reactor = PollEventLoop::new();
		let context = Context::new(Box::new(reactor.clone()), config);

		let done = Rc::new(Cell::new(false));
		let recorder = Rc::new(Recorder { collected: RefCell::new(Collected::default()), done: done.clone() });

		context.query("overridden.example.", TYPE_A, QueryFlags::default(), recorder.clone());

		run_with_deadline(&reactor, &done, Duration::from_secs(2));

		stop.store(true, Ordering::Relaxed);
		server.join().unwrap();

		let collected = recorder.collected.borrow();
		assert!(collected.failures.is_empty(), "NXDOMAIN should have been overridden by the hosts entry");
		assert_eq!(collected.responses.len(), 1);
		assert_eq!(collected.responses[0].rcode, RCODE_NOERROR);
		assert!(collected.responses[0].answers.is_empty());
	}

	#[test]
	fn search_path_expansion_falls_back_to_bare_name() {
		let addr = loopback(16);
		let stop = Arc::new(AtomicBool::new(false));

		let server = udp_fake_server(
			addr,
			|id, qname, question| {
				if qname.eq_ignore_ascii_case("db.example.com") {
					encode_response(id, RCODE_NXDOMAIN, false, question, TYPE_A, &[])
				} else {
					encode_response(id, RCODE_NOERROR, false, question, TYPE_A, &[[172, 16, 0, 4]])
				}
			},
			stop.clone(),
		);

		let reactor = PollEventLoop::new();
		let config = Config::builder().nameserver(addr.ip()).search(["example.com".to_owned()]).ndots(1).build();
		let context = Context::new(Box::new(reactor.clone()), config);

		let done = Rc::new(Cell::new(false));
		let recorder = Rc::new(Recorder { collected: RefCell::new(Collected::default()), done: done.clone() });

		let op = context.query("db", TYPE_A, QueryFlags::default(), recorder.clone());
		assert!(op.is_some());

		run_with_deadline(&reactor, &done, Duration::from_secs(3));

		stop.store(true, Ordering::Relaxed);
		server.join().unwrap();

		let collected = recorder.collected.borrow();
		assert!(collected.failures.is_empty());
		assert_eq!(collected.responses.len(), 1);
		assert_eq!(&*collected.responses[0].answers[0].rdata, &[172, 16, 0, 4]);
	}

	#[test]
	fn cancelling_mid_flight_reports_cancellation_not_timeout() {
		let addr = loopback(17);
		let stop = Arc::new(AtomicBool::new(false));

		// Drains whatever the first attempt sends so the loopback socket doesn't otherwise bounce
		// an ICMP port-unreachable back at it; never actually answers.
		let socket = UdpSocket::bind(addr).expect("bind loopback:53 (test must run with permission to bind a privileged port)");
		socket.set_read_timeout(Some(Duration::from_millis(50))).unwrap();
		let server_stop = stop.clone();
		let server = thread::spawn(move || {
			let mut buf = [0u8; 512];
			while !server_stop.load(Ordering::Relaxed) {
				let _ = socket.recv_from(&mut buf);
			}
		});

		let reactor = PollEventLoop::new();
		let config = Config::builder().nameserver(addr.ip()).expire(30).build();
		let context = Context::new(Box::new(reactor.clone()), config);

		let done = Rc::new(Cell::new(false));
		let recorder = Rc::new(Recorder { collected: RefCell::new(Collected::default()), done: done.clone() });

		let op = context.query("cancel.example.", TYPE_A, QueryFlags::default(), recorder.clone()).expect("valid domain");

		// The first UDP attempt is sent synchronously by `Scheduler::add`, before the reactor is
		// ever driven, so cancellation can race it immediately without waiting on an event loop tick.
		op.cancel();

		run_with_deadline(&reactor, &done, Duration::from_millis(500));

		stop.store(true, Ordering::Relaxed);
		server.join().unwrap();

		let collected = recorder.collected.borrow();
		assert_eq!(collected.cancellations, 1);
		assert_eq!(collected.timeouts, 0);
		assert!(collected.failures.is_empty());
		assert!(collected.responses.is_empty());
	}
}

//! Synthesizes wire-format DNS responses answered locally from the hosts table, so that
//! `LocalLookup` and the NXDOMAIN-override path can be delivered through the same
//! [`wire::Response`] shape as a real nameserver reply.

use std::net::IpAddr;

use crate::wire::{self, Name, Question, Response, CLASS_IN, TYPE_A, TYPE_AAAA, TYPE_PTR};

struct AnswerRecord {
	name: Name,
	rtype: u16,
	rdata: Vec<u8>,
}

/// A forward A/AAAA answer per matching IP of the appropriate family, TTL=0.
pub fn forward(id: u16, rd: bool, question: &Question, ips: &[IpAddr]) -> Response {
	let answers = ips
		.iter()
		.filter_map(|ip| match (question.qtype, ip) {
			(t, IpAddr::V4(v4)) if t == TYPE_A => Some(AnswerRecord { name: question.name.clone(), rtype: TYPE_A, rdata: v4.octets().to_vec() }),
			(t, IpAddr::V6(v6)) if t == TYPE_AAAA => Some(AnswerRecord { name: question.name.clone(), rtype: TYPE_AAAA, rdata: v6.octets().to_vec() }),
			_ => None,
		})
		.collect();

	build(id, rd, question.clone(), answers)
}

/// A PTR answer per hostname mapped to the queried IP.
pub fn reverse(id: u16, rd: bool, question: &Question, hostnames: &[String]) -> Response {
	let answers = hostnames
		.iter()
		.filter_map(|host| {
			let mut rdata = Vec::new();
			Name::from_str(host).encode(&mut rdata).ok()?;
			Some(AnswerRecord { name: question.name.clone(), rtype: TYPE_PTR, rdata })
		})
		.collect();

	build(id, rd, question.clone(), answers)
}

/// The NXDOMAIN-override case: the question is preserved, the answer section is empty.
pub fn nxdomain_override(id: u16, rd: bool, question: &Question) -> Response {
	build(id, rd, question.clone(), Vec::new())
}

fn build(id: u16, rd: bool, question: Question, answers: Vec<AnswerRecord>) -> Response {
	let mut buf = Vec::new();

	// `id` is never interpreted, only echoed and compared byte-for-byte against what we sent —
	// write it the same opaque way `Query::build` does.
	buf.extend_from_slice(&id.to_ne_bytes());

	// QR=1, RD mirrored, RA=1, AD=1, opcode=QUERY, rcode=NOERROR.
	let mut flags: u16 = 0;
	flags |= 1 << 5; // ad
	flags |= 1 << 7; // ra
	flags |= (rd as u16) << 8;
	flags |= 1 << 15; // qr
	buf.extend_from_slice(&flags.to_be_bytes());

	buf.extend_from_slice(&1u16.to_be_bytes()); // qdcount
	buf.extend_from_slice(&(answers.len() as u16).to_be_bytes()); // ancount
	buf.extend_from_slice(&0u16.to_be_bytes()); // nscount
	buf.extend_from_slice(&0u16.to_be_bytes()); // arcount

	question.name.encode(&mut buf).expect("hosts-table names fit within wire limits");
	buf.extend_from_slice(&question.qtype.to_be_bytes());
	buf.extend_from_slice(&question.qclass.to_be_bytes());

	for answer in &answers {
		answer.name.encode(&mut buf).expect("hosts-table names fit within wire limits");
		buf.extend_from_slice(&answer.rtype.to_be_bytes());
		buf.extend_from_slice(&CLASS_IN.to_be_bytes());
		buf.extend_from_slice(&0u32.to_be_bytes()); // ttl=0
		buf.extend_from_slice(&(answer.rdata.len() as u16).to_be_bytes());
		buf.extend_from_slice(&answer.rdata);
	}

	wire::Response::parse(wire::to_bytes(buf)).expect("synthesized fake response is well-formed")
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn synthesizes_forward_a_answer() {
		let question = Question { name: Name::from_str("mybox"), qtype: TYPE_A, qclass: CLASS_IN };
		let response = forward(7, true, &question, &["10.0.0.5".parse().unwrap()]);

		assert_eq!(response.id, 7);
		assert!(response.qr);
		assert!(response.rd);
		assert_eq!(response.rcode, 0);
		assert_eq!(response.answers.len(), 1);
		assert_eq!(response.answers[0].rtype, TYPE_A);
		assert_eq!(&*response.answers[0].rdata, &[10, 0, 0, 5]);
	}

	#[test]
	fn nxdomain_override_has_empty_answers() {
		let question = Question { name: Name::from_str("mybox"), qtype: TYPE_A, qclass: CLASS_IN };
		let response = nxdomain_override(7, false, &question);

		assert_eq!(response.rcode, 0);
		assert!(response.answers.is_empty());
		assert_eq!(response.questions.len(), 1);
	}
}

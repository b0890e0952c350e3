//! DNS message encoding/decoding: header and question construction, EDNS(0) OPT pseudo-records,
//! response parsing with name decompression, and query/response matching.

pub mod id;
mod name;

use bilge::prelude::*;
use collections::bytes::{Bytes, Cursor, Slice};
use utils::bytes::Cast;
use utils::endian::{u16be, u32be, BigEndian};

pub use name::Name;

pub const CLASS_IN: u16 = 1;

pub const RCODE_NOERROR: u16 = 0;
pub const RCODE_SERVFAIL: u16 = 2;
pub const RCODE_NXDOMAIN: u16 = 3;

pub const TYPE_A: u16 = 1;
pub const TYPE_NS: u16 = 2;
pub const TYPE_CNAME: u16 = 5;
pub const TYPE_SOA: u16 = 6;
pub const TYPE_PTR: u16 = 12;
pub const TYPE_MX: u16 = 15;
pub const TYPE_TXT: u16 = 16;
pub const TYPE_AAAA: u16 = 28;
pub const TYPE_OPT: u16 = 41;
pub const TYPE_RRSIG: u16 = 46;
pub const TYPE_DNSKEY: u16 = 48;
pub const TYPE_TLSA: u16 = 52;
pub const TYPE_CAA: u16 = 257;

const HEADER_LEN: usize = 12;
const MAX_QUERY_TAIL: usize = name::MAX_NAME_LEN + 4 + 11;

#[derive(Debug, thiserror::Error)]
pub enum WireError {
	#[error("message is truncated")]
	Truncated,
	#[error("label exceeds 63 octets")]
	LabelTooLong,
	#[error("name exceeds 255 octets")]
	NameTooLong,
	#[error("malformed compression label")]
	MalformedLabel,
	#[error("compression pointer does not strictly decrease")]
	CompressionLoop,
}

#[bitsize(4)]
#[derive(FromBits, Clone, Copy, PartialEq, Eq, Debug)]
pub enum Opcode {
	Query = 0,
	IQuery = 1,
	Status = 2,
	Notify = 4,
	Update = 5,
	#[fallback]
	Reserved,
}

#[bitsize(4)]
#[derive(FromBits, Clone, Copy, PartialEq, Eq, Debug)]
pub enum Rcode {
	NoError = 0,
	FormatError = 1,
	ServFail = 2,
	NxDomain = 3,
	NotImplemented = 4,
	Refused = 5,
	YxDomain = 6,
	YxRrSet = 7,
	NxRrSet = 8,
	NotAuth = 9,
	NotZone = 10,
	#[fallback]
	Reserved,
}

/// Bit layout of the 16-bit flags word, declared LSB-first so that wrapping it in
/// [`BigEndian`] reproduces the on-the-wire bit order regardless of host endianness.
#[bitsize(16)]
#[derive(FromBits, Clone, Copy)]
pub struct Flags {
	pub rcode: Rcode,
	pub cd: bool,
	pub ad: bool,
	pub z: bool,
	pub ra: bool,
	pub rd: bool,
	pub tc: bool,
	pub aa: bool,
	pub opcode: Opcode,
	pub qr: bool,
}

#[derive(Cast)]
#[repr(C)]
struct Header {
	id: u16,
	flags: BigEndian<Flags>,
	qdcount: u16be,
	ancount: u16be,
	nscount: u16be,
	arcount: u16be,
}

/// Bits the caller may request on an outgoing query.
#[derive(Clone, Copy, Debug, Default)]
pub struct QueryOptions {
	pub recursion_desired: bool,
	pub ad: bool,
	pub cd: bool,
	pub dnssec_ok: bool,
	pub edns_payload: u16,
}

#[derive(Clone, Debug)]
pub struct Question {
	pub name: Name,
	pub qtype: u16,
	pub qclass: u16,
}

/// An encoded DNS request, ready to be sent verbatim over UDP or (length-prefixed) TCP.
#[derive(Clone)]
pub struct Query {
	pub id: u16,
	pub question: Question,
	pub bytes: Bytes,
}

impl Query {
	pub fn build(id: u16, name: &Name, qtype: u16, opts: QueryOptions) -> Result<Query, WireError> {
		// Header + max name (255) + QTYPE/QCLASS + a generously-sized OPT record. `Cursor::vec`
		// truncates back down to what was actually written.
		let mut buf = vec![0u8; HEADER_LEN + MAX_QUERY_TAIL];

		Cursor::vec(&mut buf, |cursor| -> Result<(), WireError> {
			let (header, mut cursor): (&mut Header, _) = cursor.split();

			header.id = id;
			header.flags = Flags::new(Rcode::NoError, opts.cd, opts.ad, false, false, opts.recursion_desired, false, false, Opcode::Query, false).into();
			header.qdcount = 1.into();
			header.ancount = 0.into();
			header.nscount = 0.into();
			header.arcount = (if opts.dnssec_ok { 1u16 } else { 0 }).into();

			let mut name_bytes = Vec::new();
			name.encode(&mut name_bytes)?;
			cursor = cursor.push(name_bytes.as_slice());

			cursor = cursor.push(&BigEndian::from(qtype));
			cursor = cursor.push(&BigEndian::from(CLASS_IN));

			if opts.dnssec_ok {
				// Root name (empty), TYPE=OPT, CLASS=advertised UDP payload size.
				cursor = cursor.push(&0u8);
				cursor = cursor.push(&BigEndian::from(TYPE_OPT));
				cursor = cursor.push(&BigEndian::from(opts.edns_payload));

				// extended-rcode(8) | version(8) | DO(1) + reserved(15)
				let ttl: u32 = 1u32 << 15;
				cursor = cursor.push(&BigEndian::from(ttl));

				// rdlength = 0
				cursor.push(&BigEndian::from(0u16));
			}

			Ok(())
		})?;

		Ok(Query { id, question: Question { name: name.clone(), qtype, qclass: CLASS_IN }, bytes: to_bytes(buf) })
	}
}

pub(crate) fn to_bytes(buf: Vec<u8>) -> Bytes {
	let mut out = Bytes::new(buf.len());
	out.copy_from_slice(&buf);
	out
}

#[derive(Clone, Debug)]
pub struct Record {
	pub name: Name,
	pub rtype: u16,
	pub rclass: u16,
	pub ttl: u32,
	pub rdata: Slice,
}

#[derive(Clone, Copy, Debug)]
pub struct Edns {
	pub udp_payload: u16,
	pub version: u8,
	pub dnssec_ok: bool,
}

/// A parsed view over a received DNS message. `message` keeps the backing allocation alive so
/// that `rdata` slices (and any further decompression against compressed names within rdata)
/// remain valid.
#[derive(Clone)]
pub struct Response {
	pub id: u16,
	pub qr: bool,
	pub opcode: Opcode,
	pub aa: bool,
	pub tc: bool,
	pub rd: bool,
	pub ra: bool,
	pub ad: bool,
	pub cd: bool,
	pub rcode: u16,
	pub questions: Vec<Question>,
	pub answers: Vec<Record>,
	pub authorities: Vec<Record>,
	pub additionals: Vec<Record>,
	pub edns: Option<Edns>,
	message: Bytes,
}

impl Response {
	/// `Response::truncated()` returns the TC bit unconditionally.
	pub fn truncated(&self) -> bool {
		self.tc
	}

	pub fn message(&self) -> &Bytes {
		&self.message
	}

	/// Decompresses a name at an arbitrary offset into the backing message, for extractors that
	/// need to resolve compressed names found inside rdata (e.g. CNAME, NS, PTR, SOA).
	pub fn decompress(&self, offset: usize) -> Result<(Name, usize), WireError> {
		name::decode(&self.message, offset)
	}

	pub fn parse(message: Bytes) -> Result<Response, WireError> {
		let buf: &[u8] = &message;

		if buf.len() < HEADER_LEN {
			return Err(WireError::Truncated);
		}

		let header: &Header = utils::bytes::cast(&buf[..HEADER_LEN]);
		let flags = header.flags.get();

		let qdcount = header.qdcount.get();
		let ancount = header.ancount.get();
		let nscount = header.nscount.get();
		let arcount = header.arcount.get();

		let mut cursor = HEADER_LEN;

		let mut questions = Vec::with_capacity(qdcount as usize);
		for _ in 0..qdcount {
			let (name, consumed) = name::decode(buf, cursor)?;
			cursor += consumed;

			let qtype = read_u16(buf, cursor)?;
			let qclass = read_u16(buf, cursor + 2)?;
			cursor += 4;

			questions.push(Question { name, qtype, qclass });
		}

		let mut answers = Vec::with_capacity(ancount as usize);
		read_records(buf, &message, &mut cursor, ancount, &mut answers)?;

		let mut authorities = Vec::with_capacity(nscount as usize);
		read_records(buf, &message, &mut cursor, nscount, &mut authorities)?;

		let mut additionals = Vec::with_capacity(arcount as usize);
		read_records(buf, &message, &mut cursor, arcount, &mut additionals)?;

		let mut rcode = rcode_value(flags.rcode());
		let mut edns = None;

		for record in &additionals {
			if record.rtype == TYPE_OPT {
				let ext_rcode = (record.ttl >> 24) as u16;
				let version = ((record.ttl >> 16) & 0xff) as u8;
				let dnssec_ok = (record.ttl >> 15) & 1 == 1;

				rcode |= ext_rcode << 4;
				edns = Some(Edns { udp_payload: record.rclass, version, dnssec_ok });
			}
		}

		Ok(Response {
			id: header.id,
			qr: flags.qr(),
			opcode: flags.opcode(),
			aa: flags.aa(),
			tc: flags.tc(),
			rd: flags.rd(),
			ra: flags.ra(),
			ad: flags.ad(),
			cd: flags.cd(),
			rcode,
			questions,
			answers,
			authorities,
			additionals,
			edns,
			message,
		})
	}
}

fn rcode_value(r: Rcode) -> u16 {
	match r {
		Rcode::NoError => 0,
		Rcode::FormatError => 1,
		Rcode::ServFail => 2,
		Rcode::NxDomain => 3,
		Rcode::NotImplemented => 4,
		Rcode::Refused => 5,
		Rcode::YxDomain => 6,
		Rcode::YxRrSet => 7,
		Rcode::NxRrSet => 8,
		Rcode::NotAuth => 9,
		Rcode::NotZone => 10,
		Rcode::Reserved => 11,
	}
}

fn read_records(buf: &[u8], message: &Bytes, cursor: &mut usize, count: u16, out: &mut Vec<Record>) -> Result<(), WireError> {
	for _ in 0..count {
		let (name, consumed) = name::decode(buf, *cursor)?;
		*cursor += consumed;

		let rtype = read_u16(buf, *cursor)?;
		let rclass = read_u16(buf, *cursor + 2)?;
		let ttl = read_u32(buf, *cursor + 4)?;
		let rdlength = read_u16(buf, *cursor + 8)? as usize;
		*cursor += 10;

		if *cursor + rdlength > buf.len() {
			return Err(WireError::Truncated);
		}

		let rdata_start = *cursor;
		*cursor += rdlength;

		// Zero-copy: `rdata` shares the backing allocation of `message` rather than copying.
		out.push(Record { name, rtype, rclass, ttl, rdata: message.slice(rdata_start..rdata_start + rdlength) });
	}

	Ok(())
}

fn read_u16(buf: &[u8], at: usize) -> Result<u16, WireError> {
	let b = buf.get(at..at + 2).ok_or(WireError::Truncated)?;
	Ok(u16::from_be_bytes([b[0], b[1]]))
}

fn read_u32(buf: &[u8], at: usize) -> Result<u32, WireError> {
	let b = buf.get(at..at + 4).ok_or(WireError::Truncated)?;
	Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
}

/// A response matches a query iff ids are equal AND either opcode is UPDATE, or the question
/// counts are equal and every question in the response appears (by canonical-case name, type,
/// class) in the query.
pub fn matches(query: &Query, response: &Response) -> bool {
	if query.id != response.id {
		return false;
	}

	if response.opcode == Opcode::Update {
		return true;
	}

	if response.questions.len() != 1 {
		return false;
	}

	response.questions.iter().all(|q| q.name == query.question.name && q.qtype == query.question.qtype && q.qclass == query.question.qclass)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn round_trips_question_section() {
		let query = Query::build(0x1234, &Name::from_str("example.com"), TYPE_A, QueryOptions { recursion_desired: true, ..Default::default() }).unwrap();

		let response_bytes = {
			let mut buf = (*query.bytes).to_vec();
			buf[2] |= 0b1000_0000; // set QR
			to_bytes(buf)
		};

		let response = Response::parse(response_bytes).unwrap();

		assert_eq!(response.id, 0x1234);
		assert!(response.qr);
		assert_eq!(response.questions.len(), 1);
		assert_eq!(response.questions[0].name, Name::from_str("EXAMPLE.COM"));
		assert!(matches(&query, &response));
	}

	#[test]
	fn rejects_id_mismatch() {
		let query = Query::build(1, &Name::from_str("example.com"), TYPE_A, QueryOptions::default()).unwrap();
		let mut buf = (*query.bytes).to_vec();
		buf[0] = 2;
		buf[1] = 0;
		let response = Response::parse(to_bytes(buf)).unwrap();

		assert!(!matches(&query, &response));
	}

	proptest::proptest! {
		/// `Response::parse` must never panic, regardless of how malformed its input is — only
		/// ever return `Ok` or an `Err` describing the specific malformation.
		#[test]
		fn parse_never_panics(bytes in proptest::collection::vec(proptest::prelude::any::<u8>(), 0..512)) {
			let _ = Response::parse(to_bytes(bytes));
		}

		/// A genuine reply to a query (same id, QR set, question echoed back verbatim) always
		/// matches that query, and flipping the id always breaks the match.
		#[test]
		fn matches_reflects_id_and_question(id in proptest::prelude::any::<u16>(), other_id in proptest::prelude::any::<u16>(), name in "[a-z]{1,10}") {
			let query = Query::build(id, &Name::from_str(&name), TYPE_A, QueryOptions { recursion_desired: true, ..Default::default() }).unwrap();

			let mut buf = (*query.bytes).to_vec();
			buf[2] |= 0b1000_0000; // set QR
			let response = Response::parse(to_bytes(buf)).unwrap();

			proptest::prop_assert!(matches(&query, &response));

			if other_id != id {
				let mut mismatched = (*query.bytes).to_vec();
				mismatched[0] = (other_id >> 8) as u8;
				mismatched[1] = other_id as u8;
				mismatched[2] |= 0b1000_0000;
				let mismatched_response = Response::parse(to_bytes(mismatched)).unwrap();

				proptest::prop_assert!(!matches(&query, &mismatched_response));
			}
		}
	}
}

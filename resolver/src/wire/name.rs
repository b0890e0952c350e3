use std::fmt;

/// Maximum total length of an encoded name, in octets (RFC 1035 §3.1).
pub const MAX_NAME_LEN: usize = 255;
/// Maximum length of a single label, in octets.
pub const MAX_LABEL_LEN: usize = 63;

const POINTER_MASK: u8 = 0b1100_0000;

/// A DNS name, stored in its as-received case. Comparisons are ASCII case-folded.
#[derive(Clone, Debug)]
pub struct Name(pub String);

impl Name {
	pub fn root() -> Self {
		Name(String::new())
	}

	pub fn from_str(s: &str) -> Self {
		Name(s.trim_end_matches('.').to_owned())
	}

	pub fn is_root(&self) -> bool {
		self.0.is_empty()
	}

	/// Number of dots separating labels (`"a.b.c"` has 2, `"a"` has 0).
	pub fn dot_count(&self) -> usize {
		if self.0.is_empty() {
			0
		} else {
			self.0.matches('.').count()
		}
	}

	pub fn labels(&self) -> impl Iterator<Item = &str> {
		self.0.split('.').filter(|s| !s.is_empty())
	}

	pub fn join(&self, suffix: &str) -> Name {
		if self.0.is_empty() {
			Name(suffix.to_owned())
		} else {
			Name(format!("{}.{}", self.0, suffix))
		}
	}

	/// Appends the wire encoding of this name (labels + terminating root) to `buf`.
	pub fn encode(&self, buf: &mut Vec<u8>) -> Result<(), super::WireError> {
		let mut total = 0usize;

		for label in self.labels() {
			let bytes = label.as_bytes();

			if bytes.len() > MAX_LABEL_LEN {
				return Err(super::WireError::LabelTooLong);
			}

			total += bytes.len() + 1;

			if total > MAX_NAME_LEN {
				return Err(super::WireError::NameTooLong);
			}

			buf.push(bytes.len() as u8);
			buf.extend_from_slice(bytes);
		}

		buf.push(0);

		Ok(())
	}
}

impl PartialEq for Name {
	fn eq(&self, other: &Self) -> bool {
		self.0.eq_ignore_ascii_case(&other.0)
	}
}

impl Eq for Name {}

impl fmt::Display for Name {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		if self.0.is_empty() {
			write!(f, ".")
		} else {
			write!(f, "{}", self.0)
		}
	}
}

/// Decodes a (possibly compressed) name starting at `offset` within the full `message`.
///
/// Returns the decoded name and the number of bytes consumed at `offset` itself — which is 2 for
/// a bare pointer, regardless of how long the name it points to turns out to be.
///
/// Loop safety: a compression pointer is only ever allowed to jump to an offset strictly less
/// than the position it was read from, so the cursor is monotonically decreasing across jumps —
/// the loop terminates in at most `message.len()` iterations on any input.
pub fn decode(message: &[u8], offset: usize) -> Result<(Name, usize), super::WireError> {
	use super::WireError;

	let mut labels: Vec<String> = Vec::new();
	let mut cursor = offset;
	let mut consumed_at_site = None;
	let mut total_len = 0usize;

	loop {
		let len = *message.get(cursor).ok_or(WireError::Truncated)?;

		match len & POINTER_MASK {
			0b0000_0000 => {
				if len == 0 {
					if consumed_at_site.is_none() {
						consumed_at_site = Some(cursor + 1 - offset);
					}

					break;
				}

				let len = len as usize;
				let start = cursor + 1;
				let end = start + len;
				let label = message.get(start..end).ok_or(WireError::Truncated)?;

				total_len += len + 1;

				if total_len > MAX_NAME_LEN {
					return Err(WireError::NameTooLong);
				}

				labels.push(String::from_utf8_lossy(label).into_owned());
				cursor = end;
			}
			POINTER_MASK => {
				let hi = (len & !POINTER_MASK) as usize;
				let lo = *message.get(cursor + 1).ok_or(WireError::Truncated)? as usize;
				let pointer = (hi << 8) | lo;

				if consumed_at_site.is_none() {
					consumed_at_site = Some(cursor + 2 - offset);
				}

				// Pointers must strictly decrease the cursor, which bounds the number of jumps
				// and rules out cycles without needing a separate jump counter.
				if pointer >= cursor {
					return Err(WireError::CompressionLoop);
				}

				cursor = pointer;
			}
			_ => return Err(WireError::MalformedLabel),
		}
	}

	Ok((Name(labels.join(".")), consumed_at_site.unwrap()))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn encodes_simple_name() {
		let mut buf = Vec::new();
		Name::from_str("example.com").encode(&mut buf).unwrap();
		assert_eq!(buf, [7, b'e', b'x', b'a', b'm', b'p', b'l', b'e', 3, b'c', b'o', b'm', 0]);
	}

	#[test]
	fn decodes_uncompressed_name() {
		let mut buf = Vec::new();
		Name::from_str("example.com").encode(&mut buf).unwrap();

		let (name, consumed) = decode(&buf, 0).unwrap();
		assert_eq!(name, Name::from_str("EXAMPLE.COM"));
		assert_eq!(consumed, buf.len());
	}

	#[test]
	fn decodes_pointer() {
		let mut message = Vec::new();
		message.extend_from_slice(b"\x07example\x03com\x00");
		let base = message.len();
		// A second name pointing back at the first.
		message.push(POINTER_MASK | 0);
		message.push(0);

		let (name, consumed) = decode(&message, base).unwrap();
		assert_eq!(name, Name::from_str("example.com"));
		assert_eq!(consumed, 2);
	}

	#[test]
	fn rejects_forward_or_self_pointer() {
		let mut message = vec![0u8; 4];
		message[0] = POINTER_MASK;
		message[1] = 0; // points at itself

		assert!(decode(&message, 0).is_err());
	}

	#[test]
	fn rejects_oversized_label() {
		let mut buf = Vec::new();
		buf.push(64u8);
		buf.extend_from_slice(&[b'a'; 64]);
		buf.push(0);

		assert!(decode(&buf, 0).is_err());
	}

	proptest::proptest! {
		/// `decode` must either return a name or an error in bounded time on any input — the
		/// strictly-decreasing-pointer rule is what this is actually probing for a regression in.
		#[test]
		fn decode_terminates_on_arbitrary_bytes(bytes in proptest::collection::vec(proptest::prelude::any::<u8>(), 0..300), offset in 0usize..300) {
			let offset = if bytes.is_empty() { 0 } else { offset % bytes.len().max(1) };
			let _ = decode(&bytes, offset);
		}

		/// Encoding a name built from a handful of short alphanumeric labels and decoding it back
		/// from the start of the buffer recovers the same labels, case-insensitively.
		#[test]
		fn encode_decode_round_trips(labels in proptest::collection::vec("[a-zA-Z0-9]{1,10}", 1..5)) {
			let name = Name(labels.join("."));

			let mut buf = Vec::new();
			name.encode(&mut buf).unwrap();

			let (decoded, consumed) = decode(&buf, 0).unwrap();
			proptest::prop_assert_eq!(consumed, buf.len());
			proptest::prop_assert_eq!(decoded, name);
		}
	}
}

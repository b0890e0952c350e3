use std::collections::BTreeMap;
use std::net::IpAddr;

use crate::lookup::LookupId;

/// Ordered map of `(txid, peer-IP) → interested lookups`, shared by every UDP socket and TCP
/// connection in the pool. Kept ordered so a lookup by txid yields a contiguous range.
#[derive(Default)]
pub struct Subscriptions {
	table: BTreeMap<(u16, IpAddr), Vec<LookupId>>,
}

impl Subscriptions {
	pub fn subscribe(&mut self, txid: u16, peer: IpAddr, lookup: LookupId) {
		let list = self.table.entry((txid, peer)).or_default();

		if !list.contains(&lookup) {
			list.push(lookup);
		}
	}

	pub fn unsubscribe(&mut self, txid: u16, peer: IpAddr, lookup: LookupId) {
		if let Some(list) = self.table.get_mut(&(txid, peer)) {
			list.retain(|&id| id != lookup);

			if list.is_empty() {
				self.table.remove(&(txid, peer));
			}
		}
	}

	pub fn subscribers(&self, txid: u16, peer: IpAddr) -> &[LookupId] {
		self.table.get(&(txid, peer)).map(Vec::as_slice).unwrap_or(&[])
	}
}

use rand::Rng;

/// Draws a 16-bit transaction id uniformly from `[1, 65535]`, retrying against `taken` so the
/// caller never hands back an id already inflight.
pub fn generate(mut taken: impl FnMut(u16) -> bool) -> u16 {
	let mut rng = rand::thread_rng();

	loop {
		let id = rng.gen_range(1..=u16::MAX);

		if !taken(id) {
			return id;
		}
	}
}

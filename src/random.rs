//! Seeded pseudo-random numbers for reproducible randomization.

/// Xorshift generator; the same seed always yields the same sequence.
#[derive(Debug, Clone)]
pub struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    pub fn new(seed: u64) -> Self {
        // An all-zero state would only ever produce zeros.
        let state = if seed == 0 { 0x9E37_79B9_7F4A_7C15 } else { seed };
        Self { state }
    }

    pub fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }

    /// Uniform-ish value in `min..=max`. Returns `min` when the range is empty.
    pub fn next_in_range(&mut self, min: i64, max: i64) -> i64 {
        if max <= min {
            return min;
        }
        let span = (i128::from(max) - i128::from(min) + 1) as u128;
        let offset = (u128::from(self.next_u64()) % span) as i128;
        (i128::from(min) + offset) as i64
    }
}

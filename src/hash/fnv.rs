//! Hand-rolled FNV-1 / FNV-1a at 32/64/128 bits.
//!
//! No single crate covers all six offset-basis/prime combinations at all
//! three widths spec §4.1 names, and the algorithm is a multiply-and-xor
//! loop with two constants per width — every crate that implements FNV
//! (including the canonical `fnv` crate, which only covers FNV-1a-64)
//! hardcodes the same constants inline. See `DESIGN.md`.

use super::Hash;

macro_rules! fnv_impl {
    ($name:ident, $display:expr, $int:ty, $width_bytes:expr, $offset:expr, $prime:expr, $variant_1a:expr) => {
        #[derive(Clone)]
        pub struct $name {
            state: $int,
        }

        impl $name {
            pub fn new() -> Self {
                Self { state: $offset }
            }
        }

        impl Hash for $name {
            fn reset(&mut self) {
                self.state = $offset;
            }

            fn update(&mut self, bytes: &[u8]) {
                for &b in bytes {
                    if $variant_1a {
                        self.state ^= b as $int;
                        self.state = self.state.wrapping_mul($prime);
                    } else {
                        self.state = self.state.wrapping_mul($prime);
                        self.state ^= b as $int;
                    }
                }
            }

            fn digest(&self) -> Vec<u8> {
                self.state.to_be_bytes().to_vec()
            }

            fn output_size(&self) -> usize {
                $width_bytes
            }

            fn name(&self) -> &'static str {
                $display
            }

            fn fresh_copy(&self) -> Box<dyn Hash> {
                Box::new(Self::new())
            }
        }
    };
}

fnv_impl!(Fnv1_32, "fnv-1-32", u32, 4, 0x811c_9dc5, 0x0100_0193, false);
fnv_impl!(Fnv1a32, "fnv-1a-32", u32, 4, 0x811c_9dc5, 0x0100_0193, true);
fnv_impl!(
    Fnv1_64,
    "fnv-1-64",
    u64,
    8,
    0xcbf2_9ce4_8422_2325,
    0x0000_0100_0000_01b3,
    false
);
fnv_impl!(
    Fnv1a64,
    "fnv-1a-64",
    u64,
    8,
    0xcbf2_9ce4_8422_2325,
    0x0000_0100_0000_01b3,
    true
);
fnv_impl!(
    Fnv1_128,
    "fnv-1-128",
    u128,
    16,
    0x6c62_272e_07bb_0142_62b8_2175_6295_c58d,
    0x0000_0000_0100_0000_0000_0000_0000_013b,
    false
);
fnv_impl!(
    Fnv1a128,
    "fnv-1a-128",
    u128,
    16,
    0x6c62_272e_07bb_0142_62b8_2175_6295_c58d,
    0x0000_0000_0100_0000_0000_0000_0000_013b,
    true
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fnv1a32_empty_is_offset_basis() {
        let mut h = Fnv1a32::new();
        h.reset();
        assert_eq!(h.digest(), 0x811c_9dc5u32.to_be_bytes());
    }

    #[test]
    fn fnv1a32_known_vector() {
        // FNV test vectors: fnv1a("") == 0x811c9dc5, fnv1a("a") == 0xe40c292c
        let mut h = Fnv1a32::new();
        h.update(b"a");
        assert_eq!(h.digest(), 0xe40c_292cu32.to_be_bytes());
    }

    #[test]
    fn fnv1_32_known_vector() {
        // fnv1("a") == 0x050c5d7f
        let mut h = Fnv1_32::new();
        h.update(b"a");
        assert_eq!(h.digest(), 0x050c_5d7fu32.to_be_bytes());
    }

    #[test]
    fn reset_returns_to_empty_state() {
        let mut h = Fnv1a64::new();
        let empty = h.digest();
        h.update(b"something");
        assert_ne!(h.digest(), empty);
        h.reset();
        assert_eq!(h.digest(), empty);
    }
}

//! Concrete bindings of the `Hash` contract onto real crates (spec §4.1).
//! Each wrapper owns its running state so `reset`/`update`/`digest` line up
//! with the trait's `&mut self` / `&self` split; cryptographic hashers use
//! clone-then-finalize to peek a digest without consuming their state.

use digest::{ExtendableOutput, XofReader};
use md5::Md5;
use sha1::Sha1;
use sha2::{Sha256, Sha512};
use sha3::{Sha3_512, Shake256};

use super::Hash;

// ---------------------------------------------------------------------------
// CRC-32 / CRC-64
// ---------------------------------------------------------------------------

pub struct Crc32Hash {
    inner: crc32fast::Hasher,
}

impl Crc32Hash {
    pub fn new() -> Self {
        Self {
            inner: crc32fast::Hasher::new(),
        }
    }
}

impl Hash for Crc32Hash {
    fn reset(&mut self) {
        self.inner = crc32fast::Hasher::new();
    }
    fn update(&mut self, bytes: &[u8]) {
        self.inner.update(bytes);
    }
    fn digest(&self) -> Vec<u8> {
        self.inner.clone().finalize().to_be_bytes().to_vec()
    }
    fn output_size(&self) -> usize {
        4
    }
    fn name(&self) -> &'static str {
        "crc32"
    }
    fn fresh_copy(&self) -> Box<dyn Hash> {
        Box::new(Self::new())
    }
}

pub struct Crc64Hash {
    inner: crc64fast::Digest,
}

impl Crc64Hash {
    pub fn new() -> Self {
        Self {
            inner: crc64fast::Digest::new(),
        }
    }
}

impl Hash for Crc64Hash {
    fn reset(&mut self) {
        self.inner = crc64fast::Digest::new();
    }
    fn update(&mut self, bytes: &[u8]) {
        self.inner.write(bytes);
    }
    fn digest(&self) -> Vec<u8> {
        self.inner.sum64().to_be_bytes().to_vec()
    }
    fn output_size(&self) -> usize {
        8
    }
    fn name(&self) -> &'static str {
        "crc64"
    }
    fn fresh_copy(&self) -> Box<dyn Hash> {
        Box::new(Self::new())
    }
}

// ---------------------------------------------------------------------------
// Adler-32
// ---------------------------------------------------------------------------

pub struct Adler32Hash {
    inner: adler::Adler32,
}

impl Adler32Hash {
    pub fn new() -> Self {
        Self {
            inner: adler::Adler32::new(),
        }
    }
}

impl Hash for Adler32Hash {
    fn reset(&mut self) {
        self.inner = adler::Adler32::new();
    }
    fn update(&mut self, bytes: &[u8]) {
        self.inner.write_slice(bytes);
    }
    fn digest(&self) -> Vec<u8> {
        self.inner.checksum().to_be_bytes().to_vec()
    }
    fn output_size(&self) -> usize {
        4
    }
    fn name(&self) -> &'static str {
        "adler32"
    }
    fn fresh_copy(&self) -> Box<dyn Hash> {
        Box::new(Self::new())
    }
}

// ---------------------------------------------------------------------------
// MD5 / SHA-1 / SHA-256 / SHA-512 / SHA-3-512 (RustCrypto `digest::Digest`)
// ---------------------------------------------------------------------------

macro_rules! digest_impl {
    ($name:ident, $display:expr, $inner:ty, $width:expr) => {
        pub struct $name {
            inner: $inner,
        }

        impl $name {
            pub fn new() -> Self {
                Self {
                    inner: <$inner as digest::Digest>::new(),
                }
            }
        }

        impl Hash for $name {
            fn reset(&mut self) {
                self.inner = <$inner as digest::Digest>::new();
            }
            fn update(&mut self, bytes: &[u8]) {
                digest::Digest::update(&mut self.inner, bytes);
            }
            fn digest(&self) -> Vec<u8> {
                digest::Digest::finalize(self.inner.clone()).to_vec()
            }
            fn output_size(&self) -> usize {
                $width
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

digest_impl!(Md5Hash, "md5", Md5, 16);
digest_impl!(Sha1Hash, "sha-1", Sha1, 20);
digest_impl!(Sha256Hash, "sha-256", Sha256, 32);
digest_impl!(Sha512Hash, "sha-512", Sha512, 64);
digest_impl!(Sha3_512Hash, "sha-3-512", Sha3_512, 64);

// ---------------------------------------------------------------------------
// SHAKE-256, truncated to the 8-byte ("-64", i.e. 64-bit) output spec §4.1
// names.
// ---------------------------------------------------------------------------

pub struct Shake256_64Hash {
    inner: Shake256,
}

impl Shake256_64Hash {
    pub fn new() -> Self {
        Self {
            inner: Shake256::default(),
        }
    }
}

impl Hash for Shake256_64Hash {
    fn reset(&mut self) {
        self.inner = Shake256::default();
    }
    fn update(&mut self, bytes: &[u8]) {
        digest::Update::update(&mut self.inner, bytes);
    }
    fn digest(&self) -> Vec<u8> {
        let mut reader = self.inner.clone().finalize_xof();
        let mut out = [0u8; 8];
        reader.read(&mut out);
        out.to_vec()
    }
    fn output_size(&self) -> usize {
        8
    }
    fn name(&self) -> &'static str {
        "shake256-64"
    }
    fn fresh_copy(&self) -> Box<dyn Hash> {
        Box::new(Self::new())
    }
}

#[cfg(test)]
mod tests {
    use crate::hash::from_name;

    #[test]
    fn sha256_empty_mode_known_vector() {
        // Scenario 2 from spec §8: dupfiles fixture file, sha-256, empty mode.
        let payload = b"dupfiles generates r\xCE\xB5ports\n\xF0\x9F\x98\x8A\n";
        let mut h = from_name("sha-256").unwrap();
        h.update(payload);
        let hex: String = h.digest().iter().map(|b| format!("{b:02x}")).collect();
        assert_eq!(
            hex,
            "2f837632f54939e1824950eeaf5924e8c275a1b8443fc8bf1eab11902d185c4c"
        );
    }

    #[test]
    fn crc32_empty_mode_known_vector() {
        // Scenario 3 from spec §8, same fixture file.
        let payload = b"dupfiles generates r\xCE\xB5ports\n\xF0\x9F\x98\x8A\n";
        let mut h = from_name("crc32").unwrap();
        h.update(payload);
        let hex: String = h.digest().iter().map(|b| format!("{b:02x}")).collect();
        assert_eq!(hex, "68e17d95");
    }

    #[test]
    fn reset_returns_to_initial_digest() {
        for name in ["md5", "sha-1", "sha-256", "sha-512", "sha-3-512", "shake256-64"] {
            let mut h = from_name(name).unwrap();
            let empty = h.digest();
            h.update(b"payload");
            assert_ne!(h.digest(), empty, "{name}");
            h.reset();
            assert_eq!(h.digest(), empty, "{name}");
        }
    }

    #[test]
    fn digest_does_not_mutate_state() {
        let mut h = from_name("sha-256").unwrap();
        h.update(b"abc");
        let d1 = h.digest();
        let d2 = h.digest();
        assert_eq!(d1, d2);
    }
}

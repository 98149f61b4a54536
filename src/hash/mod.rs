//! # Hash contract (C1)
//!
//! A uniform streaming-digest interface over the algorithm roster named in
//! spec §4.1. Implementations live in [`algos`] (the RustCrypto/`crc`/
//! `adler`-backed ones) and [`fnv`] (hand-rolled, see `DESIGN.md`).
//!
//! Algorithm selection is a closed tagged variant reached through
//! [`from_name`], not open-ended reflection — the factory is the only place
//! that needs to know the full roster.

mod algos;
mod fnv;

use std::fs::File;
use std::io::{self, Read};

use camino::Utf8Path;

use crate::error::CoreError;

/// Streaming digest over one of the algorithms named in spec §4.1.
///
/// Implementors own their working state; `reset` returns that state to the
/// empty-input digest without reallocating the instance.
pub trait Hash: Send {
    fn reset(&mut self);
    fn update(&mut self, bytes: &[u8]);

    /// Stream an entire file's contents through `update`. The default
    /// implementation reads in fixed-size chunks so file size does not bound
    /// peak memory.
    fn update_file(&mut self, path: &Utf8Path) -> io::Result<()> {
        let mut file = File::open(path.as_std_path())?;
        let mut buf = [0u8; 64 * 1024];
        loop {
            let n = file.read(&mut buf)?;
            if n == 0 {
                break;
            }
            self.update(&buf[..n]);
        }
        Ok(())
    }

    fn digest(&self) -> Vec<u8>;
    fn output_size(&self) -> usize;
    fn name(&self) -> &'static str;

    /// An independent instance in the empty (freshly reset) state.
    fn fresh_copy(&self) -> Box<dyn Hash>;
}

/// Case-insensitive lookup from the identifiers in spec §4.1 and §6
/// (`crc32`, `crc64`, `adler32`, `fnv-1-32`, `fnv-1-64`, `fnv-1-128`,
/// `fnv-1a-32`, `fnv-1a-64`, `fnv-1a-128`, `md5`, `sha-1`, `sha-256`,
/// `sha-512`, `sha-3-512`, `shake256-64`).
pub fn from_name(name: &str) -> Result<Box<dyn Hash>, CoreError> {
    let lower = name.to_ascii_lowercase();
    let h: Box<dyn Hash> = match lower.as_str() {
        "crc32" => Box::new(algos::Crc32Hash::new()),
        "crc64" => Box::new(algos::Crc64Hash::new()),
        "adler32" => Box::new(algos::Adler32Hash::new()),
        "fnv-1-32" => Box::new(fnv::Fnv1_32::new()),
        "fnv-1-64" => Box::new(fnv::Fnv1_64::new()),
        "fnv-1-128" => Box::new(fnv::Fnv1_128::new()),
        "fnv-1a-32" => Box::new(fnv::Fnv1a32::new()),
        "fnv-1a-64" => Box::new(fnv::Fnv1a64::new()),
        "fnv-1a-128" => Box::new(fnv::Fnv1a128::new()),
        "md5" => Box::new(algos::Md5Hash::new()),
        "sha-1" => Box::new(algos::Sha1Hash::new()),
        "sha-256" => Box::new(algos::Sha256Hash::new()),
        "sha-512" => Box::new(algos::Sha512Hash::new()),
        "sha-3-512" => Box::new(algos::Sha3_512Hash::new()),
        "shake256-64" => Box::new(algos::Shake256_64Hash::new()),
        _ => return Err(CoreError::UnsupportedHashAlgorithm(name.to_string())),
    };
    Ok(h)
}

/// Output width in bytes for every supported algorithm, keyed by the
/// canonical lowercase name. Used to size the digest store (C6) without
/// constructing a hasher.
pub fn output_size_for(name: &str) -> Result<usize, CoreError> {
    Ok(from_name(name)?.output_size())
}

//! # Directory aggregator (C4, spec §4.4)
//!
//! Consumes directory records from the walker (C3) and file digests from
//! the node hasher (C2), XOR-combining children into their parent's digest
//! with no ordering requirement. The `-1`-sentinel bias on `entries_missing`
//! is what lets the aggregator tell "freshly inserted, walker record not
//! seen yet" apart from "all children accounted for".

use std::collections::HashMap;

use camino::{Utf8Path, Utf8PathBuf};

use crate::error::CoreError;
use crate::hash::Hash;
use crate::node::HashMode;

struct DirState {
    accumulator: Vec<u8>,
    entries_missing: i64,
    /// Filesystem metadata size (spec §4.3/§6), filled in once the
    /// walker's own record for this directory arrives.
    size: u64,
}

/// A directory whose digest is fully known (spec §4.4).
#[derive(Debug, Clone)]
pub struct CompletedDir {
    pub path: Utf8PathBuf,
    pub digest: Vec<u8>,
    pub size: u64,
}

pub struct Aggregator {
    width: usize,
    mode: HashMode,
    hash_for_seed: Box<dyn Hash>,
    dirs: HashMap<Utf8PathBuf, DirState>,
    completed: Vec<CompletedDir>,
}

impl Aggregator {
    pub fn new(width: usize, mode: HashMode, hash_for_seed: Box<dyn Hash>) -> Self {
        Self {
            width,
            mode,
            hash_for_seed,
            dirs: HashMap::new(),
            completed: Vec::new(),
        }
    }

    fn seed_for(&mut self, path: &Utf8Path) -> Vec<u8> {
        match self.mode {
            HashMode::Empty => vec![0u8; self.width],
            HashMode::Basename => {
                let name = crate::util::basename(path);
                self.hash_for_seed.reset();
                self.hash_for_seed.update(name.as_bytes());
                self.hash_for_seed.update(&[0x1F]);
                self.hash_for_seed.digest()
            }
        }
    }

    fn entry(&mut self, path: &Utf8Path) -> &mut DirState {
        if !self.dirs.contains_key(path) {
            let seed = self.seed_for(path);
            self.dirs.insert(
                path.to_owned(),
                DirState {
                    accumulator: seed,
                    entries_missing: -1,
                    size: 0,
                },
            );
        }
        self.dirs.get_mut(path).unwrap()
    }

    fn xor_in(accumulator: &mut [u8], digest: &[u8]) {
        debug_assert_eq!(accumulator.len(), digest.len());
        for (a, d) in accumulator.iter_mut().zip(digest) {
            *a ^= d;
        }
    }

    /// Called when C3 emits a directory's record (after all its children
    /// have been observed by the walker).
    pub fn on_dir_record(&mut self, path: &Utf8Path, entries_expected: u64, size: u64) -> Result<(), CoreError> {
        let entry = self.entry(path);
        entry.entries_missing += entries_expected as i64 + 1;
        entry.size = size;
        self.try_complete(path)
    }

    /// Called when a child (file digest from C2, or completed descendant
    /// directory) arrives for `parent`.
    pub fn on_child_digest(&mut self, parent: &Utf8Path, digest: &[u8]) -> Result<(), CoreError> {
        let entry = self.entry(parent);
        Self::xor_in(&mut entry.accumulator, digest);
        entry.entries_missing -= 1;
        self.try_complete(parent)
    }

    fn try_complete(&mut self, path: &Utf8Path) -> Result<(), CoreError> {
        let missing = self.dirs.get(path).map(|d| d.entries_missing);
        if missing != Some(0) {
            return Ok(());
        }

        let state = self.dirs.remove(path).expect("checked above");
        let digest = state.accumulator;
        self.completed.push(CompletedDir {
            path: path.to_owned(),
            digest: digest.clone(),
            size: state.size,
        });

        self.propagate(path, &digest)
    }

    fn propagate(&mut self, child_path: &Utf8Path, digest: &[u8]) -> Result<(), CoreError> {
        let Some(parent) = parent_of(child_path) else {
            return Ok(());
        };

        match self.dirs.get_mut(&parent) {
            Some(state) => {
                Self::xor_in(&mut state.accumulator, digest);
                state.entries_missing -= 1;
                self.try_complete(&parent)
            }
            None => {
                let mut seed = self.seed_for(&parent);
                Self::xor_in(&mut seed, digest);
                self.dirs.insert(
                    parent,
                    DirState {
                        accumulator: seed,
                        entries_missing: -2,
                        size: 0,
                    },
                );
                Ok(())
            }
        }
    }

    /// Drain every directory completed so far.
    pub fn drain_completed(&mut self) -> Vec<CompletedDir> {
        std::mem::take(&mut self.completed)
    }

    /// Call once both input streams have closed (spec §4.4 "completion
    /// guarantee"). A non-empty result is an internal inconsistency.
    pub fn finish(self) -> Result<(), CoreError> {
        if self.dirs.is_empty() {
            Ok(())
        } else {
            let names: Vec<String> = self.dirs.keys().map(|p| p.to_string()).collect();
            Err(CoreError::InconsistentReports {
                detail: format!("incomplete directories at stream close: {}", names.join(", ")),
            })
        }
    }
}

fn parent_of(path: &Utf8Path) -> Option<Utf8PathBuf> {
    if path.as_str().is_empty() {
        return None;
    }
    match path.parent() {
        Some(p) => Some(p.to_owned()),
        None => Some(Utf8PathBuf::from("")),
    }
}

//! # Walk emitter (C3, spec §4.3)
//!
//! Hand-rolled over `std::fs::read_dir` rather than a traversal crate: the
//! directory-vs-file emission order (DFS/BFS) and the single-task channel
//! topology in §5 are both baked into this walker, not delegated to one
//! that orders traversal internally.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use crossbeam::channel::Sender;
use regex::Regex;

use crate::error::CoreError;
use crate::node::{NodeRecord, NodeType};

/// Traversal order for a directory's children (spec §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkOrder {
    /// Subdirectories first (readdir order), then files.
    Dfs,
    /// Files first, then subdirectories.
    Bfs,
}

/// The three exclusion lists from spec §4.3.
#[derive(Debug, Clone, Default)]
pub struct ExclusionRules {
    pub basenames: HashSet<String>,
    pub regexes: Vec<Regex>,
    pub subtrees: HashSet<Utf8PathBuf>,
}

impl ExclusionRules {
    fn excludes_tree(&self, rel_path: &Utf8Path) -> bool {
        self.subtrees.contains(rel_path)
    }

    fn excludes_child(&self, basename: &str) -> bool {
        if self.basenames.contains(basename) {
            return true;
        }
        self.regexes.iter().any(|re| re.is_match(basename))
    }
}

pub struct WalkConfig {
    pub order: WalkOrder,
    pub ignore_permission_errors: bool,
    pub exclusions: ExclusionRules,
    pub digest_width: usize,
    pub shall_stop: Arc<AtomicBool>,
}

/// A directory record emitted after its children have all been observed
/// (spec §4.3): path, expected child count, metadata size, zero digest
/// placeholder (C4 fills the real digest in later).
#[derive(Debug, Clone)]
pub struct DirRecord {
    pub path: Utf8PathBuf,
    pub entries_expected: u64,
    pub size: u64,
}

/// Walks `root`, emitting file/special records to `file_out` and directory
/// records to `dir_out`. Returns once the subtree is fully visited or
/// `shall_stop` fires.
pub fn walk(
    root: &Utf8Path,
    config: &WalkConfig,
    file_out: &Sender<NodeRecord>,
    dir_out: &Sender<DirRecord>,
) -> Result<(), CoreError> {
    walk_dir(root, Utf8Path::new(""), config, file_out, dir_out)?;
    Ok(())
}

fn walk_dir(
    base: &Utf8Path,
    rel: &Utf8Path,
    config: &WalkConfig,
    file_out: &Sender<NodeRecord>,
    dir_out: &Sender<DirRecord>,
) -> Result<(), CoreError> {
    if config.shall_stop.load(Ordering::SeqCst) {
        return Ok(());
    }

    let full = if rel.as_str().is_empty() {
        base.to_owned()
    } else {
        base.join(rel.as_str())
    };

    let read_dir = match std::fs::read_dir(full.as_std_path()) {
        Ok(rd) => rd,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied && config.ignore_permission_errors => {
            dir_out
                .send(DirRecord {
                    path: rel.to_owned(),
                    entries_expected: 0,
                    size: 0,
                })
                .ok();
            return Ok(());
        }
        Err(e) => return Err(CoreError::io(full.to_string(), e)),
    };

    let dir_size = std::fs::metadata(full.as_std_path())
        .map(|m| m.len())
        .unwrap_or(0);

    let mut subdirs = Vec::new();
    let mut others = Vec::new();

    for entry in read_dir {
        let entry = match entry {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied && config.ignore_permission_errors => {
                continue;
            }
            Err(e) => return Err(CoreError::io(full.to_string(), e)),
        };

        let name = entry.file_name();
        let name = name.to_str().ok_or_else(|| CoreError::Io {
            path: full.to_string(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, "non-UTF-8 entry name"),
        })?;

        let child_rel = crate::util::join_relative(rel, name);

        if config.exclusions.excludes_tree(&child_rel) {
            continue;
        }
        if config.exclusions.excludes_child(name) {
            continue;
        }

        let meta = match entry.metadata() {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied && config.ignore_permission_errors => {
                continue;
            }
            Err(e) => return Err(CoreError::io(child_rel.to_string(), e)),
        };

        if meta.is_dir() {
            subdirs.push(child_rel);
        } else {
            let node_type = NodeType::from_metadata(&meta);
            others.push((child_rel, node_type, meta.len()));
        }
    }

    let entries_expected = (subdirs.len() + others.len()) as u64;

    let emit_others = |others: &[(Utf8PathBuf, NodeType, u64)]| -> Result<(), CoreError> {
        for (path, node_type, size) in others {
            if config.shall_stop.load(Ordering::SeqCst) {
                return Ok(());
            }
            file_out
                .send(NodeRecord {
                    path: path.clone(),
                    node_type: *node_type,
                    size: *size,
                    digest: vec![0u8; config.digest_width],
                })
                .ok();
        }
        Ok(())
    };

    match config.order {
        WalkOrder::Dfs => {
            for child in &subdirs {
                walk_dir(base, child, config, file_out, dir_out)?;
            }
            emit_others(&others)?;
        }
        WalkOrder::Bfs => {
            emit_others(&others)?;
            for child in &subdirs {
                walk_dir(base, child, config, file_out, dir_out)?;
            }
        }
    }

    if config.shall_stop.load(Ordering::SeqCst) {
        return Ok(());
    }

    dir_out
        .send(DirRecord {
            path: rel.to_owned(),
            entries_expected,
            size: dir_size,
        })
        .ok();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel::unbounded;
    use std::fs;

    fn default_config(order: WalkOrder) -> WalkConfig {
        WalkConfig {
            order,
            ignore_permission_errors: false,
            exclusions: ExclusionRules::default(),
            digest_width: 32,
            shall_stop: Arc::new(AtomicBool::new(false)),
        }
    }

    #[test]
    fn emits_files_and_directories() {
        let dir = tempfile::tempdir().unwrap();
        let base = Utf8Path::from_path(dir.path()).unwrap();
        fs::create_dir(base.join("sub")).unwrap();
        fs::write(base.join("a.txt"), b"x").unwrap();
        fs::write(base.join("sub/b.txt"), b"y").unwrap();

        let (file_tx, file_rx) = unbounded();
        let (dir_tx, dir_rx) = unbounded();
        let config = default_config(WalkOrder::Dfs);
        walk(base, &config, &file_tx, &dir_tx).unwrap();
        drop(file_tx);
        drop(dir_tx);

        let files: Vec<_> = file_rx.iter().collect();
        let dirs: Vec<_> = dir_rx.iter().collect();

        assert_eq!(files.len(), 2);
        assert_eq!(dirs.len(), 2);

        let root_dir = dirs.iter().find(|d| d.path.as_str().is_empty()).unwrap();
        assert_eq!(root_dir.entries_expected, 2);
        let sub_dir = dirs.iter().find(|d| d.path.as_str() == "sub").unwrap();
        assert_eq!(sub_dir.entries_expected, 1);
    }

    #[test]
    fn excluded_basename_is_skipped_and_not_counted() {
        let dir = tempfile::tempdir().unwrap();
        let base = Utf8Path::from_path(dir.path()).unwrap();
        fs::write(base.join("keep.txt"), b"x").unwrap();
        fs::write(base.join("skip.txt"), b"y").unwrap();

        let (file_tx, file_rx) = unbounded();
        let (dir_tx, dir_rx) = unbounded();
        let mut config = default_config(WalkOrder::Dfs);
        config.exclusions.basenames.insert("skip.txt".to_string());
        walk(base, &config, &file_tx, &dir_tx).unwrap();
        drop(file_tx);
        drop(dir_tx);

        let files: Vec<_> = file_rx.iter().collect();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path.as_str(), "keep.txt");

        let root_dir = dir_rx.iter().next().unwrap();
        assert_eq!(root_dir.entries_expected, 1);
    }

    #[test]
    fn excluded_subtree_is_not_recursed() {
        let dir = tempfile::tempdir().unwrap();
        let base = Utf8Path::from_path(dir.path()).unwrap();
        fs::create_dir(base.join("hidden")).unwrap();
        fs::write(base.join("hidden/inner.txt"), b"x").unwrap();

        let (file_tx, file_rx) = unbounded();
        let (dir_tx, dir_rx) = unbounded();
        let mut config = default_config(WalkOrder::Dfs);
        config.exclusions.subtrees.insert(Utf8PathBuf::from("hidden"));
        walk(base, &config, &file_tx, &dir_tx).unwrap();
        drop(file_tx);
        drop(dir_tx);

        assert_eq!(file_rx.iter().count(), 0);
        let dirs: Vec<_> = dir_rx.iter().collect();
        assert_eq!(dirs.len(), 1);
        assert_eq!(dirs[0].entries_expected, 0);
    }

    #[test]
    fn shall_stop_halts_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let base = Utf8Path::from_path(dir.path()).unwrap();
        fs::write(base.join("a.txt"), b"x").unwrap();

        let (file_tx, file_rx) = unbounded();
        let (dir_tx, dir_rx) = unbounded();
        let config = default_config(WalkOrder::Dfs);
        config.shall_stop.store(true, Ordering::SeqCst);
        walk(base, &config, &file_tx, &dir_tx).unwrap();
        drop(file_tx);
        drop(dir_tx);

        assert_eq!(file_rx.iter().count(), 0);
        assert_eq!(dir_rx.iter().count(), 0);
    }

    #[test]
    fn regex_exclusion_matches_basename() {
        let dir = tempfile::tempdir().unwrap();
        let base = Utf8Path::from_path(dir.path()).unwrap();
        fs::write(base.join("a.tmp"), b"x").unwrap();
        fs::write(base.join("b.txt"), b"y").unwrap();

        let (file_tx, file_rx) = unbounded();
        let (dir_tx, _dir_rx) = unbounded();
        let mut config = default_config(WalkOrder::Dfs);
        config.exclusions.regexes.push(Regex::new(r"\.tmp$").unwrap());
        walk(base, &config, &file_tx, &dir_tx).unwrap();
        drop(file_tx);

        let files: Vec<_> = file_rx.iter().collect();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path.as_str(), "b.txt");
    }
}

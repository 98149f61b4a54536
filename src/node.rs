//! # Node hasher (C2)
//!
//! Given one filesystem node and a hashing mode, produces its digest
//! (spec §4.2). Directories are handled upstream by the aggregator (C4) —
//! this module only ever sees non-directory content plus the basename seed.

use camino::{Utf8Path, Utf8PathBuf};

use crate::error::CoreError;
use crate::hash::Hash;

/// A single ASCII byte from the node-type set (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeType {
    Directory,
    File,
    Symlink,
    Device,
    Fifo,
    Socket,
    Unknown,
}

impl NodeType {
    pub fn as_byte(self) -> u8 {
        match self {
            NodeType::Directory => b'D',
            NodeType::File => b'F',
            NodeType::Symlink => b'L',
            NodeType::Device => b'C',
            NodeType::Fifo => b'P',
            NodeType::Socket => b'S',
            NodeType::Unknown => b'X',
        }
    }

    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            b'D' => Some(NodeType::Directory),
            b'F' => Some(NodeType::File),
            b'L' => Some(NodeType::Symlink),
            b'C' => Some(NodeType::Device),
            b'P' => Some(NodeType::Fifo),
            b'S' => Some(NodeType::Socket),
            b'X' => Some(NodeType::Unknown),
            _ => None,
        }
    }

    #[cfg(unix)]
    pub fn from_metadata(meta: &std::fs::Metadata) -> Self {
        use std::os::unix::fs::FileTypeExt;
        let ft = meta.file_type();
        if ft.is_dir() {
            NodeType::Directory
        } else if ft.is_symlink() {
            NodeType::Symlink
        } else if ft.is_file() {
            NodeType::File
        } else if ft.is_char_device() || ft.is_block_device() {
            NodeType::Device
        } else if ft.is_fifo() {
            NodeType::Fifo
        } else if ft.is_socket() {
            NodeType::Socket
        } else {
            NodeType::Unknown
        }
    }

    #[cfg(not(unix))]
    pub fn from_metadata(meta: &std::fs::Metadata) -> Self {
        let ft = meta.file_type();
        if ft.is_dir() {
            NodeType::Directory
        } else if ft.is_symlink() {
            NodeType::Symlink
        } else if ft.is_file() {
            NodeType::File
        } else {
            NodeType::Unknown
        }
    }
}

/// Hashing mode (spec §3 / §4.2): whether the node's basename is folded
/// into its digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashMode {
    Basename,
    Empty,
}

/// (path relative to root, node type, byte size, digest) (spec §3).
#[derive(Debug, Clone)]
pub struct NodeRecord {
    pub path: Utf8PathBuf,
    pub node_type: NodeType,
    pub size: u64,
    pub digest: Vec<u8>,
}

const UNIT_SEPARATOR: u8 = 0x1F;

/// Compute one node's digest per spec §4.2. `hash` is reset internally; the
/// caller owns its lifetime so it can be reused across nodes without
/// reallocating.
pub fn hash_node(
    hash: &mut dyn Hash,
    mode: HashMode,
    base: &Utf8Path,
    record: &NodeRecord,
) -> Result<Vec<u8>, CoreError> {
    hash.reset();

    if mode == HashMode::Basename {
        let name = crate::util::basename(&record.path);
        hash.update(name.as_bytes());
        hash.update(&[UNIT_SEPARATOR]);
    }

    match record.node_type {
        NodeType::Directory => {
            // The directory's own digest comes from the aggregator (C4); this
            // hasher only ever runs for leaves and symlinks/special files.
        }
        NodeType::File => {
            let full = if record.path.as_str().is_empty() {
                base.to_owned()
            } else {
                base.join(record.path.as_str())
            };
            hash.update_file(&full).map_err(|e| CoreError::io(full.to_string(), e))?;
        }
        NodeType::Symlink => {
            hash.update(b"link to ");
            let full = base.join(record.path.as_str());
            if let Ok(target) = std::fs::read_link(full.as_std_path()) {
                if let Some(target_str) = target.to_str() {
                    hash.update(target_str.as_bytes());
                }
            }
            // On read failure, stop updating: the digest is just "link to ".
        }
        NodeType::Device => {
            hash.update(b"device file");
        }
        NodeType::Fifo => {
            hash.update(b"FIFO pipe");
        }
        NodeType::Socket => {
            hash.update(b"UNIX domain socket");
        }
        NodeType::Unknown => {
            return Err(CoreError::UnknownNodeType {
                path: record.path.to_string(),
                byte: NodeType::Unknown.as_byte(),
            });
        }
    }

    Ok(hash.digest())
}

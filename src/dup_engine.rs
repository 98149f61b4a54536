//! # Duplicate engine (C6 steps 1-5, spec §4.6)
//!
//! Consumes up to 16 reports written by C5 and produces duplicate-set
//! records: groups of paths (possibly spanning several reports) whose
//! subtrees are byte-for-byte identical. Matching bubbles up to the
//! topmost equal ancestor so a duplicated directory is reported once,
//! not once per descendant.

use std::collections::HashMap;

use camino::Utf8PathBuf;

use crate::digest_store::{DigestCoord, DigestStore};
use crate::dup_tree::{DupTree, NodeIndex};
use crate::error::CoreError;
use crate::hash;
use crate::report::ReportReader;

const MAX_REPORTS: usize = 16;

/// One member of a duplicate-set: which input report (by index) and the
/// root-relative path within it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateMember {
    pub report_index: usize,
    pub path: Utf8PathBuf,
}

#[derive(Debug, Clone)]
pub struct DuplicateSet {
    pub members: Vec<DuplicateMember>,
}

fn hex_decode(s: &str) -> Result<Vec<u8>, CoreError> {
    if s.len() % 2 != 0 {
        return Err(CoreError::InvalidReportLine {
            file: String::new(),
            line: 0,
            detail: format!("odd-length hex digest '{s}'"),
        });
    }
    let mut out = Vec::with_capacity(s.len() / 2);
    for chunk in s.as_bytes().chunks(2) {
        let pair = std::str::from_utf8(chunk).unwrap();
        let byte = u8::from_str_radix(pair, 16).map_err(|_| CoreError::InvalidReportLine {
            file: String::new(),
            line: 0,
            detail: format!("bad hex digest '{s}'"),
        })?;
        out.push(byte);
    }
    Ok(out)
}

/// Run the full duplicate-finding pipeline over `paths` (spec §4.6).
pub fn find_duplicates(paths: &[Utf8PathBuf]) -> Result<Vec<DuplicateSet>, CoreError> {
    if paths.len() > MAX_REPORTS {
        return Err(CoreError::TooManyReports { count: paths.len() });
    }

    // Step 1: consistency check + capacity estimate.
    let mut total_bytes: u64 = 0;
    let mut major_version = None;
    let mut hash_algo = None;
    let mut mode = None;

    for path in paths {
        let reader = ReportReader::open(path)?;
        let head = &reader.head;
        match (&major_version, &hash_algo, &mode) {
            (None, None, None) => {
                major_version = Some(head.version.0);
                hash_algo = Some(head.hash_algo.clone());
                mode = Some(head.mode);
            }
            (Some(v), Some(a), Some(m)) => {
                if *v != head.version.0 || a != &head.hash_algo || *m != head.mode {
                    return Err(CoreError::InconsistentReports {
                        detail: format!(
                            "report {path} has version {}, algo {}, mode {} — expected version {v}, algo {a}, mode {m}",
                            head.version.0, head.hash_algo, head.mode
                        ),
                    });
                }
            }
            _ => unreachable!(),
        }
        total_bytes += std::fs::metadata(path.as_std_path())
            .map(|m| m.len())
            .unwrap_or(0);
    }

    let hash_algo = hash_algo.unwrap_or_default();
    let width = hash::output_size_for(&hash_algo)?;

    // Step 2: build the digest store.
    let estimated_lines = ((total_bytes / 119) as usize).max(2);
    let capacity_per_bucket = (estimated_lines / 256).max(1);
    let mut store = DigestStore::new(width, capacity_per_bucket);

    for path in paths {
        let mut reader = ReportReader::open(path)?;
        while let Some((_, tail)) = reader.next_tail()? {
            let digest = hex_decode(&tail.digest_hex)?;
            store.record(&digest);
        }
    }

    // Step 3: prune to duplicates only.
    store.compact();

    // Step 4: build per-report trees.
    let mut trees = Vec::with_capacity(paths.len());
    for path in paths {
        let mut reader = ReportReader::open(path)?;
        let mut tree = DupTree::new();
        while let Some((_, tail)) = reader.next_tail()? {
            let digest = hex_decode(&tail.digest_hex)?;
            if let Some((coord, _expected)) = store.lookup(&digest) {
                tree.insert(&tail.path, coord);
            }
        }
        trees.push(tree);
    }

    // Step 5: match and bubble.
    match_and_bubble(&trees, &mut store)
}

fn build_coord_index(trees: &[DupTree]) -> HashMap<DigestCoord, Vec<(usize, NodeIndex)>> {
    let mut index: HashMap<DigestCoord, Vec<(usize, NodeIndex)>> = HashMap::new();
    for (tree_idx, tree) in trees.iter().enumerate() {
        for node_idx in tree.post_order() {
            if let Some(coord) = tree.nodes[node_idx].coord {
                index.entry(coord).or_default().push((tree_idx, node_idx));
            }
        }
    }
    index
}

fn match_and_bubble(trees: &[DupTree], store: &mut DigestStore) -> Result<Vec<DuplicateSet>, CoreError> {
    let coord_index = build_coord_index(trees);
    let (tx, rx) = crossbeam::channel::unbounded::<DuplicateSet>();

    let results = std::thread::scope(|scope| {
        let collector = scope.spawn(move || {
            let mut collected = Vec::new();
            while let Ok(set) = rx.recv() {
                collected.push(set);
            }
            collected
        });

        for (tree_idx, tree) in trees.iter().enumerate() {
            for node_idx in tree.post_order() {
                let coord = tree.nodes[node_idx].coord.expect("post_order only yields initialized nodes");
                if store.is_disabled(coord) {
                    continue;
                }
                let matches = coord_index.get(&coord).cloned().unwrap_or_default();
                bubble_up(matches, coord, true, trees, &coord_index, store, &tx);
            }
            let _ = tree_idx;
        }

        drop(tx);
        collector.join().expect("duplicate-set collector thread panicked")
    });

    Ok(results)
}

fn bubble_up(
    matches: Vec<(usize, NodeIndex)>,
    coord: DigestCoord,
    is_initial_collection: bool,
    trees: &[DupTree],
    coord_index: &HashMap<DigestCoord, Vec<(usize, NodeIndex)>>,
    store: &mut DigestStore,
    tx: &crossbeam::channel::Sender<DuplicateSet>,
) {
    if store.is_disabled(coord) {
        return;
    }

    // `matches` equals every node sharing `coord` only on the initial
    // post-order collection call. On a recursive bubble, `matches` is
    // the cluster's parents, a strict subset of coord_index[coord]
    // whenever the parent digest also occurs without the matched child
    // (e.g. a lonely directory sharing its digest by coincidence). That
    // is a realistic digest collision, not an internal bug, so the
    // invariant check only applies to the initial call.
    if is_initial_collection {
        let expected = store.expected_for(coord);
        assert!(
            matches.len() as u32 >= expected || expected == 128,
            "match count {} below expected {} for an undisabled duplicate entry",
            matches.len(),
            expected
        );
    }

    store.set_disabled(coord);

    let members: Vec<DuplicateMember> = matches
        .iter()
        .map(|&(tree_idx, node_idx)| DuplicateMember {
            report_index: tree_idx,
            path: trees[tree_idx].path_of(node_idx),
        })
        .collect();
    tx.send(DuplicateSet { members }).ok();

    let mut clusters: HashMap<Option<DigestCoord>, Vec<(usize, NodeIndex)>> = HashMap::new();
    for &(tree_idx, node_idx) in &matches {
        let parent_coord = trees[tree_idx].parent_coord(node_idx);
        clusters.entry(parent_coord).or_default().push((tree_idx, node_idx));
    }

    for (parent_coord, nodes) in clusters {
        if nodes.len() < 2 {
            continue;
        }
        let Some(parent_coord) = parent_coord else {
            continue;
        };
        if store.is_disabled(parent_coord) {
            continue;
        }

        let mut parents: Vec<(usize, NodeIndex)> = nodes
            .iter()
            .map(|&(tree_idx, node_idx)| (tree_idx, trees[tree_idx].nodes[node_idx].parent_index))
            .collect();
        parents.sort_unstable();
        parents.dedup();

        bubble_up(parents, parent_coord, false, trees, coord_index, store, tx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeType;
    use crate::report::{ReportHead, ReportWriter, TailLine};
    use camino::Utf8Path;

    fn hex(digest: &[u8]) -> String {
        digest.iter().map(|b| format!("{b:02x}")).collect()
    }

    fn write_report(dir: &Utf8Path, name: &str, mode: char, entries: &[(&str, NodeType, u64, &[u8])]) -> Utf8PathBuf {
        let path = dir.join(name);
        let head = ReportHead {
            version: (1, 0, 0),
            timestamp: "2024-01-01T00:00:00".to_string(),
            hash_algo: "sha-256".to_string(),
            mode,
            node_name: "root".to_string(),
            base_path: Utf8PathBuf::from("/tmp/root"),
        };
        let mut writer = ReportWriter::create(&path, &head).unwrap();
        for (p, node_type, size, digest) in entries {
            writer
                .write_tail(&TailLine {
                    digest_hex: hex(digest),
                    node_type: *node_type,
                    size: *size,
                    path: Utf8PathBuf::from(*p),
                })
                .unwrap();
        }
        writer.flush().unwrap();
        path
    }

    #[test]
    fn too_many_reports_rejected() {
        let paths: Vec<Utf8PathBuf> = (0..17).map(|i| Utf8PathBuf::from(format!("r{i}.txt"))).collect();
        let err = find_duplicates(&paths).unwrap_err();
        assert!(matches!(err, CoreError::TooManyReports { count: 17 }));
    }

    #[test]
    fn inconsistent_mode_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let base = Utf8Path::from_path(dir.path()).unwrap();
        let d = vec![1u8; 32];
        let r1 = write_report(base, "r1.txt", 'B', &[(".", NodeType::Directory, 0, &d)]);
        let r2 = write_report(base, "r2.txt", 'E', &[(".", NodeType::Directory, 0, &d)]);

        let err = find_duplicates(&[r1, r2]).unwrap_err();
        assert!(matches!(err, CoreError::InconsistentReports { .. }));
    }

    #[test]
    fn two_root_identity_emits_one_duplicate_set() {
        let dir = tempfile::tempdir().unwrap();
        let base = Utf8Path::from_path(dir.path()).unwrap();
        let d = vec![9u8; 32];
        let r1 = write_report(base, "r1.txt", 'B', &[(".", NodeType::Directory, 0, &d)]);
        let r2 = write_report(base, "r2.txt", 'B', &[(".", NodeType::Directory, 0, &d)]);

        let sets = find_duplicates(&[r1, r2]).unwrap();
        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0].members.len(), 2);
        for m in &sets[0].members {
            assert_eq!(m.path.as_str(), "");
        }
    }

    #[test]
    fn unique_file_produces_no_duplicate_set() {
        let dir = tempfile::tempdir().unwrap();
        let base = Utf8Path::from_path(dir.path()).unwrap();
        let a = vec![1u8; 32];
        let b = vec![2u8; 32];
        let r1 = write_report(base, "r1.txt", 'E', &[("a.txt", NodeType::File, 1, &a)]);
        let r2 = write_report(base, "r2.txt", 'E', &[("b.txt", NodeType::File, 1, &b)]);

        let sets = find_duplicates(&[r1, r2]).unwrap();
        assert!(sets.is_empty());
    }

    #[test]
    fn matching_file_under_non_matching_parents_reports_once_and_does_not_bubble() {
        let dir = tempfile::tempdir().unwrap();
        let base = Utf8Path::from_path(dir.path()).unwrap();

        let shared = vec![7u8; 32];
        // "unique1" and "unique2" each appear only once overall, so they
        // never become duplicate-store entries themselves; only the
        // nested file matches.
        let p1 = vec![11u8; 32];
        let p2 = vec![22u8; 32];

        let r1 = write_report(
            base,
            "r1.txt",
            'E',
            &[
                ("unique1/shared.txt", NodeType::File, 5, &shared),
                ("unique1", NodeType::Directory, 0, &p1),
            ],
        );
        let r2 = write_report(
            base,
            "r2.txt",
            'E',
            &[
                ("unique2/shared.txt", NodeType::File, 5, &shared),
                ("unique2", NodeType::Directory, 0, &p2),
            ],
        );

        let sets = find_duplicates(&[r1, r2]).unwrap();
        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0].members.len(), 2);
        let mut paths: Vec<String> = sets[0].members.iter().map(|m| m.path.to_string()).collect();
        paths.sort();
        assert_eq!(paths, vec!["unique1/shared.txt", "unique2/shared.txt"]);
    }

    #[test]
    fn fully_duplicated_single_child_chain_collapses_into_one_set() {
        let dir = tempfile::tempdir().unwrap();
        let base = Utf8Path::from_path(dir.path()).unwrap();

        // Empty mode + single child at every level means the directory
        // digest passes the child's digest through unchanged, so leaf,
        // folder, and root all collide on the same store entry.
        let shared = vec![3u8; 32];

        let r1 = write_report(
            base,
            "r1.txt",
            'E',
            &[
                ("folder/a.txt", NodeType::File, 5, &shared),
                ("folder", NodeType::Directory, 0, &shared),
                (".", NodeType::Directory, 0, &shared),
            ],
        );
        let r2 = write_report(
            base,
            "r2.txt",
            'E',
            &[
                ("folder/a.txt", NodeType::File, 5, &shared),
                ("folder", NodeType::Directory, 0, &shared),
                (".", NodeType::Directory, 0, &shared),
            ],
        );

        let sets = find_duplicates(&[r1, r2]).unwrap();
        // Every occurrence shares one digest store entry, so the whole
        // chain is disabled by a single bubble-up call.
        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0].members.len(), 6);
    }
}

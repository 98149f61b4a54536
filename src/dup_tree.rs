//! # Per-report duplicate tree (C6 step 4, spec §3 / §9)
//!
//! An arena of nodes addressed by stable index, each storing `parent_index`
//! (the root points to itself) instead of an owning back-reference — this
//! sidesteps the ownership cycle a parent pointer would otherwise require.

use std::collections::HashMap;

use camino::Utf8Path;

use crate::digest_store::DigestCoord;

pub type NodeIndex = usize;

pub struct TreeNode {
    pub basename: String,
    pub parent_index: NodeIndex,
    pub children: Vec<NodeIndex>,
    /// Set once this node's digest has been filled in (a tail-line path),
    /// as opposed to a structural intermediate created only to host
    /// deeper descendants.
    pub initialized: bool,
    pub coord: Option<DigestCoord>,
}

pub struct DupTree {
    pub nodes: Vec<TreeNode>,
    /// Maps a full relative path to its node index, for insertion lookups.
    by_path: HashMap<String, NodeIndex>,
}

impl DupTree {
    pub fn new() -> Self {
        let root = TreeNode {
            basename: String::new(),
            parent_index: 0,
            children: Vec::new(),
            initialized: false,
            coord: None,
        };
        let mut by_path = HashMap::new();
        by_path.insert(String::new(), 0);
        Self {
            nodes: vec![root],
            by_path,
        }
    }

    pub fn root(&self) -> NodeIndex {
        0
    }

    /// Insert (or find) the node at `path`, creating intermediate
    /// structural nodes along the way, then mark it initialized with the
    /// given digest coordinate.
    pub fn insert(&mut self, path: &Utf8Path, coord: DigestCoord) {
        if path.as_str().is_empty() {
            self.nodes[0].initialized = true;
            self.nodes[0].coord = Some(coord);
            return;
        }

        let mut current = self.root();
        let mut accumulated = String::new();
        for component in path.as_str().split('/') {
            if !accumulated.is_empty() {
                accumulated.push('/');
            }
            accumulated.push_str(component);

            current = if let Some(&idx) = self.by_path.get(&accumulated) {
                idx
            } else {
                let idx = self.nodes.len();
                self.nodes.push(TreeNode {
                    basename: component.to_string(),
                    parent_index: current,
                    children: Vec::new(),
                    initialized: false,
                    coord: None,
                });
                self.nodes[current].children.push(idx);
                self.by_path.insert(accumulated.clone(), idx);
                idx
            };
        }

        self.nodes[current].initialized = true;
        self.nodes[current].coord = Some(coord);
    }

    /// Leaves-first (post-order) iteration over every initialized node.
    pub fn post_order(&self) -> Vec<NodeIndex> {
        let mut out = Vec::new();
        self.post_order_from(self.root(), &mut out);
        out
    }

    fn post_order_from(&self, idx: NodeIndex, out: &mut Vec<NodeIndex>) {
        for &child in &self.nodes[idx].children {
            self.post_order_from(child, out);
        }
        if self.nodes[idx].initialized {
            out.push(idx);
        }
    }

    /// Reconstruct the root-relative path for `idx` by walking parent
    /// pointers. The root's path is `""`.
    pub fn path_of(&self, idx: NodeIndex) -> camino::Utf8PathBuf {
        let mut components = Vec::new();
        let mut cur = idx;
        while cur != self.root() {
            components.push(self.nodes[cur].basename.clone());
            cur = self.nodes[cur].parent_index;
        }
        components.reverse();
        camino::Utf8PathBuf::from(components.join("/"))
    }

    pub fn parent_coord(&self, idx: NodeIndex) -> Option<DigestCoord> {
        let parent = self.nodes[idx].parent_index;
        if parent == idx {
            return None;
        }
        self.nodes[parent].coord
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coord(b: u8, i: u32) -> DigestCoord {
        DigestCoord { first_byte: b, index: i }
    }

    #[test]
    fn root_insert_marks_root_initialized() {
        let mut t = DupTree::new();
        t.insert(Utf8Path::new(""), coord(1, 0));
        assert!(t.nodes[t.root()].initialized);
    }

    #[test]
    fn nested_insert_creates_intermediate_structural_nodes() {
        let mut t = DupTree::new();
        t.insert(Utf8Path::new("a/b/c.txt"), coord(2, 0));

        let post = t.post_order();
        // Only the leaf is initialized; intermediates "a" and "a/b" are
        // structural only.
        assert_eq!(post.len(), 1);
        let leaf = post[0];
        assert_eq!(t.nodes[leaf].basename, "c.txt");

        let b = t.nodes[leaf].parent_index;
        assert_eq!(t.nodes[b].basename, "b");
        assert!(!t.nodes[b].initialized);

        let a = t.nodes[b].parent_index;
        assert_eq!(t.nodes[a].basename, "a");
        assert_eq!(t.nodes[a].parent_index, t.root());
    }

    #[test]
    fn shared_prefix_reuses_intermediate_node() {
        let mut t = DupTree::new();
        t.insert(Utf8Path::new("dir/x.txt"), coord(3, 0));
        t.insert(Utf8Path::new("dir/y.txt"), coord(3, 1));

        let dir_idx = t.nodes[t.root()].children[0];
        assert_eq!(t.nodes[dir_idx].children.len(), 2);
    }

    #[test]
    fn post_order_visits_leaves_before_parents() {
        let mut t = DupTree::new();
        t.insert(Utf8Path::new("dir"), coord(4, 0));
        t.insert(Utf8Path::new("dir/x.txt"), coord(4, 1));

        let order = t.post_order();
        let x_pos = order.iter().position(|&i| t.nodes[i].basename == "x.txt").unwrap();
        let dir_pos = order.iter().position(|&i| t.nodes[i].basename == "dir").unwrap();
        assert!(x_pos < dir_pos);
    }

    #[test]
    fn path_of_reconstructs_full_relative_path() {
        let mut t = DupTree::new();
        t.insert(Utf8Path::new("a/b/c.txt"), coord(6, 0));
        let leaf = t.post_order()[0];
        assert_eq!(t.path_of(leaf).as_str(), "a/b/c.txt");
        assert_eq!(t.path_of(t.root()).as_str(), "");
    }

    #[test]
    fn root_is_its_own_parent_and_has_no_parent_coord() {
        let mut t = DupTree::new();
        t.insert(Utf8Path::new(""), coord(5, 0));
        assert_eq!(t.nodes[t.root()].parent_index, t.root());
        assert!(t.parent_coord(t.root()).is_none());
    }
}

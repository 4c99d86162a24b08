use crate::image::{Image, SourceId};
use crate::natural;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Index of a folder node within its [`FolderTree`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(usize);

/// One folder in the hierarchy.
///
/// Parent/child relationships are stored as arena indexes rather than live
/// pointers, so there is no ownership cycle to manage. Images are *placed*
/// in their folder node for presentation; their identity lives in the flat
/// list the tree was built from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FolderNode {
    pub source: SourceId,
    /// Absolute path within the source; the root is `/`.
    pub path: String,
    /// Final path component; the root's name is `/`.
    pub name: String,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub images: Vec<Image>,
    /// Images in this folder and all of its descendants.
    pub cumulative: usize,
    /// Whether the folder is expanded in the viewer. Cosmetic only.
    pub expanded: bool,
}

impl FolderNode {
    /// Images placed directly in this folder.
    pub fn direct_count(&self) -> usize {
        self.images.len()
    }
}

/// Folder hierarchy of one source, built from its flat image list.
///
/// The tree is an arena: nodes are addressed by [`NodeId`] and the root is
/// always present at index 0, even for an empty source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FolderTree {
    nodes: Vec<FolderNode>,
}

impl FolderTree {
    /// Build the folder hierarchy for `images`.
    ///
    /// Every image's folder path is resolved to exactly one node, with
    /// missing intermediate folders synthesized along the way. Afterwards
    /// cumulative counts are recomputed bottom-up and every child list and
    /// image list is put into natural order, so identical input yields an
    /// isomorphic tree regardless of input order.
    pub fn build(images: &[Image], source: SourceId) -> Self {
        let mut tree = Self {
            nodes: vec![FolderNode {
                source,
                path: "/".to_string(),
                name: "/".to_string(),
                parent: None,
                children: Vec::new(),
                images: Vec::new(),
                cumulative: 0,
                expanded: true,
            }],
        };
        let mut by_path: HashMap<String, NodeId> = HashMap::new();
        by_path.insert("/".to_string(), tree.root_id());
        for image in images {
            let node = tree.ensure_folder(&mut by_path, &image.folder, source);
            tree.nodes[node.0].images.push(image.clone());
        }
        tree.recompute_counts();
        tree.sort();
        tracing::trace!(folders = tree.len(), images = images.len(), "built folder tree");
        tree
    }

    pub fn root_id(&self) -> NodeId {
        NodeId(0)
    }

    pub fn root(&self) -> &FolderNode {
        &self.nodes[0]
    }

    pub fn node(&self, id: NodeId) -> &FolderNode {
        &self.nodes[id.0]
    }

    /// Number of folders in the tree (the root included).
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        // The root is always present.
        false
    }

    /// Look up a folder node by its absolute path within the source.
    pub fn find(&self, path: &str) -> Option<NodeId> {
        self.nodes.iter().position(|node| node.path == path).map(NodeId)
    }

    /// Resolve `path` to its node, creating it and any missing ancestors.
    fn ensure_folder(
        &mut self,
        by_path: &mut HashMap<String, NodeId>,
        path: &str,
        source: SourceId,
    ) -> NodeId {
        if let Some(&id) = by_path.get(path) {
            return id;
        }
        let mut current = self.root_id();
        let mut walked = String::new();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            walked.push('/');
            walked.push_str(segment);
            current = match by_path.get(walked.as_str()) {
                Some(&id) => id,
                None => {
                    let id = NodeId(self.nodes.len());
                    self.nodes.push(FolderNode {
                        source,
                        path: walked.clone(),
                        name: segment.to_string(),
                        parent: Some(current),
                        children: Vec::new(),
                        images: Vec::new(),
                        cumulative: 0,
                        expanded: false,
                    });
                    self.nodes[current.0].children.push(id);
                    by_path.insert(walked.clone(), id);
                    id
                },
            };
        }
        current
    }

    /// Recompute cumulative counts bottom-up.
    ///
    /// Children are always created after their parent, so walking the arena
    /// in reverse index order visits every child before its parent.
    fn recompute_counts(&mut self) {
        for index in (0..self.nodes.len()).rev() {
            let direct = self.nodes[index].images.len();
            let from_children: usize = self.nodes[index]
                .children
                .iter()
                .map(|child| self.nodes[child.0].cumulative)
                .sum();
            self.nodes[index].cumulative = direct + from_children;
        }
    }

    /// Naturally sort every node's child folders (by name) and images
    /// (by file name).
    fn sort(&mut self) {
        for index in 0..self.nodes.len() {
            let mut children = std::mem::take(&mut self.nodes[index].children);
            children.sort_by(|a, b| natural::compare(&self.nodes[a.0].name, &self.nodes[b.0].name));
            self.nodes[index].children = children;
            self.nodes[index].images.sort_by(|a, b| natural::compare(&a.name, &b.name));
        }
    }
}

use std::collections::VecDeque;

pub mod layout;
pub mod reroot;

pub type NodeId = usize;

/// Length used when drawing a branch whose length is absent or zero.
pub const DRAWN_MIN_BRANCH_LENGTH: f64 = 0.01;

/// Rooted phylogenetic tree stored as an arena of nodes.
///
/// Node ids are pre-order indices: the root is `0`, and a parent always has a
/// smaller id than any of its descendants. Ids are reassigned whenever the
/// topology changes (see [`Tree::from_arena`]), so they are reproducible for a
/// given input text.
#[derive(Debug, Clone, PartialEq)]
pub struct Tree {
    pub label: Option<String>,
    pub nodes: Vec<TreeNode>,
    root: NodeId,
}

impl Tree {
    /// Build a tree from an arena whose `id`s are arena indices.
    ///
    /// Nodes unreachable from `root` are dropped and the remaining nodes are
    /// renumbered in pre-order, keeping each node's child order.
    pub fn from_arena(label: Option<String>, arena: Vec<TreeNode>, root: NodeId) -> Self {
        let mut order = Vec::with_capacity(arena.len());
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(arena[id].children.iter().rev().copied());
        }

        let mut remap = vec![usize::MAX; arena.len()];
        for (new_id, &old_id) in order.iter().enumerate() {
            remap[old_id] = new_id;
        }

        let nodes = order
            .iter()
            .enumerate()
            .map(|(new_id, &old_id)| {
                let old = &arena[old_id];
                TreeNode {
                    id: new_id,
                    name: old.name.clone(),
                    length: old.length,
                    confidence: old.confidence,
                    parent: if old_id == root {
                        None
                    } else {
                        old.parent.map(|parent| remap[parent])
                    },
                    children: old.children.iter().map(|child| remap[*child]).collect(),
                }
            })
            .collect();

        Self {
            label,
            nodes,
            root: 0,
        }
    }

    pub fn root_id(&self) -> NodeId {
        self.root
    }

    pub fn root(&self) -> &TreeNode {
        &self.nodes[self.root]
    }

    pub fn node(&self, id: NodeId) -> &TreeNode {
        &self.nodes[id]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn leaf_count(&self) -> usize {
        self.nodes.iter().filter(|node| node.is_terminal()).count()
    }

    /// Terminal nodes in left-to-right (input) order.
    pub fn tips(&self) -> Vec<NodeId> {
        self.pre_order()
            .into_iter()
            .filter(|id| self.nodes[*id].is_terminal())
            .collect()
    }

    pub fn internal_nodes(&self) -> Vec<NodeId> {
        self.pre_order()
            .into_iter()
            .filter(|id| !self.nodes[*id].is_terminal())
            .collect()
    }

    pub fn find_by_name(&self, name: &str) -> Option<NodeId> {
        self.nodes
            .iter()
            .find(|node| node.name.as_deref() == Some(name))
            .map(|node| node.id)
    }

    pub fn pre_order(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.nodes[id].children.iter().rev().copied());
        }
        order
    }

    /// Children before parents, siblings in input order.
    pub fn post_order(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![(self.root, false)];
        while let Some((id, expanded)) = stack.pop() {
            if expanded {
                order.push(id);
                continue;
            }
            stack.push((id, true));
            for &child in self.nodes[id].children.iter().rev() {
                stack.push((child, false));
            }
        }
        order
    }

    /// Breadth-first order, siblings in input order.
    pub fn level_order(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut queue = VecDeque::from([self.root]);
        while let Some(id) = queue.pop_front() {
            order.push(id);
            queue.extend(self.nodes[id].children.iter().copied());
        }
        order
    }

    /// Sum of branch lengths on the path from the root to `id`.
    pub fn depth_from_root(&self, id: NodeId) -> f64 {
        let mut depth = 0.0;
        let mut current = id;
        while let Some(parent) = self.nodes[current].parent {
            depth += self.nodes[current].metric_length();
            current = parent;
        }
        depth
    }

    /// Root distance of every node, indexed by id.
    pub fn depths(&self) -> Vec<f64> {
        let mut depths = vec![0.0; self.nodes.len()];
        for id in self.pre_order() {
            if let Some(parent) = self.nodes[id].parent {
                depths[id] = depths[parent] + self.nodes[id].metric_length();
            }
        }
        depths
    }

    pub fn max_tip_depth(&self) -> f64 {
        let depths = self.depths();
        self.nodes
            .iter()
            .filter(|node| node.is_terminal())
            .map(|node| depths[node.id])
            .fold(0.0f64, f64::max)
    }

    /// Confidence values attached to internal nodes.
    pub fn confidences(&self) -> Vec<f64> {
        self.nodes
            .iter()
            .filter(|node| !node.is_terminal())
            .filter_map(|node| node.confidence)
            .collect()
    }
}

/// One clade of a [`Tree`].
#[derive(Debug, Clone, PartialEq)]
pub struct TreeNode {
    pub id: NodeId,
    pub name: Option<String>,
    pub length: Option<f64>,
    pub confidence: Option<f64>,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

impl TreeNode {
    pub fn new(id: NodeId, name: Option<String>, length: Option<f64>) -> Self {
        Self {
            id,
            name,
            length,
            confidence: None,
            parent: None,
            children: Vec::new(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.children.is_empty()
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("")
    }

    /// Branch length as given, absent counting as zero.
    pub fn metric_length(&self) -> f64 {
        self.length.unwrap_or(0.0)
    }

    /// Branch length used for drawing: zero for the root, never below
    /// [`DRAWN_MIN_BRANCH_LENGTH`] elsewhere.
    pub fn drawn_length(&self) -> f64 {
        if self.is_root() {
            return 0.0;
        }
        match self.length {
            Some(length) if length > 0.0 => length,
            _ => DRAWN_MIN_BRANCH_LENGTH,
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::Tree;

    pub fn parse(newick: &str) -> Tree {
        crate::io::parse_tree_text(newick).expect("valid test newick")
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::parse;

    fn names(tree: &super::Tree, ids: &[usize]) -> Vec<String> {
        ids.iter()
            .map(|id| {
                let node = tree.node(*id);
                node.name.clone().unwrap_or_else(|| format!("#{}", node.id))
            })
            .collect()
    }

    #[test]
    fn ids_are_preorder_indices() {
        let tree = parse("(A:1,(B:1,(C:1,D:1):1):1);");
        assert_eq!(tree.pre_order(), (0..tree.len()).collect::<Vec<_>>());
        for node in &tree.nodes {
            if let Some(parent) = node.parent {
                assert!(parent < node.id);
                assert!(tree.node(parent).children.contains(&node.id));
            }
        }
    }

    #[test]
    fn traversals_are_deterministic() {
        let tree = parse("(A:1,(B:1,(C:1,D:1):1):1);");
        assert_eq!(
            names(&tree, &tree.post_order()),
            vec!["A", "B", "C", "D", "#4", "#2", "#0"]
        );
        assert_eq!(
            names(&tree, &tree.level_order()),
            vec!["#0", "A", "#2", "B", "#4", "C", "D"]
        );
        assert_eq!(names(&tree, &tree.tips()), vec!["A", "B", "C", "D"]);
    }

    #[test]
    fn depth_sums_branch_lengths() {
        let tree = parse("(A:1,(B:1.5,(C:0.25,D:1):2):1);");
        let c = tree.find_by_name("C").unwrap();
        assert!((tree.depth_from_root(c) - 3.25).abs() < 1e-12);
        assert_eq!(tree.depths()[c], tree.depth_from_root(c));
        assert_eq!(tree.depth_from_root(tree.root_id()), 0.0);
        assert!((tree.max_tip_depth() - 4.0).abs() < 1e-12);
    }

    #[test]
    fn drawn_length_never_collapses() {
        let tree = parse("(A:0,B,(C:2,D:1)E:0);");
        let a = tree.node(tree.find_by_name("A").unwrap());
        let b = tree.node(tree.find_by_name("B").unwrap());
        let c = tree.node(tree.find_by_name("C").unwrap());
        assert_eq!(a.drawn_length(), super::DRAWN_MIN_BRANCH_LENGTH);
        assert_eq!(b.drawn_length(), super::DRAWN_MIN_BRANCH_LENGTH);
        assert_eq!(b.metric_length(), 0.0);
        assert_eq!(c.drawn_length(), 2.0);
        assert_eq!(tree.root().drawn_length(), 0.0);
    }
}

use log::debug;

use super::{NodeId, Tree, TreeNode};

const MIDPOINT_TOLERANCE: f64 = 1e-9;

type Adjacency = Vec<Vec<(NodeId, Option<f64>)>>;

impl Tree {
    /// Return a copy of the tree rooted at the midpoint of its longest
    /// tip-to-tip path.
    ///
    /// The new root is bifurcating. When the midpoint falls inside a branch
    /// that branch is split in two; when it falls on an existing
    /// multifurcating node, a zero-length branch toward the second end of the
    /// path is used. A tree whose bifurcating root already balances the
    /// deepest tips on both sides is returned unchanged, which makes the
    /// operation idempotent.
    pub fn midpoint_rooted(&self) -> Tree {
        if self.leaf_count() < 2 || self.is_midpoint_rooted() {
            return self.clone();
        }
        if self.root().children.len() == 1 {
            return self.without_root_unifurcation().midpoint_rooted();
        }

        let adjacency = build_adjacency(self);
        let start = self.tips()[0];
        let (first_leaf, _, _) = farthest_leaf(self, &adjacency, start);
        let (second_leaf, diameter, path) = farthest_leaf(self, &adjacency, first_leaf);

        if path.len() < 2 || diameter <= f64::EPSILON {
            return self.clone();
        }

        let tolerance = MIDPOINT_TOLERANCE * diameter.max(1.0);
        let half = diameter / 2.0;

        let mut traversed = 0.0;
        let mut split = None;
        for (index, window) in path.windows(2).enumerate() {
            let (a, b) = (window[0], window[1]);
            let length = edge_length(&adjacency, a, b);
            if traversed + length >= half - tolerance {
                split = Some((index, half - traversed, length));
                break;
            }
            traversed += length;
        }

        let Some((index, offset, length)) = split else {
            return self.clone();
        };

        // Midpoint sitting on the far node of this edge: move to the next edge.
        let (near, far, offset) = if length - offset <= tolerance && index + 2 < path.len() {
            (path[index + 1], path[index + 2], 0.0)
        } else {
            (path[index], path[index + 1], offset.max(0.0))
        };

        debug!(
            "Midpoint of {:.6} between tips {} and {} lies {:.6} from node {} toward {}",
            diameter, first_leaf, second_leaf, offset, near, far
        );

        if offset <= tolerance && adjacency[near].len() == 2 {
            return self.rerooted_at(near, adjacency);
        }

        self.rerooted_on_edge(near, far, offset, adjacency)
    }

    /// True when the root has two children and the deepest tip on each side
    /// is equally far from it.
    pub fn is_midpoint_rooted(&self) -> bool {
        let root = self.root();
        if root.children.len() != 2 {
            return false;
        }

        let depths = self.depths();
        let boundary = root.children[1];
        let mut left = f64::NEG_INFINITY;
        let mut right = f64::NEG_INFINITY;
        for node in self.nodes.iter().filter(|node| node.is_terminal()) {
            if node.id < boundary {
                left = left.max(depths[node.id]);
            } else {
                right = right.max(depths[node.id]);
            }
        }

        let scale = left.abs().max(right.abs()).max(1.0);
        (left - right).abs() <= MIDPOINT_TOLERANCE * scale
    }

    /// Drop a root with a single child; that child becomes the root. The
    /// dropped edge lies on no tip-to-tip path.
    fn without_root_unifurcation(&self) -> Tree {
        let child = self.root().children[0];
        let mut arena = self.nodes.clone();
        arena[child].length = None;
        Tree::from_arena(self.label.clone(), arena, child)
    }

    fn rerooted_on_edge(
        &self,
        near: NodeId,
        far: NodeId,
        offset: f64,
        mut adjacency: Adjacency,
    ) -> Tree {
        let length = edge_length(&adjacency, near, far);
        let new_root = adjacency.len();

        replace_neighbor(&mut adjacency[near], far, new_root, Some(offset));
        replace_neighbor(&mut adjacency[far], near, new_root, Some((length - offset).max(0.0)));

        // Keep the side that used to hold the parent end of the edge first.
        let near_is_parent = self.nodes[far].parent == Some(near);
        let (first, second) = if near_is_parent { (near, far) } else { (far, near) };
        let first_length = if first == near { offset } else { length - offset };
        adjacency.push(vec![
            (first, Some(first_length.max(0.0))),
            (second, Some((length - first_length).max(0.0))),
        ]);

        self.rerooted_at(new_root, adjacency)
    }

    fn rerooted_at(&self, new_root: NodeId, adjacency: Adjacency) -> Tree {
        let mut arena: Vec<TreeNode> = self.nodes.clone();
        while arena.len() < adjacency.len() {
            arena.push(TreeNode::new(arena.len(), None, None));
        }

        orient(&mut arena, &adjacency, new_root);

        let old_root = self.root_id();
        if old_root != new_root && arena[old_root].children.len() == 1 {
            collapse_unifurcation(&mut arena, old_root);
        }

        Tree::from_arena(self.label.clone(), arena, new_root)
    }
}

fn build_adjacency(tree: &Tree) -> Adjacency {
    let mut adjacency = vec![Vec::new(); tree.len()];
    for node in &tree.nodes {
        if let Some(parent) = node.parent {
            adjacency[node.id].push((parent, node.length));
            adjacency[parent].push((node.id, node.length));
        }
    }
    adjacency
}

fn edge_length(adjacency: &Adjacency, a: NodeId, b: NodeId) -> f64 {
    adjacency[a]
        .iter()
        .find(|(next, _)| *next == b)
        .and_then(|(_, length)| *length)
        .unwrap_or(0.0)
}

fn replace_neighbor(
    neighbors: &mut [(NodeId, Option<f64>)],
    old: NodeId,
    new: NodeId,
    length: Option<f64>,
) {
    if let Some(entry) = neighbors.iter_mut().find(|(next, _)| *next == old) {
        *entry = (new, length);
    }
}

/// Farthest tip from `start`, its distance, and the path leading to it.
fn farthest_leaf(tree: &Tree, adjacency: &Adjacency, start: NodeId) -> (NodeId, f64, Vec<NodeId>) {
    let mut parents: Vec<Option<NodeId>> = vec![None; adjacency.len()];
    let mut best_node = start;
    let mut best_distance = -1.0;

    let mut stack = vec![(start, None, 0.0)];
    while let Some((node, parent, distance)) = stack.pop() {
        parents[node] = parent;
        if node != start && tree.nodes[node].is_terminal() && distance > best_distance {
            best_distance = distance;
            best_node = node;
        }
        for &(next, length) in adjacency[node].iter().rev() {
            if Some(next) == parent {
                continue;
            }
            stack.push((next, Some(node), distance + length.unwrap_or(0.0)));
        }
    }

    if best_distance < 0.0 {
        return (start, 0.0, vec![start]);
    }

    let mut path = vec![best_node];
    let mut current = best_node;
    while let Some(parent) = parents[current] {
        path.push(parent);
        current = parent;
    }
    path.reverse();

    (best_node, best_distance, path)
}

fn orient(arena: &mut [TreeNode], adjacency: &Adjacency, root: NodeId) {
    let mut visited = vec![false; arena.len()];
    let mut stack: Vec<(NodeId, Option<(NodeId, Option<f64>)>)> = vec![(root, None)];

    while let Some((node, parent)) = stack.pop() {
        if visited[node] {
            continue;
        }
        visited[node] = true;

        let parent_id = parent.map(|(id, _)| id);
        let children: Vec<(NodeId, Option<f64>)> = adjacency[node]
            .iter()
            .filter(|(next, _)| Some(*next) != parent_id)
            .copied()
            .collect();

        let entry = &mut arena[node];
        entry.parent = parent_id;
        entry.length = parent.and_then(|(_, length)| length);
        entry.children = children.iter().map(|(child, _)| *child).collect();

        for &(child, length) in children.iter().rev() {
            stack.push((child, Some((node, length))));
        }
    }
}

fn collapse_unifurcation(arena: &mut [TreeNode], node: NodeId) {
    let Some(parent) = arena[node].parent else {
        return;
    };
    let child = arena[node].children[0];

    arena[child].length = match (arena[node].length, arena[child].length) {
        (None, None) => None,
        (outer, inner) => Some(outer.unwrap_or(0.0) + inner.unwrap_or(0.0)),
    };
    arena[child].parent = Some(parent);

    for slot in arena[parent].children.iter_mut() {
        if *slot == node {
            *slot = child;
        }
    }
    arena[node].children.clear();
    arena[node].parent = None;
}

#[cfg(test)]
mod tests {
    use crate::tree::test_support::parse;
    use crate::tree::Tree;

    fn tip_names(tree: &Tree) -> Vec<String> {
        tree.tips()
            .into_iter()
            .map(|id| tree.node(id).display_name().to_string())
            .collect()
    }

    fn root_split(tree: &Tree) -> Vec<Vec<String>> {
        let root = tree.root();
        let mut sides = Vec::new();
        for (index, &child) in root.children.iter().enumerate() {
            let end = root.children.get(index + 1).copied().unwrap_or(tree.len());
            let mut names: Vec<String> = (child..end)
                .filter(|id| tree.node(*id).is_terminal())
                .map(|id| tree.node(id).display_name().to_string())
                .collect();
            names.sort();
            sides.push(names);
        }
        sides
    }

    #[test]
    fn splits_branch_at_exact_midpoint() {
        let tree = parse("(A:1,B:5);");
        let rooted = tree.midpoint_rooted();
        assert!(rooted.is_midpoint_rooted());
        let a = rooted.find_by_name("A").unwrap();
        let b = rooted.find_by_name("B").unwrap();
        assert!((rooted.depth_from_root(a) - 3.0).abs() < 1e-9);
        assert!((rooted.depth_from_root(b) - 3.0).abs() < 1e-9);
    }

    #[test]
    fn ladder_tree_gets_three_internal_nodes() {
        let tree = parse("(A:1,(B:1,(C:1,D:1):1):1);");
        let rooted = tree.midpoint_rooted();

        assert_eq!(rooted.leaf_count(), 4);
        assert_eq!(rooted.internal_nodes().len(), 3);
        assert!(rooted.is_midpoint_rooted());
        assert_eq!(tip_names(&rooted), vec!["A", "B", "C", "D"]);

        let a = rooted.find_by_name("A").unwrap();
        let c = rooted.find_by_name("C").unwrap();
        assert!((rooted.depth_from_root(a) - 2.0).abs() < 1e-9);
        assert!((rooted.depth_from_root(c) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn midpoint_rooting_is_idempotent() {
        for newick in [
            "(A:1,(B:1,(C:1,D:1):1):1);",
            "((A:0.3,B:0.2):0.1,(C:0.9,(D:0.4,E:0.1):0.2):0.05,F:1.7);",
            "(A:1,B:5);",
            "(A:2,B:2,C:2);",
        ] {
            let once = parse(newick).midpoint_rooted();
            let twice = once.midpoint_rooted();
            assert_eq!(root_split(&once), root_split(&twice), "{newick}");
            for (first, second) in once.depths().iter().zip(twice.depths()) {
                assert!((first - second).abs() < 1e-9, "{newick}");
            }
        }
    }

    #[test]
    fn balanced_root_is_left_alone() {
        let tree = parse("((A:1,B:1):1,(C:1,D:1):1);");
        assert!(tree.is_midpoint_rooted());
        assert_eq!(tree.midpoint_rooted(), tree);
    }

    #[test]
    fn multifurcating_midpoint_gets_zero_length_branch() {
        let tree = parse("(A:2,B:2,C:2);");
        let rooted = tree.midpoint_rooted();
        assert_eq!(rooted.root().children.len(), 2);
        assert!(rooted.is_midpoint_rooted());
        assert_eq!(rooted.leaf_count(), 3);
    }

    #[test]
    fn parent_links_stay_consistent() {
        let tree = parse("((A:0.3,B:0.2)90:0.1,(C:0.9,(D:0.4,E:0.1)75:0.2):0.05,F:1.7);");
        let rooted = tree.midpoint_rooted();
        for node in &rooted.nodes {
            match node.parent {
                Some(parent) => assert!(rooted.node(parent).children.contains(&node.id)),
                None => assert_eq!(node.id, rooted.root_id()),
            }
        }
        assert_eq!(rooted.leaf_count(), 6);
    }

    #[test]
    fn single_child_root_does_not_become_a_tip() {
        let tree = parse("((A:1,B:5):1);");
        let rooted = tree.midpoint_rooted();
        assert_eq!(rooted.leaf_count(), 2);
        assert_eq!(tip_names(&rooted), vec!["A", "B"]);
        assert!(rooted.is_midpoint_rooted());

        let nested = parse("(((A:1,(B:2,C:4):1):2));").midpoint_rooted();
        assert_eq!(nested.leaf_count(), 3);
        assert!(nested.is_midpoint_rooted());
    }

    #[test]
    fn single_tip_and_zero_length_trees_are_untouched() {
        let single = parse("A;");
        assert_eq!(single.midpoint_rooted(), single);

        let flat = parse("(A,B,C);");
        assert_eq!(flat.midpoint_rooted(), flat);
    }
}

//! Generic merkle tree over any hashable, comparable payload.
//!
//! Nodes live in a flat arena (`Vec<Node>`) addressed by index; each node
//! stores its parent's index rather than a back-reference, which sidesteps
//! the cyclic parent/child ownership a pointer-based tree would need.

use shared::{BlockchainError, Hash256, Result};

/// Capability a merkle leaf payload must expose. `PartialEq` alone isn't
/// enough for `verify_data` — it re-derives hashes from the payload itself,
/// so the hash function must be explicit and stable.
pub trait MerkleHashable {
    fn merkle_hash(&self) -> Hash256;
}

#[derive(Debug, Clone, Copy)]
struct Node {
    hash: Hash256,
    parent: Option<usize>,
}

/// Sibling position recorded at each level of a membership proof.
/// `Left` means the sibling hash goes on the left when recombining.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

#[derive(Debug, Clone)]
pub struct ProofStep {
    pub sibling: Hash256,
    pub side: Side,
}

#[derive(Debug, Clone)]
pub struct Proof {
    pub steps: Vec<ProofStep>,
}

impl Proof {
    /// Replays the proof starting from `leaf_hash`, returning the
    /// reconstructed root. Doesn't require the tree at all — this is what a
    /// third party runs to verify a proof handed to them out-of-band.
    #[must_use]
    pub fn reconstruct_root(&self, leaf_hash: Hash256) -> Hash256 {
        let mut current = leaf_hash;
        for step in &self.steps {
            current = combine(current, step.sibling, step.side);
        }
        current
    }
}

fn combine(hash: Hash256, sibling: Hash256, sibling_side: Side) -> Hash256 {
    let mut data = Vec::with_capacity(64);
    match sibling_side {
        Side::Left => {
            data.extend_from_slice(sibling.as_bytes());
            data.extend_from_slice(hash.as_bytes());
        }
        Side::Right => {
            data.extend_from_slice(hash.as_bytes());
            data.extend_from_slice(sibling.as_bytes());
        }
    }
    Hash256::keccak256(&data)
}

/// A built merkle tree. `T` is kept alongside the arena so `values()` and
/// `verify_data()` can re-derive hashes rather than trust stored ones.
#[derive(Debug, Clone)]
pub struct MerkleTree<T> {
    leaves: Vec<T>,
    /// Number of real (non-duplicate) leaves, i.e. `leaves.len()` before the
    /// odd-count padding described in step 3 of the build algorithm.
    real_leaf_count: usize,
    nodes: Vec<Node>,
    /// `(left, right)` child indices for each internal node, indexed by the
    /// parent's own index. `None` for leaves.
    children: Vec<Option<(usize, usize)>>,
    /// Index of each leaf (including the padding duplicate) within `nodes`.
    leaf_indices: Vec<usize>,
    root_index: usize,
}

impl<T: MerkleHashable + Clone> MerkleTree<T> {
    /// Builds a tree over `values`. Rejects empty input. Odd leaf counts are
    /// padded by duplicating the last leaf (Bitcoin-style); `values()` trims
    /// this back off so callers never observe the duplicate.
    ///
    /// # Errors
    ///
    /// Returns an error if `values` is empty.
    pub fn build(values: &[T]) -> Result<Self> {
        if values.is_empty() {
            return Err(BlockchainError::InvalidInput(
                "merkle tree requires at least one payload".to_string(),
            ));
        }

        let real_leaf_count = values.len();
        let mut nodes = Vec::new();
        let mut children: Vec<Option<(usize, usize)>> = Vec::new();
        let mut current_level: Vec<usize> = Vec::new();

        for value in values {
            let idx = nodes.len();
            nodes.push(Node {
                hash: value.merkle_hash(),
                parent: None,
            });
            children.push(None);
            current_level.push(idx);
        }

        if current_level.len() % 2 == 1 {
            let last = *current_level.last().unwrap();
            let idx = nodes.len();
            nodes.push(Node {
                hash: nodes[last].hash,
                parent: None,
            });
            children.push(None);
            current_level.push(idx);
        }

        let leaf_indices = current_level.clone();

        while current_level.len() > 1 {
            let mut next_level = Vec::with_capacity(current_level.len().div_ceil(2));
            let mut i = 0;
            while i < current_level.len() {
                let left = current_level[i];
                let right = if i + 1 < current_level.len() {
                    current_level[i + 1]
                } else {
                    current_level[i]
                };
                let parent_hash = combine(nodes[left].hash, nodes[right].hash, Side::Right);
                let parent_idx = nodes.len();
                nodes.push(Node {
                    hash: parent_hash,
                    parent: None,
                });
                children.push(Some((left, right)));
                nodes[left].parent = Some(parent_idx);
                nodes[right].parent = Some(parent_idx);
                next_level.push(parent_idx);
                i += 2;
            }
            current_level = next_level;
        }

        let root_index = current_level[0];

        Ok(Self {
            leaves: values.to_vec(),
            real_leaf_count,
            nodes,
            children,
            leaf_indices,
            root_index,
        })
    }

    #[must_use]
    pub fn root(&self) -> Hash256 {
        self.nodes[self.root_index].hash
    }

    /// The original payload list, with the odd-count padding duplicate
    /// trimmed back off.
    #[must_use]
    pub fn values(&self) -> &[T] {
        &self.leaves[..self.real_leaf_count]
    }

    /// Builds a membership proof for the leaf at `index` (into the
    /// original, un-padded payload list).
    ///
    /// # Errors
    ///
    /// Returns an error if `index` is out of range.
    pub fn proof(&self, index: usize) -> Result<Proof> {
        if index >= self.real_leaf_count {
            return Err(BlockchainError::InvalidInput(format!(
                "leaf index {index} out of range"
            )));
        }

        let mut steps = Vec::new();
        let mut node_idx = self.leaf_indices[index];

        while let Some(parent_idx) = self.nodes[node_idx].parent {
            let (left, right) = self.children[parent_idx]
                .expect("every parent index was pushed with its children recorded");
            let (sibling_idx, side) = if node_idx == left {
                (right, Side::Right)
            } else {
                (left, Side::Left)
            };
            steps.push(ProofStep {
                sibling: self.nodes[sibling_idx].hash,
                side,
            });
            node_idx = parent_idx;
        }

        Ok(Proof { steps })
    }

    /// Recomputes every intermediate hash from the leaves up and compares
    /// against the stored root.
    #[must_use]
    pub fn verify(&self) -> bool {
        match Self::build(&self.leaves) {
            Ok(rebuilt) => rebuilt.root() == self.root(),
            Err(_) => false,
        }
    }

    /// Locates `value` among the tree's leaves and walks up to the root,
    /// recomputing each sibling's hash from its own children rather than
    /// trusting the stored parent hash — this catches tampering anywhere
    /// along the path, not just at the leaf.
    #[must_use]
    pub fn verify_data(&self, value: &T) -> bool
    where
        T: PartialEq,
    {
        let Some(index) = self.values().iter().position(|v| v == value) else {
            return false;
        };

        let Ok(proof) = self.proof(index) else {
            return false;
        };

        proof.reconstruct_root(value.merkle_hash()) == self.root()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Leaf(Vec<u8>);

    impl MerkleHashable for Leaf {
        fn merkle_hash(&self) -> Hash256 {
            Hash256::keccak256(&self.0)
        }
    }

    fn leaves(n: usize) -> Vec<Leaf> {
        (0..n).map(|i| Leaf(vec![i as u8])).collect()
    }

    #[test]
    fn rejects_empty_input() {
        let empty: Vec<Leaf> = vec![];
        assert!(MerkleTree::build(&empty).is_err());
    }

    #[test]
    fn values_trims_the_odd_count_duplicate() {
        let payloads = leaves(5);
        let tree = MerkleTree::build(&payloads).unwrap();
        assert_eq!(tree.values(), payloads.as_slice());
    }

    #[test]
    fn proof_verifies_for_every_leaf() {
        let payloads = leaves(7);
        let tree = MerkleTree::build(&payloads).unwrap();

        for (i, leaf) in payloads.iter().enumerate() {
            let proof = tree.proof(i).unwrap();
            let reconstructed = proof.reconstruct_root(leaf.merkle_hash());
            assert_eq!(reconstructed, tree.root());
        }
    }

    #[test]
    fn single_leaf_proof_has_no_steps_and_root_is_its_hash() {
        let payloads = leaves(1);
        let tree = MerkleTree::build(&payloads).unwrap();
        let proof = tree.proof(0).unwrap();
        assert!(proof.steps.is_empty());
        assert_eq!(tree.root(), payloads[0].merkle_hash());
    }

    #[test]
    fn verify_detects_no_corruption_on_a_freshly_built_tree() {
        let payloads = leaves(4);
        let tree = MerkleTree::build(&payloads).unwrap();
        assert!(tree.verify());
    }

    #[test]
    fn verify_data_locates_and_confirms_membership() {
        let payloads = leaves(6);
        let tree = MerkleTree::build(&payloads).unwrap();
        assert!(tree.verify_data(&payloads[3]));
        assert!(!tree.verify_data(&Leaf(vec![99])));
    }

    #[test]
    fn five_payload_proof_of_third_has_three_siblings() {
        let payloads = leaves(5);
        let tree = MerkleTree::build(&payloads).unwrap();
        let proof = tree.proof(2).unwrap();
        assert_eq!(proof.steps.len(), 3);
    }
}

//! Merkle tree construction and inclusion proofs.

use crate::hash::sha256d;

/// One step of an inclusion proof: the sibling hash, and which side it sits
/// on relative to the node being proven. `Root` marks the final element,
/// whose hash is the merkle root itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathSide {
    SelfNode,
    Left,
    Right,
    Root,
}

pub type ProofStep = (String, PathSide);

/// Compute the merkle root of a list of transaction ids. Returns the
/// sha256d of the empty string for an empty block.
pub fn merkle_root(leaves: &[String]) -> String {
    if leaves.is_empty() {
        return sha256d(b"");
    }

    let mut level = leaves.to_vec();
    while level.len() > 1 {
        level = build_level(&level);
    }
    level.into_iter().next().unwrap()
}

/// Pairwise-hashes `level` into its parent. An unpaired trailing element
/// carries forward unhashed rather than being duplicated and hashed with
/// itself.
fn build_level(level: &[String]) -> Vec<String> {
    let mut next = Vec::with_capacity((level.len() + 1) / 2);
    let mut chunks = level.chunks_exact(2);
    for pair in &mut chunks {
        next.push(pair_hash(&pair[0], &pair[1]));
    }
    if let [last] = chunks.remainder() {
        next.push(last.clone());
    }
    next
}

fn pair_hash(left: &str, right: &str) -> String {
    sha256d(format!("{}{}", left, right).as_bytes())
}

/// Build the inclusion proof path for `leaf` within `leaves`, returning the
/// sequence of (hash, side) steps an auditor would combine with the leaf to
/// recompute the root. Returns `None` if `leaf` isn't present.
pub fn inclusion_path(leaves: &[String], leaf: &str) -> Option<Vec<ProofStep>> {
    let mut idx = leaves.iter().position(|l| l == leaf)?;
    let mut path = vec![(leaf.to_string(), PathSide::SelfNode)];
    let mut level = leaves.to_vec();

    while level.len() > 1 {
        let len = level.len();
        if len % 2 == 1 && idx == len - 1 {
            // Unpaired trailing element: it carries forward unhashed, so
            // there's no sibling step to record at this level.
            idx = len / 2;
        } else {
            let is_left = idx % 2 == 0;
            let sibling_idx = if is_left { idx + 1 } else { idx - 1 };
            let sibling = level[sibling_idx].clone();

            let side = if is_left {
                PathSide::Right
            } else {
                PathSide::Left
            };
            path.push((sibling, side));
            idx /= 2;
        }

        level = build_level(&level);
    }

    if let Some(last) = level.into_iter().next() {
        path.push((last, PathSide::Root));
    }

    Some(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_leaf_root_is_itself() {
        let leaves = vec!["a".to_string()];
        assert_eq!(merkle_root(&leaves), "a");
    }

    #[test]
    fn two_leaves_hash_together() {
        let leaves = vec!["a".to_string(), "b".to_string()];
        let expected = pair_hash("a", "b");
        assert_eq!(merkle_root(&leaves), expected);
    }

    #[test]
    fn odd_count_carries_last_leaf_forward_unhashed() {
        let three = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let expected = pair_hash(&pair_hash("a", "b"), "c");
        assert_eq!(merkle_root(&three), expected);
    }

    #[test]
    fn inclusion_path_ends_in_root() {
        let leaves = vec![
            "a".to_string(),
            "b".to_string(),
            "c".to_string(),
            "d".to_string(),
        ];
        let path = inclusion_path(&leaves, "c").unwrap();
        assert_eq!(path.first().unwrap().1, PathSide::SelfNode);
        assert_eq!(path.last().unwrap().1, PathSide::Root);
        assert_eq!(path.last().unwrap().0, merkle_root(&leaves));
    }

    #[test]
    fn inclusion_path_handles_odd_leaf_count() {
        let leaves = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let path = inclusion_path(&leaves, "c").unwrap();
        assert_eq!(path.last().unwrap().0, merkle_root(&leaves));
    }

    #[test]
    fn missing_leaf_returns_none() {
        let leaves = vec!["a".to_string(), "b".to_string()];
        assert!(inclusion_path(&leaves, "nonexistent").is_none());
    }
}

//! Merkle root over ledger tags.
//!
//! Leaves and interior nodes are hashed with distinct one-byte prefixes so a
//! leaf can never be confused with a node. An odd node at the end of a level
//! is promoted unchanged.

use sha3::{Digest, Sha3_256};

use super::entry::Digest32;

const LEAF_PREFIX: u8 = 0x00;
const NODE_PREFIX: u8 = 0x01;

fn sha3(parts: &[&[u8]]) -> Digest32 {
    let mut hasher = Sha3_256::new();
    for part in parts {
        hasher.update(part);
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    out
}

fn leaf(tag: &Digest32) -> Digest32 {
    sha3(&[&[LEAF_PREFIX], tag])
}

fn node(left: &Digest32, right: &Digest32) -> Digest32 {
    sha3(&[&[NODE_PREFIX], left, right])
}

/// Root over `tags` in order, or `None` for an empty batch.
pub fn merkle_root(tags: &[Digest32]) -> Option<Digest32> {
    let mut level: Vec<Digest32> = tags.iter().map(leaf).collect();
    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| match pair {
                [left, right] => node(left, right),
                // Odd node promoted directly
                _ => pair[0],
            })
            .collect();
    }
    level.pop()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty() {
        assert_eq!(merkle_root(&[]), None);
    }

    #[test]
    fn test_single_leaf() {
        let tag = [3u8; 32];
        assert_eq!(merkle_root(&[tag]), Some(leaf(&tag)));
        assert_ne!(merkle_root(&[tag]), Some(tag));
    }

    #[test]
    fn test_odd_node_promoted() {
        let tags = [[1u8; 32], [2u8; 32], [3u8; 32]];
        let expected = node(&node(&leaf(&tags[0]), &leaf(&tags[1])), &leaf(&tags[2]));
        assert_eq!(merkle_root(&tags), Some(expected));
    }

    #[test]
    fn test_order_matters() {
        let a = [[1u8; 32], [2u8; 32]];
        let b = [[2u8; 32], [1u8; 32]];
        assert_ne!(merkle_root(&a), merkle_root(&b));
    }
}

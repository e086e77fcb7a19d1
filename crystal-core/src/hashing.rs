use sha2::{Digest, Sha256};

/// SHA-256 digest of `data`.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    let mut h = Sha256::new();
    h.update(data);
    h.finalize().into()
}

pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256(data))
}

/// Merkle tree over SHA-256 leaf hashes with a configurable fanout.
///
/// Internal nodes hash the concatenation of up to `fanout` child hashes; the
/// last group at a level may be short. The empty tree's root is the hash of
/// the empty string.
pub struct MerkleTree {
    fanout: usize,
    /// levels[0] = leaf hashes, last level = [root].
    levels: Vec<Vec<[u8; 32]>>,
}

impl MerkleTree {
    pub const DEFAULT_FANOUT: usize = 2;

    pub fn build<L: AsRef<[u8]>>(leaves: &[L], fanout: usize) -> Self {
        assert!(fanout >= 2, "fanout must be at least 2");
        if leaves.is_empty() {
            return Self { fanout, levels: Vec::new() };
        }
        let mut levels = vec![leaves.iter().map(|l| sha256(l.as_ref())).collect::<Vec<_>>()];
        while levels.last().unwrap().len() > 1 {
            let prev = levels.last().unwrap();
            let mut next = Vec::with_capacity(prev.len().div_ceil(fanout));
            for group in prev.chunks(fanout) {
                let mut cat = Vec::with_capacity(group.len() * 32);
                for h in group {
                    cat.extend_from_slice(h);
                }
                next.push(sha256(&cat));
            }
            levels.push(next);
        }
        Self { fanout, levels }
    }

    pub fn leaf_count(&self) -> usize {
        self.levels.first().map_or(0, |l| l.len())
    }

    pub fn root(&self) -> [u8; 32] {
        match self.levels.last() {
            Some(top) => top[0],
            None => sha256(&[]),
        }
    }

    pub fn root_hex(&self) -> String {
        hex::encode(self.root())
    }

    /// Sibling hashes from leaf `index` up to the root, excluding the running
    /// node itself. Siblings missing from a short group are simply absent.
    pub fn proof(&self, index: usize) -> Option<Vec<[u8; 32]>> {
        if index >= self.leaf_count() {
            return None;
        }
        let mut proof = Vec::new();
        let mut idx = index;
        for level in &self.levels[..self.levels.len() - 1] {
            let group_start = (idx / self.fanout) * self.fanout;
            let group_end = (group_start + self.fanout).min(level.len());
            for i in group_start..group_end {
                if i != idx {
                    proof.push(level[i]);
                }
            }
            idx /= self.fanout;
        }
        Some(proof)
    }
}

/// Recompute the root from `leaf` and its proof. Level group sizes are
/// derived from `leaf_count`, so short groups consume exactly the siblings
/// that exist.
pub fn verify_proof(
    leaf: &[u8],
    index: usize,
    proof: &[[u8; 32]],
    root: [u8; 32],
    leaf_count: usize,
    fanout: usize,
) -> bool {
    if index >= leaf_count || fanout < 2 {
        return false;
    }
    let mut hash = sha256(leaf);
    let mut idx = index;
    let mut level_len = leaf_count;
    let mut used = 0usize;
    while level_len > 1 {
        let group_start = (idx / fanout) * fanout;
        let group_end = (group_start + fanout).min(level_len);
        let mut cat = Vec::with_capacity((group_end - group_start) * 32);
        for i in group_start..group_end {
            if i == idx {
                cat.extend_from_slice(&hash);
            } else {
                match proof.get(used) {
                    Some(sib) => cat.extend_from_slice(sib),
                    None => return false,
                }
                used += 1;
            }
        }
        hash = sha256(&cat);
        idx /= fanout;
        level_len = level_len.div_ceil(fanout);
    }
    used == proof.len() && hash == root
}

use crystal_core::hashing::{sha256, sha256_hex, verify_proof, MerkleTree};

fn leaves(n: usize) -> Vec<Vec<u8>> {
    (0..n).map(|i| format!("shard-{i}").into_bytes()).collect()
}

#[test]
fn empty_tree_root_is_hash_of_nothing() {
    let tree = MerkleTree::build(&Vec::<Vec<u8>>::new(), 2);
    assert_eq!(tree.root(), sha256(&[]));
}

#[test]
fn single_leaf_root_is_leaf_hash() {
    let tree = MerkleTree::build(&[b"only".to_vec()], 2);
    assert_eq!(tree.root(), sha256(b"only"));
    assert_eq!(tree.proof(0).unwrap(), Vec::<[u8; 32]>::new());
    assert!(verify_proof(b"only", 0, &[], tree.root(), 1, 2));
}

#[test]
fn every_proof_verifies_for_odd_and_even_counts() {
    for fanout in [2usize, 3] {
        for count in 1..=9 {
            let data = leaves(count);
            let tree = MerkleTree::build(&data, fanout);
            for (i, leaf) in data.iter().enumerate() {
                let proof = tree.proof(i).unwrap();
                assert!(
                    verify_proof(leaf, i, &proof, tree.root(), count, fanout),
                    "count {count} fanout {fanout} index {i}"
                );
            }
        }
    }
}

#[test]
fn tampered_leaf_or_proof_fails() {
    let data = leaves(7);
    let tree = MerkleTree::build(&data, 2);
    let proof = tree.proof(3).unwrap();

    let mut bad_leaf = data[3].clone();
    bad_leaf[0] ^= 1;
    assert!(!verify_proof(&bad_leaf, 3, &proof, tree.root(), 7, 2));

    for (i, _) in proof.iter().enumerate() {
        let mut bad = proof.clone();
        bad[i][0] ^= 1;
        assert!(!verify_proof(&data[3], 3, &bad, tree.root(), 7, 2), "proof byte {i}");
    }

    // Wrong index and wrong count both fail.
    assert!(!verify_proof(&data[3], 4, &proof, tree.root(), 7, 2));
    assert!(!verify_proof(&data[3], 3, &proof, tree.root(), 4, 2));
}

#[test]
fn root_is_sensitive_to_leaf_order() {
    let a = MerkleTree::build(&leaves(4), 2);
    let mut swapped = leaves(4);
    swapped.swap(0, 1);
    let b = MerkleTree::build(&swapped, 2);
    assert_ne!(a.root_hex(), b.root_hex());
    assert_eq!(a.root_hex().len(), 64);
    let _ = sha256_hex(b"api smoke");
}

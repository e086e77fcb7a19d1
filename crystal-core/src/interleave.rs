use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

/// Named PRNG family recorded in the manifest. Two independent decoders must
/// reproduce the same permutation from the seed alone.
pub const PRNG_FAMILY: &str = "chacha20";

/// Fisher-Yates permutation of `[0, len)` over a ChaCha20 stream seeded from
/// `seed`.
pub fn permutation(seed: u64, len: usize) -> Vec<u32> {
    assert!(len <= u32::MAX as usize, "permutation domain exceeds u32");
    let mut perm: Vec<u32> = (0..len as u32).collect();
    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    for i in (1..len).rev() {
        let j = rng.gen_range(0..=i);
        perm.swap(i, j);
    }
    perm
}

/// Gather: `out[i] = data[perm[i]]`.
pub fn interleave<T: Copy>(data: &[T], perm: &[u32]) -> Vec<T> {
    assert_eq!(data.len(), perm.len(), "permutation length mismatch");
    perm.iter().map(|&p| data[p as usize]).collect()
}

/// Scatter inverse of `interleave`: `out[perm[i]] = data[i]`.
pub fn deinterleave<T: Copy + Default>(data: &[T], perm: &[u32]) -> Vec<T> {
    assert_eq!(data.len(), perm.len(), "permutation length mismatch");
    let mut out = vec![T::default(); data.len()];
    for (i, &p) in perm.iter().enumerate() {
        out[p as usize] = data[i];
    }
    out
}

/// Convolutional row-delay interleaving for streaming contexts. The input is
/// zero-padded to a `depth x cols` matrix and row `i` is rotated right by
/// `i * (cols / depth)`. Returns the padded stream; the caller trims after
/// `conv_deinterleave`. Not used by the default archive pipeline.
pub fn conv_interleave<T: Copy + Default>(data: &[T], depth: usize) -> Vec<T> {
    if depth <= 1 || data.is_empty() {
        return data.to_vec();
    }
    let cols = data.len().div_ceil(depth);
    let mut padded = vec![T::default(); depth * cols];
    padded[..data.len()].copy_from_slice(data);
    for r in 0..depth {
        let delay = (r * (cols / depth)) % cols;
        padded[r * cols..(r + 1) * cols].rotate_right(delay);
    }
    padded
}

/// Exact inverse of `conv_interleave` on the padded stream.
pub fn conv_deinterleave<T: Copy + Default>(data: &[T], depth: usize) -> Vec<T> {
    if depth <= 1 || data.is_empty() {
        return data.to_vec();
    }
    assert_eq!(data.len() % depth, 0, "expected a depth-padded stream");
    let cols = data.len() / depth;
    let mut out = data.to_vec();
    for r in 0..depth {
        let delay = (r * (cols / depth)) % cols;
        out[r * cols..(r + 1) * cols].rotate_left(delay);
    }
    out
}

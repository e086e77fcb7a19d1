use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use std::collections::HashSet;

pub const DEFAULT_BLOCK_LEN: usize = 1024;
pub const DEFAULT_MAX_ITER: usize = 50;

const DATA_COL_WEIGHT: usize = 3;
const MINSUM_SCALE: f64 = 0.75;
const TANH_CLAMP: f64 = 0.9999;

/// Unpack bytes into bits, most significant bit first.
pub fn bytes_to_bits(bytes: &[u8]) -> Vec<u8> {
    let mut bits = Vec::with_capacity(bytes.len() * 8);
    for &b in bytes {
        for shift in (0..8).rev() {
            bits.push((b >> shift) & 1);
        }
    }
    bits
}

/// Pack bits (MSB first) into bytes; a trailing partial byte is zero-filled.
pub fn bits_to_bytes(bits: &[u8]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(bits.len().div_ceil(8));
    for chunk in bits.chunks(8) {
        let mut b = 0u8;
        for (i, &bit) in chunk.iter().enumerate() {
            b |= (bit & 1) << (7 - i);
        }
        bytes.push(b);
    }
    bytes
}

/// Low-density parity-check code with a systematic parity part.
///
/// `H = [A | I_m]`: each data column of `A` carries `DATA_COL_WEIGHT` ones
/// placed by a seeded ChaCha20 stream, and the parity part is the identity,
/// so the XOR-of-row encoding satisfies `H * c = 0` exactly. Column row-pairs
/// are kept unique while the budget allows, which removes 4-cycles from the
/// Tanner graph. The matrix is regenerated from `(n, k, seed)` on both sides
/// and never persisted.
pub struct LdpcCode {
    pub n: usize,
    pub k: usize,
    /// Check rows for each data column, ascending.
    col_rows: Vec<Vec<usize>>,
    /// Variable columns for each check row; the parity column `k + row` is
    /// always last.
    row_cols: Vec<Vec<usize>>,
}

impl LdpcCode {
    pub fn new(n: usize, k: usize, seed: u64) -> Self {
        assert!(k > 0 && k < n, "information length must be in 1..n");
        let m = n - k;
        let weight = DATA_COL_WEIGHT.min(m);
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        let mut used_pairs: HashSet<(usize, usize)> = HashSet::new();
        let mut col_rows = Vec::with_capacity(k);
        let mut row_cols: Vec<Vec<usize>> = vec![Vec::new(); m];

        for col in 0..k {
            let mut rows = sample_rows(&mut rng, m, weight);
            // Bounded resampling keeps row-pairs unique (girth >= 6) until
            // the pair budget runs out.
            for _ in 0..100 {
                if pairs_of(&rows).iter().all(|p| !used_pairs.contains(p)) {
                    break;
                }
                rows = sample_rows(&mut rng, m, weight);
            }
            for p in pairs_of(&rows) {
                used_pairs.insert(p);
            }
            for &r in &rows {
                row_cols[r].push(col);
            }
            col_rows.push(rows);
        }
        for (row, cols) in row_cols.iter_mut().enumerate() {
            cols.push(k + row);
        }
        Self { n, k, col_rows, row_cols }
    }

    pub fn parity_len(&self) -> usize {
        self.n - self.k
    }

    pub fn rate(&self) -> f64 {
        self.k as f64 / self.n as f64
    }

    /// Systematic encode: information bits followed by one parity bit per
    /// check row.
    pub fn encode(&self, info: &[u8]) -> Vec<u8> {
        assert_eq!(info.len(), self.k, "expected {} information bits", self.k);
        let mut codeword = Vec::with_capacity(self.n);
        codeword.extend_from_slice(info);
        for cols in &self.row_cols {
            let mut p = 0u8;
            for &c in &cols[..cols.len() - 1] {
                p ^= info[c] & 1;
            }
            codeword.push(p);
        }
        codeword
    }

    fn syndrome(&self, codeword: &[u8]) -> Vec<u8> {
        self.row_cols
            .iter()
            .map(|cols| cols.iter().fold(0u8, |acc, &c| acc ^ (codeword[c] & 1)))
            .collect()
    }

    fn col_degree(&self, col: usize) -> usize {
        if col < self.k {
            self.col_rows[col].len()
        } else {
            1
        }
    }

    /// Bit-flipping decoder. Each iteration flips the bit with the most
    /// unsatisfied checks; ties break toward the bit failing the largest
    /// fraction of its checks, then the smallest index. The fraction rule
    /// lets a flipped parity bit (degree 1) win over the data bits sharing
    /// its single check, so single-bit errors correct in both halves.
    pub fn decode_hard(&self, received: &[u8], max_iter: usize) -> (Vec<u8>, bool) {
        assert_eq!(received.len(), self.n, "expected {} codeword bits", self.n);
        let mut c: Vec<u8> = received.iter().map(|&b| b & 1).collect();
        for _ in 0..max_iter {
            let s = self.syndrome(&c);
            if s.iter().all(|&b| b == 0) {
                c.truncate(self.k);
                return (c, true);
            }
            let mut best: Option<(usize, f64, usize)> = None;
            for col in 0..self.n {
                let unsat = if col < self.k {
                    self.col_rows[col].iter().filter(|&&r| s[r] == 1).count()
                } else {
                    usize::from(s[col - self.k] == 1)
                };
                if unsat == 0 {
                    continue;
                }
                let frac = unsat as f64 / self.col_degree(col) as f64;
                let better = match best {
                    None => true,
                    Some((bu, bf, _)) => unsat > bu || (unsat == bu && frac > bf),
                };
                if better {
                    best = Some((unsat, frac, col));
                }
            }
            match best {
                Some((_, _, col)) => c[col] ^= 1,
                None => break,
            }
        }
        let ok = self.syndrome(&c).iter().all(|&b| b == 0);
        c.truncate(self.k);
        (c, ok)
    }

    /// Soft-decision decoder: min-sum (scaled by 0.75) or sum-product on the
    /// tanh rule. Input LLRs use positive = bit 0. Always returns best-effort
    /// bits and posterior LLRs; `success` reports whether the syndrome
    /// cleared.
    pub fn decode_soft(
        &self,
        llr: &[f64],
        max_iter: usize,
        min_sum: bool,
    ) -> (Vec<u8>, Vec<f64>, bool) {
        assert_eq!(llr.len(), self.n, "expected {} channel LLRs", self.n);
        let mut total = llr.to_vec();
        let mut bits: Vec<u8> = total.iter().map(|&l| u8::from(l < 0.0)).collect();
        for _ in 0..max_iter {
            let mut extrinsic = vec![0.0f64; self.n];
            for cols in &self.row_cols {
                if min_sum {
                    for (vi, &v) in cols.iter().enumerate() {
                        let mut sign = 1.0f64;
                        let mut min_mag = f64::INFINITY;
                        for (oi, &o) in cols.iter().enumerate() {
                            if oi == vi {
                                continue;
                            }
                            if total[o] < 0.0 {
                                sign = -sign;
                            }
                            min_mag = min_mag.min(total[o].abs());
                        }
                        if min_mag.is_finite() {
                            extrinsic[v] += MINSUM_SCALE * sign * min_mag;
                        }
                    }
                } else {
                    for (vi, &v) in cols.iter().enumerate() {
                        let mut prod = 1.0f64;
                        for (oi, &o) in cols.iter().enumerate() {
                            if oi == vi {
                                continue;
                            }
                            prod *= (total[o] / 2.0).tanh();
                        }
                        let prod = prod.clamp(-TANH_CLAMP, TANH_CLAMP);
                        extrinsic[v] += 2.0 * prod.atanh();
                    }
                }
            }
            for v in 0..self.n {
                total[v] = llr[v] + extrinsic[v];
            }
            bits = total.iter().map(|&l| u8::from(l < 0.0)).collect();
            if self.syndrome(&bits).iter().all(|&b| b == 0) {
                bits.truncate(self.k);
                return (bits, total, true);
            }
        }
        bits.truncate(self.k);
        (bits, total, false)
    }
}

fn sample_rows(rng: &mut ChaCha20Rng, m: usize, weight: usize) -> Vec<usize> {
    let mut rows = Vec::with_capacity(weight);
    while rows.len() < weight {
        let r = rng.gen_range(0..m);
        if !rows.contains(&r) {
            rows.push(r);
        }
    }
    rows.sort_unstable();
    rows
}

fn pairs_of(rows: &[usize]) -> Vec<(usize, usize)> {
    let mut pairs = Vec::new();
    for i in 0..rows.len() {
        for j in i + 1..rows.len() {
            pairs.push((rows[i], rows[j]));
        }
    }
    pairs
}

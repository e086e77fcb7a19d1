use crate::error::{ArchiveError, Result};
use reed_solomon_erasure::galois_8::ReedSolomon;
use serde::{Deserialize, Serialize};

pub const DEFAULT_SHARD_SIZE: usize = 4096;
pub const DEFAULT_STRIPE_K: usize = 64;

/// GF(2^8) arithmetic, primitive polynomial 0x11D, generator alpha = 2.
struct Gf {
    exp: [u8; 512],
    log: [u8; 256],
}

impl Gf {
    fn new() -> Self {
        let mut exp = [0u8; 512];
        let mut log = [0u8; 256];
        let mut x: u16 = 1;
        for i in 0..255 {
            exp[i] = x as u8;
            log[x as usize] = i as u8;
            x <<= 1;
            if x & 0x100 != 0 {
                x ^= 0x11d;
            }
        }
        for i in 255..512 {
            exp[i] = exp[i - 255];
        }
        Self { exp, log }
    }

    #[inline]
    fn mul(&self, a: u8, b: u8) -> u8 {
        if a == 0 || b == 0 {
            0
        } else {
            self.exp[self.log[a as usize] as usize + self.log[b as usize] as usize]
        }
    }

    #[inline]
    fn div(&self, a: u8, b: u8) -> u8 {
        debug_assert!(b != 0);
        if a == 0 {
            0
        } else {
            self.exp[self.log[a as usize] as usize + 255 - self.log[b as usize] as usize]
        }
    }

    /// alpha^i for any non-negative exponent.
    #[inline]
    fn pow_alpha(&self, i: usize) -> u8 {
        self.exp[i % 255]
    }

    /// Evaluate a polynomial stored highest-degree-first.
    fn eval_high(&self, p: &[u8], x: u8) -> u8 {
        let mut acc = 0u8;
        for &c in p {
            acc = self.mul(acc, x) ^ c;
        }
        acc
    }

    /// Evaluate a polynomial stored lowest-degree-first.
    fn eval_low(&self, p: &[u8], x: u8) -> u8 {
        let mut acc = 0u8;
        for &c in p.iter().rev() {
            acc = self.mul(acc, x) ^ c;
        }
        acc
    }

    /// Product of two lowest-degree-first polynomials.
    fn mul_low(&self, a: &[u8], b: &[u8]) -> Vec<u8> {
        let mut out = vec![0u8; a.len() + b.len() - 1];
        for (i, &ai) in a.iter().enumerate() {
            if ai == 0 {
                continue;
            }
            for (j, &bj) in b.iter().enumerate() {
                out[i + j] ^= self.mul(ai, bj);
            }
        }
        out
    }
}

fn trim_low(mut p: Vec<u8>) -> Vec<u8> {
    while p.len() > 1 && *p.last().unwrap() == 0 {
        p.pop();
    }
    p
}

/// Systematic Reed-Solomon block codec over GF(2^8).
///
/// The default RS(255, 223) corrects up to 16 byte errors at unknown
/// positions per block, or up to 32 erasures at known positions. Input is
/// processed in zero-padded `k`-byte chunks; each encoded block is `n` bytes.
pub struct BlockRs {
    pub n: usize,
    pub k: usize,
    gf: Gf,
    /// Generator polynomial, highest-degree-first, monic, degree n-k.
    gen: Vec<u8>,
}

impl BlockRs {
    pub fn new(n: usize, k: usize) -> Result<Self> {
        if n > 255 || k == 0 || k >= n {
            return Err(ArchiveError::UncorrectableArchive {
                stage: "reed-solomon",
                detail: format!("invalid block parameters n={n} k={k}"),
            });
        }
        let gf = Gf::new();
        let mut gen = vec![1u8];
        for i in 0..(n - k) {
            // gen *= (x + alpha^i)
            let root = gf.pow_alpha(i);
            let mut next = vec![0u8; gen.len() + 1];
            for (j, &c) in gen.iter().enumerate() {
                next[j] ^= c;
                next[j + 1] ^= gf.mul(c, root);
            }
            gen = next;
        }
        Ok(Self { n, k, gf, gen })
    }

    pub fn rs255_223() -> Self {
        Self::new(255, 223).expect("valid standard parameters")
    }

    fn nsym(&self) -> usize {
        self.n - self.k
    }

    /// Encode `data` in `k`-byte chunks (last chunk zero-padded); each chunk
    /// becomes an `n`-byte systematic block.
    pub fn encode(&self, data: &[u8]) -> Vec<u8> {
        let nsym = self.nsym();
        let chunks = data.len().div_ceil(self.k).max(1);
        let mut out = Vec::with_capacity(chunks * self.n);
        let mut padded = vec![0u8; self.k];
        for chunk in 0..chunks {
            let start = chunk * self.k;
            let end = (start + self.k).min(data.len());
            padded.fill(0);
            padded[..end.saturating_sub(start)].copy_from_slice(&data[start..end]);

            // Synthetic division of data * x^nsym by the generator.
            let mut rem = vec![0u8; nsym];
            for &d in &padded {
                let coef = d ^ rem[0];
                rem.rotate_left(1);
                rem[nsym - 1] = 0;
                if coef != 0 {
                    for j in 0..nsym {
                        rem[j] ^= self.gf.mul(self.gen[j + 1], coef);
                    }
                }
            }
            out.extend_from_slice(&padded);
            out.extend_from_slice(&rem);
        }
        out
    }

    /// Decode with unknown error positions. Returns the concatenated data
    /// parts, including any zero padding of the trailing chunk.
    pub fn decode(&self, encoded: &[u8]) -> Result<Vec<u8>> {
        self.decode_inner(encoded, None)
    }

    /// Decode with per-block known erasure positions (byte offsets within
    /// each `n`-byte block).
    pub fn decode_with_erasures(&self, encoded: &[u8], erasures: &[Vec<usize>]) -> Result<Vec<u8>> {
        self.decode_inner(encoded, Some(erasures))
    }

    fn decode_inner(&self, encoded: &[u8], erasures: Option<&[Vec<usize>]>) -> Result<Vec<u8>> {
        if encoded.is_empty() || encoded.len() % self.n != 0 {
            return Err(ArchiveError::UncorrectableBlock {
                stage: "reed-solomon",
                index: 0,
                detail: format!("stream length {} is not a multiple of n={}", encoded.len(), self.n),
            });
        }
        let blocks = encoded.len() / self.n;
        let mut out = Vec::with_capacity(blocks * self.k);
        let empty = Vec::new();
        for b in 0..blocks {
            let mut block = encoded[b * self.n..(b + 1) * self.n].to_vec();
            let era = erasures.and_then(|e| e.get(b)).unwrap_or(&empty);
            self.correct_block(&mut block, era, b)?;
            out.extend_from_slice(&block[..self.k]);
        }
        Ok(out)
    }

    /// Errata decoding: erasure locator, Forney syndromes, Berlekamp-Massey,
    /// Chien search, Forney magnitudes.
    fn correct_block(&self, block: &mut [u8], erasures: &[usize], index: usize) -> Result<()> {
        let nsym = self.nsym();
        let fail = |detail: String| ArchiveError::UncorrectableBlock {
            stage: "reed-solomon",
            index,
            detail,
        };
        if erasures.len() > nsym {
            return Err(fail(format!("{} erasures exceed parity budget {}", erasures.len(), nsym)));
        }
        if erasures.iter().any(|&p| p >= self.n) {
            return Err(fail("erasure position out of range".into()));
        }

        let synd: Vec<u8> = (0..nsym)
            .map(|i| self.gf.eval_high(block, self.gf.pow_alpha(i)))
            .collect();
        if synd.iter().all(|&s| s == 0) {
            return Ok(());
        }

        // Erasure locator Gamma(x) = prod (1 + X_j x), X_j = alpha^(n-1-pos).
        let mut gamma = vec![1u8];
        for &pos in erasures {
            let x = self.gf.pow_alpha(self.n - 1 - pos);
            gamma = self.gf.mul_low(&gamma, &[1, x]);
        }

        // Forney syndromes: (S * Gamma) mod x^nsym.
        let mut fsynd = self.gf.mul_low(&synd, &gamma);
        fsynd.truncate(nsym);

        let lambda = self.berlekamp_massey(&fsynd);
        let errata = trim_low(self.gf.mul_low(&lambda, &gamma));
        let deg = errata.len() - 1;
        if deg == 0 || deg > nsym {
            return Err(fail(format!("errata locator degree {deg} out of range")));
        }

        // Chien search over all positions.
        let mut exps = Vec::with_capacity(deg);
        for j in 0..self.n {
            let xinv = self.gf.pow_alpha(255 - (j % 255));
            if self.gf.eval_low(&errata, xinv) == 0 {
                exps.push(j);
            }
        }
        if exps.len() != deg {
            return Err(fail(format!("located {} of {} errata", exps.len(), deg)));
        }

        // Errata evaluator Omega(x) = (S * errata) mod x^nsym.
        let mut omega = self.gf.mul_low(&synd, &errata);
        omega.truncate(nsym);
        // Formal derivative in characteristic 2: odd-power terms survive.
        let deriv: Vec<u8> = (1..errata.len())
            .map(|i| if i % 2 == 1 { errata[i] } else { 0 })
            .collect();

        for &j in &exps {
            let x = self.gf.pow_alpha(j);
            let xinv = self.gf.pow_alpha(255 - (j % 255));
            let den = self.gf.eval_low(&deriv, xinv);
            if den == 0 {
                return Err(fail("degenerate errata derivative".into()));
            }
            let mag = self.gf.mul(x, self.gf.div(self.gf.eval_low(&omega, xinv), den));
            block[self.n - 1 - j] ^= mag;
        }

        let clean = (0..nsym).all(|i| self.gf.eval_high(block, self.gf.pow_alpha(i)) == 0);
        if clean {
            Ok(())
        } else {
            Err(fail(format!("{} errata corrected but syndrome persists", exps.len())))
        }
    }

    /// Massey's algorithm over the (Forney) syndrome sequence.
    fn berlekamp_massey(&self, synd: &[u8]) -> Vec<u8> {
        let mut c = vec![1u8];
        let mut b = vec![1u8];
        let mut l = 0usize;
        let mut m = 1usize;
        let mut bb = 1u8;
        for i in 0..synd.len() {
            let mut delta = synd[i];
            for j in 1..=l.min(c.len() - 1) {
                delta ^= self.gf.mul(c[j], synd[i - j]);
            }
            if delta == 0 {
                m += 1;
            } else if 2 * l <= i {
                let t = c.clone();
                let coef = self.gf.div(delta, bb);
                if c.len() < b.len() + m {
                    c.resize(b.len() + m, 0);
                }
                for (j, &bj) in b.iter().enumerate() {
                    c[j + m] ^= self.gf.mul(coef, bj);
                }
                l = i + 1 - l;
                b = t;
                bb = delta;
                m = 1;
            } else {
                let coef = self.gf.div(delta, bb);
                if c.len() < b.len() + m {
                    c.resize(b.len() + m, 0);
                }
                for (j, &bj) in b.iter().enumerate() {
                    c[j + m] ^= self.gf.mul(coef, bj);
                }
                m += 1;
            }
        }
        trim_low(c)
    }
}

/// How parity shards are derived from data shards. Recorded in the manifest
/// so the decoder selects the matching inverse.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShardScheme {
    /// Legacy placeholder: every parity shard is the XOR of all data shards;
    /// recovers at most one missing data shard.
    #[serde(rename = "xor-fanout")]
    XorFanout,
    /// Reed-Solomon over shards, striped so no group exceeds the GF(2^8)
    /// shard-count bound.
    #[serde(rename = "rs-shards")]
    RsShards,
}

#[derive(Clone, Copy, Debug)]
pub struct ShardConfig {
    pub shard_size: usize,
    /// Parity overhead as an integer percentage of the data shard count.
    pub parity_pct: u32,
    pub stripe_k: usize,
    pub scheme: ShardScheme,
}

impl Default for ShardConfig {
    fn default() -> Self {
        Self {
            shard_size: DEFAULT_SHARD_SIZE,
            parity_pct: 20,
            stripe_k: DEFAULT_STRIPE_K,
            scheme: ShardScheme::RsShards,
        }
    }
}

pub struct ShardSet {
    /// Data shards first, then parity shards in stripe order.
    pub shards: Vec<Vec<u8>>,
    pub data_shards: usize,
    pub parity_shards: usize,
}

/// Per-stripe (data, parity) shard counts for a given data shard total.
pub fn stripe_layout(data_shards: usize, cfg: &ShardConfig) -> Vec<(usize, usize)> {
    let mut stripes = Vec::new();
    let mut remaining = data_shards;
    while remaining > 0 {
        let d = remaining.min(cfg.stripe_k);
        let p = ((d * cfg.parity_pct as usize).div_ceil(100)).max(1);
        stripes.push((d, p));
        remaining -= d;
    }
    stripes
}

/// Split `data` into zero-padded data shards and derive parity shards.
pub fn build_shards(data: &[u8], cfg: &ShardConfig) -> Result<ShardSet> {
    let s = cfg.shard_size;
    let d = data.len().div_ceil(s);
    let mut shards: Vec<Vec<u8>> = Vec::with_capacity(d);
    for i in 0..d {
        let start = i * s;
        let end = (start + s).min(data.len());
        let mut shard = vec![0u8; s];
        shard[..end - start].copy_from_slice(&data[start..end]);
        shards.push(shard);
    }
    if d == 0 {
        return Ok(ShardSet { shards, data_shards: 0, parity_shards: 0 });
    }

    let parity_shards = match cfg.scheme {
        ShardScheme::XorFanout => {
            let p = ((d * cfg.parity_pct as usize).div_ceil(100)).max(1);
            let mut parity = vec![0u8; s];
            for shard in &shards {
                for (pb, &sb) in parity.iter_mut().zip(shard) {
                    *pb ^= sb;
                }
            }
            for _ in 0..p {
                shards.push(parity.clone());
            }
            p
        }
        ShardScheme::RsShards => {
            let mut total_parity = 0usize;
            let mut parity_all: Vec<Vec<u8>> = Vec::new();
            for (stripe, (sd, sp)) in stripe_layout(d, cfg).into_iter().enumerate() {
                let rs = ReedSolomon::new(sd, sp).map_err(|e| ArchiveError::UncorrectableArchive {
                    stage: "shard-encode",
                    detail: format!("stripe {stripe}: {e:?}"),
                })?;
                let start = stripe * cfg.stripe_k;
                let mut bufs: Vec<Vec<u8>> = shards[start..start + sd].to_vec();
                bufs.extend((0..sp).map(|_| vec![0u8; s]));
                let mut refs: Vec<&mut [u8]> = bufs.iter_mut().map(|v| v.as_mut_slice()).collect();
                rs.encode(&mut refs).map_err(|e| ArchiveError::UncorrectableArchive {
                    stage: "shard-encode",
                    detail: format!("stripe {stripe}: {e:?}"),
                })?;
                parity_all.extend(bufs.split_off(sd));
                total_parity += sp;
            }
            shards.extend(parity_all);
            total_parity
        }
    };
    Ok(ShardSet { shards, data_shards: d, parity_shards })
}

/// Reconstruct missing shards in place. `shards` holds `data_shards` data
/// entries followed by the parity entries; `None` marks an erasure.
pub fn recover_shards(
    shards: &mut [Option<Vec<u8>>],
    data_shards: usize,
    cfg: &ShardConfig,
) -> Result<()> {
    if data_shards == 0 {
        return Ok(());
    }
    match cfg.scheme {
        ShardScheme::XorFanout => recover_xor(shards, data_shards, cfg),
        ShardScheme::RsShards => recover_rs(shards, data_shards, cfg),
    }
}

fn recover_xor(shards: &mut [Option<Vec<u8>>], data_shards: usize, cfg: &ShardConfig) -> Result<()> {
    let s = cfg.shard_size;
    let missing: Vec<usize> =
        (0..data_shards).filter(|&i| shards[i].is_none()).collect();
    if missing.len() > 1 {
        return Err(ArchiveError::UncorrectableArchive {
            stage: "shard-recover",
            detail: format!("{} data shards missing, xor-fanout recovers at most 1", missing.len()),
        });
    }
    if let [lost] = missing[..] {
        let parity = shards[data_shards..]
            .iter()
            .flatten()
            .next()
            .ok_or_else(|| ArchiveError::UncorrectableArchive {
                stage: "shard-recover",
                detail: "data shard missing and no parity shard survived".into(),
            })?
            .clone();
        let mut acc = parity;
        for (i, shard) in shards[..data_shards].iter().enumerate() {
            if i == lost {
                continue;
            }
            let shard = shard.as_ref().expect("only `lost` is missing");
            for (ab, &sb) in acc.iter_mut().zip(shard) {
                *ab ^= sb;
            }
        }
        shards[lost] = Some(acc);
    }
    // Re-derive any missing parity so the full set can be re-hashed.
    let mut parity = vec![0u8; s];
    for shard in shards[..data_shards].iter() {
        let shard = shard.as_ref().expect("data complete");
        for (pb, &sb) in parity.iter_mut().zip(shard) {
            *pb ^= sb;
        }
    }
    for slot in shards[data_shards..].iter_mut() {
        if slot.is_none() {
            *slot = Some(parity.clone());
        }
    }
    Ok(())
}

fn recover_rs(shards: &mut [Option<Vec<u8>>], data_shards: usize, cfg: &ShardConfig) -> Result<()> {
    let mut parity_off = data_shards;
    for (stripe, (sd, sp)) in stripe_layout(data_shards, cfg).into_iter().enumerate() {
        let start = stripe * cfg.stripe_k;
        let mut group: Vec<Option<Vec<u8>>> = Vec::with_capacity(sd + sp);
        group.extend_from_slice(&shards[start..start + sd]);
        group.extend_from_slice(&shards[parity_off..parity_off + sp]);
        let missing = group.iter().filter(|g| g.is_none()).count();
        if missing > 0 {
            if missing > sp {
                return Err(ArchiveError::UncorrectableArchive {
                    stage: "shard-recover",
                    detail: format!("stripe {stripe}: {missing} shards missing, parity {sp}"),
                });
            }
            let rs = ReedSolomon::new(sd, sp).map_err(|e| ArchiveError::UncorrectableArchive {
                stage: "shard-recover",
                detail: format!("stripe {stripe}: {e:?}"),
            })?;
            rs.reconstruct(&mut group).map_err(|e| ArchiveError::UncorrectableArchive {
                stage: "shard-recover",
                detail: format!("stripe {stripe}: {e:?}"),
            })?;
            shards[start..start + sd].clone_from_slice(&group[..sd]);
            shards[parity_off..parity_off + sp].clone_from_slice(&group[sd..]);
        }
        parity_off += sp;
    }
    Ok(())
}

use serde::{Deserialize, Serialize};

/// LLR magnitude assigned to a bit read at full confidence.
const LLR_SCALE: f64 = 4.0;

/// Voxel encoding mode: how many bits one birefringent mark carries, split
/// between orientation angle and retardance level.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum VoxelMode {
    #[serde(rename = "3bit")]
    ThreeBit,
    #[serde(rename = "5bit")]
    FiveBit,
}

impl VoxelMode {
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "3bit" => Some(VoxelMode::ThreeBit),
            "5bit" => Some(VoxelMode::FiveBit),
            _ => None,
        }
    }

    pub fn as_tag(&self) -> &'static str {
        match self {
            VoxelMode::ThreeBit => "3bit",
            VoxelMode::FiveBit => "5bit",
        }
    }

    pub fn bits_per_voxel(&self) -> usize {
        match self {
            VoxelMode::ThreeBit => 3,
            VoxelMode::FiveBit => 5,
        }
    }

    pub fn orientations(&self) -> usize {
        match self {
            VoxelMode::ThreeBit => 4,
            VoxelMode::FiveBit => 8,
        }
    }

    pub fn retardance_levels(&self) -> usize {
        match self {
            VoxelMode::ThreeBit => 2,
            VoxelMode::FiveBit => 4,
        }
    }

    fn retardance_bits(&self) -> usize {
        self.retardance_levels().trailing_zeros() as usize
    }

    /// Angular resolution between adjacent orientation references.
    pub fn angle_step(&self) -> f32 {
        180.0 / self.orientations() as f32
    }

    pub fn angle_refs(&self) -> Vec<f32> {
        (0..self.orientations()).map(|i| i as f32 * self.angle_step()).collect()
    }

    /// Retardance references in wavelengths. The 3-bit mode uses the spread
    /// pair {1/4, 3/4}; the 5-bit mode the full quarter-wave ladder.
    pub fn retardance_refs(&self) -> Vec<f32> {
        match self {
            VoxelMode::ThreeBit => vec![0.25, 0.75],
            VoxelMode::FiveBit => vec![0.25, 0.5, 0.75, 1.0],
        }
    }

    fn retardance_step(&self) -> f32 {
        match self {
            VoxelMode::ThreeBit => 0.5,
            VoxelMode::FiveBit => 0.25,
        }
    }
}

/// Binary-reflected Gray code.
pub fn gray(x: u8) -> u8 {
    x ^ (x >> 1)
}

/// Inverse of `gray`.
pub fn gray_inverse(x: u8) -> u8 {
    let mut r = x;
    r ^= r >> 1;
    r ^= r >> 2;
    r ^= r >> 4;
    r
}

/// Hard demap result with per-symbol reliabilities and per-bit LLRs.
pub struct Demapped {
    pub symbols: Vec<u8>,
    /// Monotone confidence in (0, 1], from the distance to the winning
    /// references.
    pub reliabilities: Vec<f64>,
    /// `bits_per_voxel` LLRs per symbol; positive means bit 0.
    pub bit_llrs: Vec<f64>,
}

/// Maps between bit groups, symbols, and voxel (angle, retardance) pairs.
///
/// A symbol's high bits are the orientation half and its low bits the
/// retardance half; each half stores the Gray codeword of its level index,
/// so the nearest-neighbor substitution in either physical axis flips
/// exactly one bit of the symbol.
#[derive(Clone, Copy, Debug)]
pub struct VoxelMapper {
    pub mode: VoxelMode,
}

impl VoxelMapper {
    pub fn new(mode: VoxelMode) -> Self {
        Self { mode }
    }

    /// Pack bits big-endian into symbols of `bits_per_voxel`. Returns the
    /// symbols and the number of zero bits appended to fill the final group;
    /// the pad count is recorded in the manifest so decode can trim.
    pub fn bits_to_symbols(&self, bits: &[u8]) -> (Vec<u8>, usize) {
        let b = self.mode.bits_per_voxel();
        let pad = (b - bits.len() % b) % b;
        let mut symbols = Vec::with_capacity((bits.len() + pad) / b);
        for group in bits.chunks(b) {
            let mut sym = 0u8;
            for (i, &bit) in group.iter().enumerate() {
                sym |= (bit & 1) << (b - 1 - i);
            }
            symbols.push(sym);
        }
        (symbols, pad)
    }

    /// Unpack symbols back into bits, including any trailing pad bits.
    pub fn symbols_to_bits(&self, symbols: &[u8]) -> Vec<u8> {
        let b = self.mode.bits_per_voxel();
        let mut bits = Vec::with_capacity(symbols.len() * b);
        for &sym in symbols {
            for shift in (0..b).rev() {
                bits.push((sym >> shift) & 1);
            }
        }
        bits
    }

    /// Physical references for one symbol.
    pub fn symbol_to_voxel(&self, symbol: u8) -> (f32, f32) {
        let r_bits = self.mode.retardance_bits();
        let o_half = symbol >> r_bits;
        let r_half = symbol & (self.mode.retardance_levels() as u8 - 1);
        let o_idx = gray_inverse(o_half) as usize;
        let r_idx = gray_inverse(r_half) as usize;
        (self.mode.angle_refs()[o_idx], self.mode.retardance_refs()[r_idx])
    }

    pub fn symbols_to_voxels(&self, symbols: &[u8]) -> (Vec<f32>, Vec<f32>) {
        let mut angles = Vec::with_capacity(symbols.len());
        let mut rets = Vec::with_capacity(symbols.len());
        for &s in symbols {
            let (a, r) = self.symbol_to_voxel(s);
            angles.push(a);
            rets.push(r);
        }
        (angles, rets)
    }

    fn symbol_of(&self, o_idx: usize, r_idx: usize) -> u8 {
        let r_bits = self.mode.retardance_bits();
        (gray(o_idx as u8) << r_bits) | gray(r_idx as u8)
    }

    /// Demap one voxel measurement: snap each axis to its nearest reference,
    /// reassemble the Gray halves, and derive bit LLRs from the margins to
    /// the runner-up reference on each axis.
    fn demap_one(&self, angle: f32, ret: f32) -> (u8, f64, Vec<f64>) {
        let b = self.mode.bits_per_voxel();
        let angle_refs = self.mode.angle_refs();
        let ret_refs = self.mode.retardance_refs();

        let a = angle.rem_euclid(180.0);
        let (o_best, o_d1, o_second, o_d2) = nearest_two(&angle_refs, |r| {
            let d = (a - r).abs();
            d.min(180.0 - d)
        });
        let (r_best, r_d1, r_second, r_d2) = nearest_two(&ret_refs, |r| (ret - r).abs());

        let o_step = self.mode.angle_step() as f64;
        let r_step = self.mode.retardance_step() as f64;
        let norm_dist = o_d1 as f64 / o_step + r_d1 as f64 / r_step;
        let reliability = 1.0 / (1.0 + norm_dist);
        let symbol = self.symbol_of(o_best, r_best);

        // Per-bit LLRs: bits shared with the nearest alternative reference
        // carry the full magnitude; bits where they differ are scaled by the
        // decision margin on that axis.
        let o_margin = margin(o_d1 as f64, o_d2 as f64);
        let r_margin = margin(r_d1 as f64, r_d2 as f64);
        let alt_o = self.symbol_of(o_second, r_best);
        let alt_r = self.symbol_of(o_best, r_second);
        let mut llrs = Vec::with_capacity(b);
        for shift in (0..b).rev() {
            let bit = (symbol >> shift) & 1;
            let mut mag = LLR_SCALE;
            if (alt_o >> shift) & 1 != bit {
                mag = mag.min(LLR_SCALE * o_margin);
            }
            if (alt_r >> shift) & 1 != bit {
                mag = mag.min(LLR_SCALE * r_margin);
            }
            llrs.push(if bit == 0 { mag } else { -mag });
        }
        (symbol, reliability, llrs)
    }

    /// Demap a voxel stream. Works from the physical measurements only; the
    /// convenience symbol bytes in the tile container are never consulted.
    pub fn voxels_to_symbols(&self, angles: &[f32], retardances: &[f32]) -> Demapped {
        assert_eq!(angles.len(), retardances.len(), "axis length mismatch");
        let b = self.mode.bits_per_voxel();
        let mut out = Demapped {
            symbols: Vec::with_capacity(angles.len()),
            reliabilities: Vec::with_capacity(angles.len()),
            bit_llrs: Vec::with_capacity(angles.len() * b),
        };
        for (&a, &r) in angles.iter().zip(retardances) {
            let (sym, rel, llrs) = self.demap_one(a, r);
            out.symbols.push(sym);
            out.reliabilities.push(rel);
            out.bit_llrs.extend(llrs);
        }
        out
    }
}

/// Closest and second-closest reference by the given distance function.
/// Ties resolve to the smaller index.
fn nearest_two<F: Fn(f32) -> f32>(refs: &[f32], dist: F) -> (usize, f32, usize, f32) {
    let mut best = (0usize, f32::INFINITY);
    let mut second = (0usize, f32::INFINITY);
    for (i, &r) in refs.iter().enumerate() {
        let d = dist(r);
        if d < best.1 {
            second = best;
            best = (i, d);
        } else if d < second.1 {
            second = (i, d);
        }
    }
    (best.0, best.1, second.0, second.1)
}

/// Normalized decision margin in [0, 1].
fn margin(d1: f64, d2: f64) -> f64 {
    if d1 + d2 <= f64::EPSILON {
        return 1.0;
    }
    ((d2 - d1) / (d2 + d1)).clamp(0.0, 1.0)
}

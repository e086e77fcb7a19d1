use crate::error::{ArchiveError, Result};
use crate::store;
use crate::voxel::{VoxelMapper, VoxelMode};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use std::path::Path;

/// Damage applied to a voxel store by one simulator pass.
#[derive(Debug, Clone, Default)]
pub struct DamageStats {
    pub tiles_total: usize,
    /// `(plane_id, tile_id)` of every erased tile; this is the erasure mask
    /// handed back to callers.
    pub tiles_erased: Vec<(u32, u32)>,
    pub bits_flipped: usize,
}

/// Seeded damage injector used by tests and the sweep harness. All draws
/// come from one ChaCha20 stream, so a given seed reproduces the exact same
/// damage pattern.
pub struct ChannelSimulator {
    rng: ChaCha20Rng,
}

impl ChannelSimulator {
    pub fn new(seed: u64) -> Self {
        Self { rng: ChaCha20Rng::seed_from_u64(seed) }
    }

    /// Independent bit flips at probability `p`. Returns the flip count.
    pub fn flip_bits(&mut self, bits: &mut [u8], p: f64) -> usize {
        let mut flipped = 0;
        for bit in bits.iter_mut() {
            if self.rng.gen::<f64>() < p {
                *bit ^= 1;
                flipped += 1;
            }
        }
        flipped
    }

    /// Gaussian measurement noise on both axes.
    pub fn gaussian_noise(
        &mut self,
        angles: &mut [f32],
        retardances: &mut [f32],
        angle_sigma: f64,
        ret_sigma: f64,
    ) {
        for a in angles.iter_mut() {
            *a += (self.normal() * angle_sigma) as f32;
        }
        for r in retardances.iter_mut() {
            *r = (*r + (self.normal() * ret_sigma) as f32).clamp(0.0, 1.0);
        }
    }

    /// Systematic calibration drift: a fixed angle offset plus one
    /// multiplicative gain error drawn for the whole read-out.
    pub fn calibration_drift(
        &mut self,
        angles: &mut [f32],
        retardances: &mut [f32],
        angle_offset: f64,
        gain_sigma: f64,
    ) {
        let gain = 1.0 + self.normal() * gain_sigma;
        for a in angles.iter_mut() {
            *a += angle_offset as f32;
        }
        for r in retardances.iter_mut() {
            *r = (*r * gain as f32).clamp(0.0, 1.0);
        }
    }

    /// Damage a voxel store on disk: erase a fraction of tiles (files
    /// overwritten with uniform random bytes, so the container CRC fails on
    /// read) and flip symbol bits in the survivors, re-pointing each damaged
    /// voxel at the flipped symbol's physical references.
    pub fn damage_store(
        &mut self,
        archive_dir: &Path,
        mode: VoxelMode,
        tile_loss: f64,
        bitflip_p: f64,
    ) -> Result<DamageStats> {
        let paths = store::list_tile_paths(archive_dir)?;
        let mut stats = DamageStats { tiles_total: paths.len(), ..Default::default() };

        let n_lost = ((paths.len() as f64) * tile_loss).floor() as usize;
        let mut order: Vec<usize> = (0..paths.len()).collect();
        for i in (1..order.len()).rev() {
            let j = self.rng.gen_range(0..=i);
            order.swap(i, j);
        }
        let lost: Vec<usize> = order.into_iter().take(n_lost).collect();

        for &i in &lost {
            let path = &paths[i];
            if let Ok(tile) = store::read_tile(path) {
                stats.tiles_erased.push((tile.plane_id, tile.tile_id));
            }
            let len = std::fs::metadata(path)
                .map_err(ArchiveError::io(format!("stat {:?}", path)))?
                .len() as usize;
            let garbage: Vec<u8> = (0..len).map(|_| self.rng.gen()).collect();
            std::fs::write(path, garbage).map_err(ArchiveError::io(format!("write {:?}", path)))?;
        }

        if bitflip_p > 0.0 {
            let mapper = VoxelMapper::new(mode);
            let b = mode.bits_per_voxel();
            for (i, path) in paths.iter().enumerate() {
                if lost.contains(&i) {
                    continue;
                }
                let mut tile = store::read_tile(path)?;
                let mut dirty = false;
                for (vi, sym) in tile.symbols.iter_mut().enumerate() {
                    let mut flipped = *sym;
                    for bit in 0..b {
                        if self.rng.gen::<f64>() < bitflip_p {
                            flipped ^= 1 << bit;
                            stats.bits_flipped += 1;
                        }
                    }
                    if flipped != *sym {
                        *sym = flipped;
                        let (a, r) = mapper.symbol_to_voxel(flipped);
                        tile.angles[vi] = a;
                        tile.retardances[vi] = r;
                        dirty = true;
                    }
                }
                if dirty {
                    store::write_tile(archive_dir, &tile)?;
                }
            }
        }
        tracing::debug!(
            tiles = stats.tiles_total,
            erased = stats.tiles_erased.len(),
            flips = stats.bits_flipped,
            "channel damage applied"
        );
        Ok(stats)
    }

    /// Add Gaussian read-out noise to every surviving tile in a store.
    pub fn noise_store(
        &mut self,
        archive_dir: &Path,
        angle_sigma: f64,
        ret_sigma: f64,
    ) -> Result<()> {
        for path in store::list_tile_paths(archive_dir)? {
            let Ok(mut tile) = store::read_tile(&path) else {
                continue;
            };
            let mut angles = std::mem::take(&mut tile.angles);
            let mut rets = std::mem::take(&mut tile.retardances);
            self.gaussian_noise(&mut angles, &mut rets, angle_sigma, ret_sigma);
            tile.angles = angles;
            tile.retardances = rets;
            store::write_tile(archive_dir, &tile)?;
        }
        Ok(())
    }

    /// Standard normal draw via Box-Muller.
    fn normal(&mut self) -> f64 {
        let u1: f64 = self.rng.gen::<f64>().max(1e-12);
        let u2: f64 = self.rng.gen();
        (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
    }
}

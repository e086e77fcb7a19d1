use crate::compress::Codec;
use crate::error::{ArchiveError, Result};
use crate::voxel::VoxelMode;
use serde::{Deserialize, Serialize};

/// Named encoding profile. Profile parameters are embedded in the manifest
/// so decode never depends on the profile table shipped with the reader.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Profile {
    pub name: String,
    pub voxel_mode: VoxelMode,
    pub ldpc_rate: f64,
    /// Outer-code parity overhead as an integer percentage.
    pub rs_parity_pct: u32,
    pub interleave_span: usize,
    pub interleave_depth: usize,
    pub compression: String,
    pub compression_level: i32,
}

impl Profile {
    pub fn codec(&self) -> Codec {
        match self.compression.as_str() {
            "xz" => Codec::Xz,
            "none" => Codec::None,
            _ => Codec::Zstd,
        }
    }

    /// Sync-header tag stamped on every tile.
    pub fn tag(&self) -> u8 {
        self.name.as_bytes().first().copied().unwrap_or(b'?')
    }
}

/// Conservative: densest protection, 3-bit voxels.
fn profile_a() -> Profile {
    Profile {
        name: "A".into(),
        voxel_mode: VoxelMode::ThreeBit,
        ldpc_rate: 0.75,
        rs_parity_pct: 20,
        interleave_span: 10_000,
        interleave_depth: 16,
        compression: "zstd".into(),
        compression_level: 6,
    }
}

/// Aggressive: 5-bit voxels, leaner overheads.
fn profile_b() -> Profile {
    Profile {
        name: "B".into(),
        voxel_mode: VoxelMode::FiveBit,
        ldpc_rate: 0.83,
        rs_parity_pct: 12,
        interleave_span: 5_000,
        interleave_depth: 8,
        compression: "zstd".into(),
        compression_level: 9,
    }
}

pub fn lookup(tag: &str) -> Result<Profile> {
    match tag {
        "A" | "a" => Ok(profile_a()),
        "B" | "b" => Ok(profile_b()),
        other => Err(ArchiveError::UnknownProfile(other.to_string())),
    }
}

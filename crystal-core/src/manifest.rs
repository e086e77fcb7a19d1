use crate::compress::CodecInfo;
use crate::error::{ArchiveError, Result};
use crate::hashing;
use crate::packer::FileEntry;
use crate::profile::Profile;
use crate::rs_codec::ShardScheme;
use crate::voxel::VoxelMode;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;

pub const MANIFEST_VERSION: &str = "1.0.0";
pub const MANIFEST_FILE: &str = "manifest.json";

/// Self-describing archive record. A fresh decoder parameterizes every
/// inverse stage from this file alone; the seeded matrices and permutations
/// it references are regenerated, never stored.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Manifest {
    pub version: String,
    /// ISO-8601 UTC creation time.
    pub created: String,
    pub profile: String,
    pub encoding: Encoding,
    pub geometry: Geometry,
    pub files: Vec<FileEntry>,
    pub integrity: Integrity,
    /// Free-form human decoding instructions, for readers without software.
    pub instructions: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Encoding {
    pub profile_params: Profile,
    pub compression: CodecInfo,
    pub ecc: Ecc,
    pub voxel: VoxelParams,
    pub interleaving: InterleaveParams,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Ecc {
    pub ldpc: LdpcParams,
    pub reed_solomon: RsParams,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct LdpcParams {
    pub n: usize,
    pub k: usize,
    pub rate: f64,
    pub seed: u64,
    pub max_iter: usize,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct RsParams {
    /// Block-code parameters of the byte-level codec.
    pub n: usize,
    pub k: usize,
    pub shard_size: usize,
    pub data_shards: usize,
    pub parity_shards: usize,
    pub stripe_k: usize,
    pub parity_pct: u32,
    pub scheme: ShardScheme,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct VoxelParams {
    pub mode: VoxelMode,
    pub bits_per_voxel: usize,
    pub orientations: usize,
    pub retardance_levels: usize,
    pub gray_codes: GrayTables,
    /// Zero bits appended to fill the final symbol group.
    pub pad_bits: usize,
}

/// Gray codeword per physical level index, one table per axis.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct GrayTables {
    pub orientation: Vec<u8>,
    pub retardance: Vec<u8>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct InterleaveParams {
    pub prng: String,
    pub seed: u64,
    pub span: usize,
    pub depth: usize,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Geometry {
    pub tiles_x: usize,
    pub tiles_y: usize,
    pub planes: usize,
    pub total_tiles: usize,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Integrity {
    /// Hex SHA-256 Merkle root over all shards.
    pub merkle_root: String,
    /// Hex SHA-256 over the canonical manifest minus this block.
    pub manifest_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<SignatureBlock>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SignatureBlock {
    pub algorithm: String,
    pub public_key: String,
    pub signature: String,
}

impl Manifest {
    /// SHA-256 over the canonical serialization with the integrity block
    /// removed: compact JSON with sorted keys, so independent
    /// implementations agree byte-for-byte.
    pub fn compute_hash(&self) -> Result<String> {
        let mut value = serde_json::to_value(self).map_err(|_| ArchiveError::ManifestTampered)?;
        value
            .as_object_mut()
            .ok_or(ArchiveError::ManifestTampered)?
            .remove("integrity");
        let canonical = serde_json::to_vec(&value).map_err(|_| ArchiveError::ManifestTampered)?;
        Ok(hex::encode(hashing::sha256(&canonical)))
    }

    /// Stamp the self-hash and write pretty JSON.
    pub fn save(&mut self, path: &Path) -> Result<()> {
        self.integrity.manifest_hash = self.compute_hash()?;
        let f = File::create(path).map_err(ArchiveError::io(format!("create {:?}", path)))?;
        serde_json::to_writer_pretty(f, self).map_err(|e| ArchiveError::IoFailure {
            context: format!("write {:?}", path),
            source: std::io::Error::new(std::io::ErrorKind::Other, e),
        })?;
        Ok(())
    }

    /// Load and verify the self-hash. A parse failure or a hash mismatch is
    /// `ManifestTampered`; the parameters cannot be trusted either way.
    pub fn load(path: &Path) -> Result<Manifest> {
        let f = File::open(path).map_err(ArchiveError::io(format!("open {:?}", path)))?;
        let manifest: Manifest =
            serde_json::from_reader(f).map_err(|_| ArchiveError::ManifestTampered)?;
        if manifest.compute_hash()? != manifest.integrity.manifest_hash {
            return Err(ArchiveError::ManifestTampered);
        }
        Ok(manifest)
    }
}

/// Human decoding recipe embedded verbatim in every manifest.
pub fn instructions_text() -> String {
    "\
Crystal Archive Decoding Instructions
=====================================

1. Optical calibration
   - Use primer targets for focus lock
   - Calibrate polarization angle to 0 degrees
   - Set gain using referee pages

2. Symbol decoding
   - Read voxel orientation (angle) and retardance per tile
   - Use the Gray code tables in this manifest
   - Apply soft-decision thresholds if measurements are available

3. Error correction
   - Deinterleave using the recorded PRNG family and seed
   - Apply LDPC soft-decision decoding per block
   - Use Reed-Solomon shard recovery for erasures

4. Data recovery
   - Verify the Merkle root over all shards
   - Decompress using the recorded codec
   - Verify per-file SHA-256 hashes
"
    .to_string()
}

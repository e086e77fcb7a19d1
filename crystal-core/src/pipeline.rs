use crate::compress;
use crate::error::{ArchiveError, Result};
use crate::geometry;
use crate::hashing::MerkleTree;
use crate::interleave;
use crate::ldpc::{self, LdpcCode};
use crate::manifest::{
    Ecc, Encoding, Geometry, GrayTables, Integrity, InterleaveParams, LdpcParams, Manifest,
    RsParams, VoxelParams, MANIFEST_FILE, MANIFEST_VERSION,
};
use crate::packer;
use crate::profile::{self, Profile};
use crate::rs_codec::{self, ShardConfig, ShardScheme, DEFAULT_SHARD_SIZE, DEFAULT_STRIPE_K};
use crate::sign;
use crate::store;
use crate::voxel::{gray, VoxelMapper};
use ed25519_dalek::SigningKey;
use fs2::FileExt;
use rayon::prelude::*;
use std::fs::File;
use std::path::Path;
use tracing::{info, warn};

pub const LDPC_BLOCK_LEN: usize = ldpc::DEFAULT_BLOCK_LEN;
pub const LDPC_MAX_ITER: usize = ldpc::DEFAULT_MAX_ITER;

pub struct EncodeOptions {
    pub profile: String,
    pub seed: u64,
    pub sign_key: Option<SigningKey>,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self { profile: "A".into(), seed: 42, sign_key: None }
    }
}

#[derive(Debug)]
pub struct EncodeSummary {
    pub manifest: Manifest,
    pub total_symbols: usize,
    pub tiles: usize,
    pub planes: usize,
}

#[derive(Clone, Copy, Debug)]
pub struct DecodeOptions {
    /// Soft-decision LDPC decoding from demap LLRs; hard bit-flipping
    /// otherwise.
    pub soft: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self { soft: true }
    }
}

#[derive(Debug, Clone)]
pub struct FileOutcome {
    pub path: String,
    pub size: u64,
    pub hash_ok: bool,
}

#[derive(Debug, Clone)]
pub struct DecodeReport {
    pub files: Vec<FileOutcome>,
    pub merkle_ok: bool,
    pub tiles_missing: usize,
    pub blocks_failed: usize,
    pub shards_recovered: usize,
}

impl DecodeReport {
    pub fn all_files_ok(&self) -> bool {
        self.files.iter().all(|f| f.hash_ok)
    }
}

#[derive(Debug, Clone)]
pub struct VerifyReport {
    pub merkle_ok: bool,
    pub tiles_missing: usize,
    pub blocks_failed: usize,
    pub shards_recovered: usize,
    pub files_ok: usize,
    pub files_bad: usize,
    /// `Some(valid)` when the manifest carries a signature block.
    pub signature_valid: Option<bool>,
}

/// Encode a folder into a crystal archive under `output`.
///
/// Dataflow: pack, compress, shard with outer parity, LDPC-encode each shard
/// in fixed blocks, interleave the whole bit stream, map to voxels, lay out
/// tiles and planes, then emit the self-describing manifest.
pub fn encode_folder(folder: &Path, output: &Path, opts: &EncodeOptions) -> Result<EncodeSummary> {
    let profile = profile::lookup(&opts.profile)?;
    std::fs::create_dir_all(output).map_err(ArchiveError::io(format!("create {:?}", output)))?;
    let lock = File::create(output.join(".crystal.lock"))
        .map_err(ArchiveError::io("create archive lock"))?;
    lock.try_lock_exclusive().map_err(ArchiveError::io("archive directory is locked"))?;

    info!(profile = %profile.name, seed = opts.seed, ?folder, "packing");
    let (blob, entries) = packer::pack_folder(folder)?;

    info!(bytes = blob.len(), codec = %profile.compression, "compressing");
    let (compressed, codec_info) =
        compress::compress(&blob, profile.codec(), profile.compression_level)?;

    let shard_cfg = ShardConfig {
        shard_size: DEFAULT_SHARD_SIZE,
        parity_pct: profile.rs_parity_pct,
        stripe_k: DEFAULT_STRIPE_K,
        scheme: ShardScheme::RsShards,
    };
    let shard_set = rs_codec::build_shards(&compressed, &shard_cfg)?;
    info!(
        data = shard_set.data_shards,
        parity = shard_set.parity_shards,
        shard_size = shard_cfg.shard_size,
        "sharded"
    );
    let merkle = MerkleTree::build(&shard_set.shards, MerkleTree::DEFAULT_FANOUT);

    let k = (LDPC_BLOCK_LEN as f64 * profile.ldpc_rate).floor() as usize;
    let code = LdpcCode::new(LDPC_BLOCK_LEN, k, opts.seed);
    let encoded: Vec<Vec<u8>> = shard_set
        .shards
        .par_iter()
        .map(|shard| encode_shard_bits(&code, shard))
        .collect();
    let mut all_bits = Vec::with_capacity(encoded.iter().map(Vec::len).sum());
    for bits in encoded {
        all_bits.extend_from_slice(&bits);
    }
    info!(bits = all_bits.len(), n = code.n, k = code.k, "ldpc encoded");

    let perm = interleave::permutation(opts.seed, all_bits.len());
    let interleaved = interleave::interleave(&all_bits, &perm);

    let mapper = VoxelMapper::new(profile.voxel_mode);
    let (symbols, pad_bits) = mapper.bits_to_symbols(&interleaved);
    let (angles, retardances) = mapper.symbols_to_voxels(&symbols);

    let tiles = geometry::layout(&symbols, &angles, &retardances, profile.tag());
    for tile in &tiles {
        store::write_tile(output, tile)?;
    }
    let planes = geometry::plane_count(symbols.len());
    info!(symbols = symbols.len(), tiles = tiles.len(), planes, "voxel store written");

    let mut manifest = build_manifest(
        &profile,
        opts.seed,
        codec_info,
        &shard_set,
        &shard_cfg,
        &code,
        pad_bits,
        entries,
        tiles.len(),
        planes,
        merkle.root_hex(),
    );
    if let Some(key) = &opts.sign_key {
        manifest.integrity.manifest_hash = manifest.compute_hash()?;
        sign::sign_manifest(&mut manifest, key)?;
    }
    manifest.save(&output.join(MANIFEST_FILE))?;

    Ok(EncodeSummary {
        manifest,
        total_symbols: symbols.len(),
        tiles: tiles.len(),
        planes,
    })
}

/// Decode a crystal archive back into files under `output`.
///
/// Every inverse stage is parameterized from the manifest alone. Per-file
/// hash mismatches are reported but never abort sibling files.
pub fn decode_archive(
    archive_dir: &Path,
    output: &Path,
    opts: &DecodeOptions,
) -> Result<DecodeReport> {
    let (payload, manifest, stats) = recover_payload(archive_dir, opts.soft)?;
    let entries = packer::unpack_blob(&payload, output)?;

    let mut files = Vec::with_capacity(manifest.files.len());
    for want in &manifest.files {
        let got = entries.iter().find(|e| e.path == want.path);
        let hash_ok = got.map_or(false, |g| g.size == want.size && g.sha256 == want.sha256);
        if !hash_ok {
            let err = ArchiveError::ChecksumMismatch { path: want.path.clone() };
            warn!(%err, "recovered file failed verification; written anyway");
        }
        files.push(FileOutcome { path: want.path.clone(), size: want.size, hash_ok });
    }
    Ok(DecodeReport {
        files,
        merkle_ok: stats.merkle_ok,
        tiles_missing: stats.tiles_missing,
        blocks_failed: stats.blocks_failed,
        shards_recovered: stats.shards_recovered,
    })
}

/// Run the decode chain without writing any file, checking shard integrity
/// and per-file hashes in memory.
pub fn verify_archive(archive_dir: &Path) -> Result<VerifyReport> {
    let (payload, manifest, stats) = recover_payload(archive_dir, true)?;
    let records = packer::parse_blob(&payload)?;
    let mut files_ok = 0usize;
    let mut files_bad = 0usize;
    for want in &manifest.files {
        let got = records.iter().find(|r| r.entry.path == want.path);
        if got.map_or(false, |g| g.entry.size == want.size && g.entry.sha256 == want.sha256) {
            files_ok += 1;
        } else {
            files_bad += 1;
        }
    }
    let signature_valid = if manifest.integrity.signature.is_some() {
        Some(sign::verify_manifest(&manifest)?)
    } else {
        None
    };
    Ok(VerifyReport {
        merkle_ok: stats.merkle_ok,
        tiles_missing: stats.tiles_missing,
        blocks_failed: stats.blocks_failed,
        shards_recovered: stats.shards_recovered,
        files_ok,
        files_bad,
        signature_valid,
    })
}

struct ChainStats {
    merkle_ok: bool,
    tiles_missing: usize,
    blocks_failed: usize,
    shards_recovered: usize,
}

/// Shared decode chain: tiles to voxels to bits to LDPC blocks to shards to
/// the decompressed packed blob.
fn recover_payload(archive_dir: &Path, soft: bool) -> Result<(Vec<u8>, Manifest, ChainStats)> {
    let manifest = Manifest::load(&archive_dir.join(MANIFEST_FILE))?;
    let enc = &manifest.encoding;
    let rs = &enc.ecc.reed_solomon;
    let ldpc_p = &enc.ecc.ldpc;
    let mode = enc.voxel.mode;
    let b = mode.bits_per_voxel();
    let mapper = VoxelMapper::new(mode);
    let profile_tag = enc.profile_params.tag();

    let shard_cfg = ShardConfig {
        shard_size: rs.shard_size,
        parity_pct: rs.parity_pct,
        stripe_k: rs.stripe_k,
        scheme: rs.scheme,
    };
    let layout_parity: usize =
        rs_codec::stripe_layout(rs.data_shards, &shard_cfg).iter().map(|&(_, p)| p).sum();
    if rs.scheme == ShardScheme::RsShards && layout_parity != rs.parity_shards {
        return Err(ArchiveError::UncorrectableArchive {
            stage: "parameters",
            detail: format!(
                "manifest parity count {} does not match derived layout {}",
                rs.parity_shards, layout_parity
            ),
        });
    }

    let total_shards = rs.data_shards + rs.parity_shards;
    let blocks_per_shard = (rs.shard_size * 8).div_ceil(ldpc_p.k);
    let bits_per_shard = blocks_per_shard * ldpc_p.n;
    let total_bits = total_shards * bits_per_shard;
    let total_symbols = (total_bits + enc.voxel.pad_bits) / b;

    let (tiles, unreadable) = store::scan_tiles(archive_dir)?;
    let flat = geometry::flatten(&tiles, total_symbols, profile_tag);
    let expected_tiles = geometry::tile_count(total_symbols);
    let tiles_missing = expected_tiles.saturating_sub(flat.tiles_placed);
    info!(
        tiles = flat.tiles_placed,
        missing = tiles_missing,
        unreadable,
        soft,
        "voxel store scanned"
    );

    let demapped = mapper.voxels_to_symbols(&flat.angles, &flat.retardances);
    let mut sym_bits = mapper.symbols_to_bits(&demapped.symbols);
    let mut bit_llrs = demapped.bit_llrs;
    let mut bit_present = Vec::with_capacity(total_symbols * b);
    for &p in &flat.present {
        bit_present.extend(std::iter::repeat(p).take(b));
    }
    for (llr, &p) in bit_llrs.iter_mut().zip(&bit_present) {
        if !p {
            *llr = 0.0;
        }
    }
    // Drop the recorded symbol padding.
    sym_bits.truncate(total_bits);
    bit_llrs.truncate(total_bits);
    bit_present.truncate(total_bits);

    let perm = interleave::permutation(enc.interleaving.seed, total_bits);
    let bits = interleave::deinterleave(&sym_bits, &perm);
    let llrs = interleave::deinterleave(&bit_llrs, &perm);
    let present = interleave::deinterleave(&bit_present, &perm);

    let code = LdpcCode::new(ldpc_p.n, ldpc_p.k, ldpc_p.seed);
    let max_iter = ldpc_p.max_iter;
    let results: Vec<(Option<Vec<u8>>, usize)> = (0..total_shards)
        .into_par_iter()
        .map(|s| {
            decode_shard(
                &code,
                &bits[s * bits_per_shard..(s + 1) * bits_per_shard],
                &llrs[s * bits_per_shard..(s + 1) * bits_per_shard],
                &present[s * bits_per_shard..(s + 1) * bits_per_shard],
                rs.shard_size,
                soft,
                max_iter,
            )
        })
        .collect();
    let blocks_failed: usize = results.iter().map(|(_, f)| f).sum();
    let mut shard_opts: Vec<Option<Vec<u8>>> = results.into_iter().map(|(s, _)| s).collect();
    let shards_recovered = shard_opts.iter().filter(|s| s.is_none()).count();
    if shards_recovered > 0 {
        warn!(erasures = shards_recovered, blocks_failed, "recovering shard erasures");
    }
    rs_codec::recover_shards(&mut shard_opts, rs.data_shards, &shard_cfg)?;
    let shards: Vec<Vec<u8>> = shard_opts
        .into_iter()
        .map(|s| s.expect("recovery leaves no gaps"))
        .collect();

    let tree = MerkleTree::build(&shards, MerkleTree::DEFAULT_FANOUT);
    let merkle_ok = tree.root_hex() == manifest.integrity.merkle_root;
    if !merkle_ok {
        warn!("merkle root mismatch after recovery; continuing best-effort");
    }

    let mut data = Vec::with_capacity(rs.data_shards * rs.shard_size);
    for shard in &shards[..rs.data_shards] {
        data.extend_from_slice(shard);
    }
    data.truncate(enc.compression.compressed_size as usize);
    let payload = compress::decompress(&data, &enc.compression)?;

    let stats = ChainStats { merkle_ok, tiles_missing, blocks_failed, shards_recovered };
    Ok((payload, manifest, stats))
}

/// LDPC-encode one shard into `blocks_per_shard` fixed blocks, zero-padding
/// the trailing block.
fn encode_shard_bits(code: &LdpcCode, shard: &[u8]) -> Vec<u8> {
    let bits = ldpc::bytes_to_bits(shard);
    let mut out = Vec::with_capacity(bits.len().div_ceil(code.k) * code.n);
    for chunk in bits.chunks(code.k) {
        if chunk.len() == code.k {
            out.extend_from_slice(&code.encode(chunk));
        } else {
            let mut block = chunk.to_vec();
            block.resize(code.k, 0);
            out.extend_from_slice(&code.encode(&block));
        }
    }
    out
}

/// Decode one shard's blocks. Any failed block turns the whole shard into an
/// erasure for the outer code; a block with more erased bits than parity
/// bits is failed without decoding.
fn decode_shard(
    code: &LdpcCode,
    bits: &[u8],
    llrs: &[f64],
    present: &[bool],
    shard_size: usize,
    soft: bool,
    max_iter: usize,
) -> (Option<Vec<u8>>, usize) {
    let n = code.n;
    let mut info_bits = Vec::with_capacity(bits.len() / n * code.k);
    let mut failed = 0usize;
    for start in (0..bits.len()).step_by(n) {
        let erased = present[start..start + n].iter().filter(|&&p| !p).count();
        if erased > code.parity_len() {
            failed += 1;
            continue;
        }
        let ok = if soft {
            let (decoded, _, ok) = code.decode_soft(&llrs[start..start + n], max_iter, true);
            info_bits.extend_from_slice(&decoded);
            ok
        } else {
            let (decoded, ok) = code.decode_hard(&bits[start..start + n], max_iter);
            info_bits.extend_from_slice(&decoded);
            ok
        };
        if !ok {
            failed += 1;
        }
    }
    if failed > 0 {
        return (None, failed);
    }
    info_bits.truncate(shard_size * 8);
    (Some(ldpc::bits_to_bytes(&info_bits)), 0)
}

#[allow(clippy::too_many_arguments)]
fn build_manifest(
    profile: &Profile,
    seed: u64,
    codec_info: compress::CodecInfo,
    shard_set: &rs_codec::ShardSet,
    shard_cfg: &ShardConfig,
    code: &LdpcCode,
    pad_bits: usize,
    entries: Vec<packer::FileEntry>,
    total_tiles: usize,
    planes: usize,
    merkle_root: String,
) -> Manifest {
    let mode = profile.voxel_mode;
    Manifest {
        version: MANIFEST_VERSION.into(),
        created: chrono::Utc::now().to_rfc3339(),
        profile: profile.name.clone(),
        encoding: Encoding {
            profile_params: profile.clone(),
            compression: codec_info,
            ecc: Ecc {
                ldpc: LdpcParams {
                    n: code.n,
                    k: code.k,
                    rate: code.rate(),
                    seed,
                    max_iter: LDPC_MAX_ITER,
                },
                reed_solomon: RsParams {
                    n: 255,
                    k: 223,
                    shard_size: shard_cfg.shard_size,
                    data_shards: shard_set.data_shards,
                    parity_shards: shard_set.parity_shards,
                    stripe_k: shard_cfg.stripe_k,
                    parity_pct: shard_cfg.parity_pct,
                    scheme: shard_cfg.scheme,
                },
            },
            voxel: VoxelParams {
                mode,
                bits_per_voxel: mode.bits_per_voxel(),
                orientations: mode.orientations(),
                retardance_levels: mode.retardance_levels(),
                gray_codes: GrayTables {
                    orientation: (0..mode.orientations() as u8).map(gray).collect(),
                    retardance: (0..mode.retardance_levels() as u8).map(gray).collect(),
                },
                pad_bits,
            },
            interleaving: InterleaveParams {
                prng: interleave::PRNG_FAMILY.into(),
                seed,
                span: profile.interleave_span,
                depth: profile.interleave_depth,
            },
        },
        geometry: Geometry {
            tiles_x: geometry::TILES_X,
            tiles_y: geometry::TILES_Y,
            planes,
            total_tiles,
        },
        files: entries,
        integrity: Integrity {
            merkle_root,
            manifest_hash: String::new(),
            signature: None,
        },
        instructions: crate::manifest::instructions_text(),
    }
}

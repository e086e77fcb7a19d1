use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use crystal_core::channel::ChannelSimulator;
use crystal_core::error::ArchiveError;
use crystal_core::pipeline::{self, DecodeOptions, EncodeOptions};
use crystal_core::profile;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "crystal", version, about = "Crystal Archive 5D optical encoder/decoder")]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Encode a folder into a crystal archive
    Encode {
        folder: PathBuf,
        #[arg(long)]
        out: PathBuf,
        #[arg(long, default_value = "A")]
        profile: String,
        #[arg(long, default_value_t = 42)]
        seed: u64,
        /// Sign the manifest with a fresh Ed25519 key
        #[arg(long, default_value_t = false)]
        sign: bool,
    },
    /// Decode an archive back to its files
    Decode {
        voxel_dir: PathBuf,
        #[arg(long)]
        out: PathBuf,
        /// Soft-decision decoding (default)
        #[arg(long, conflicts_with = "hard", default_value_t = false)]
        soft: bool,
        /// Hard-decision decoding
        #[arg(long, default_value_t = false)]
        hard: bool,
    },
    /// Check archive integrity without writing files
    Verify { voxel_dir: PathBuf },
    /// Encode a synthetic folder, damage it, decode, and report recovery
    Simulate {
        #[arg(long, default_value_t = 0.0)]
        tile_loss: f64,
        #[arg(long, default_value_t = 0.0)]
        bitflip: f64,
        #[arg(long, default_value_t = 10)]
        runs: u32,
        #[arg(long, default_value = "A")]
        profile: String,
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();
    let code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            exit_code_for(&err)
        }
    };
    std::process::exit(code);
}

/// 0 = success, 1 = recoverable-but-aborted, 2 = uncorrectable.
fn exit_code_for(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<ArchiveError>() {
        Some(
            ArchiveError::UncorrectableArchive { .. }
            | ArchiveError::UncorrectableBlock { .. }
            | ArchiveError::ManifestTampered,
        ) => 2,
        _ => 1,
    }
}

fn run(cli: Cli) -> Result<i32> {
    match cli.cmd {
        Cmd::Encode { folder, out, profile, seed, sign } => encode(&folder, &out, profile, seed, sign),
        Cmd::Decode { voxel_dir, out, soft: _, hard } => decode(&voxel_dir, &out, !hard),
        Cmd::Verify { voxel_dir } => verify(&voxel_dir),
        Cmd::Simulate { tile_loss, bitflip, runs, profile, seed } => {
            simulate(tile_loss, bitflip, runs, &profile, seed)
        }
    }
}

fn encode(folder: &Path, out: &Path, profile: String, seed: u64, sign: bool) -> Result<i32> {
    let sign_key = sign.then(|| ed25519_signing_key());
    let show_key = sign_key.as_ref().map(|k| k.verifying_key());
    let opts = EncodeOptions { profile, seed, sign_key };
    let summary = pipeline::encode_folder(folder, out, &opts)
        .with_context(|| format!("encode {}", folder.display()))?;
    println!(
        "encoded {} files into {} tiles across {} planes ({} symbols)",
        summary.manifest.files.len(),
        summary.tiles,
        summary.planes,
        summary.total_symbols
    );
    println!("merkle root {}", summary.manifest.integrity.merkle_root);
    if let Some(vk) = show_key {
        println!("signed; public key {}", hex::encode(vk.to_bytes()));
    }
    Ok(0)
}

fn ed25519_signing_key() -> ed25519_dalek::SigningKey {
    ed25519_dalek::SigningKey::generate(&mut rand::rngs::OsRng)
}

fn decode(voxel_dir: &Path, out: &Path, soft: bool) -> Result<i32> {
    let report = pipeline::decode_archive(voxel_dir, out, &DecodeOptions { soft })
        .with_context(|| format!("decode {}", voxel_dir.display()))?;
    for f in &report.files {
        println!("{} {} ({} bytes)", if f.hash_ok { "OK " } else { "BAD" }, f.path, f.size);
    }
    println!(
        "tiles missing {} | ldpc blocks failed {} | shards recovered {} | merkle {}",
        report.tiles_missing,
        report.blocks_failed,
        report.shards_recovered,
        if report.merkle_ok { "OK" } else { "MISMATCH" }
    );
    Ok(if report.all_files_ok() { 0 } else { 1 })
}

fn verify(voxel_dir: &Path) -> Result<i32> {
    let report = pipeline::verify_archive(voxel_dir)
        .with_context(|| format!("verify {}", voxel_dir.display()))?;
    println!(
        "files OK {} | files BAD {} | merkle {} | tiles missing {} | shards recovered {}",
        report.files_ok,
        report.files_bad,
        if report.merkle_ok { "OK" } else { "MISMATCH" },
        report.tiles_missing,
        report.shards_recovered
    );
    if let Some(valid) = report.signature_valid {
        println!("signature {}", if valid { "OK" } else { "INVALID" });
    }
    let clean = report.merkle_ok && report.files_bad == 0 && report.signature_valid != Some(false);
    Ok(if clean { 0 } else { 1 })
}

/// Build a deterministic synthetic folder, then run
/// encode -> damage -> decode `runs` times with derived seeds.
fn simulate(tile_loss: f64, bitflip: f64, runs: u32, profile_tag: &str, seed: u64) -> Result<i32> {
    let profile = profile::lookup(profile_tag)?;
    let mut recovered = 0u32;
    for run in 0..runs {
        let run_seed = seed.wrapping_add(run as u64);
        let td = tempfile::tempdir().context("create temp dir")?;
        let src = td.path().join("source");
        write_synthetic_folder(&src, run_seed)?;
        let archive = td.path().join("archive");
        let restored = td.path().join("restored");

        let opts = EncodeOptions {
            profile: profile.name.clone(),
            seed: run_seed,
            sign_key: None,
        };
        pipeline::encode_folder(&src, &archive, &opts)?;
        let mut sim = ChannelSimulator::new(run_seed ^ 0x5d);
        sim.damage_store(&archive, profile.voxel_mode, tile_loss, bitflip)?;

        let ok = match pipeline::decode_archive(&archive, &restored, &DecodeOptions { soft: true })
        {
            Ok(report) => report.all_files_ok(),
            Err(err) => {
                tracing::info!(run, %err, "run failed to decode");
                false
            }
        };
        if ok {
            recovered += 1;
        }
        println!("run {:>3}: {}", run, if ok { "recovered" } else { "lost" });
    }
    println!(
        "profile {} | tile-loss {} | bitflip {} | recovery {}/{} ({:.1}%)",
        profile_tag,
        tile_loss,
        bitflip,
        recovered,
        runs,
        100.0 * recovered as f64 / runs.max(1) as f64
    );
    Ok(0)
}

fn write_synthetic_folder(dir: &Path, seed: u64) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    let random: Vec<u8> = (0..48 * 1024).map(|_| rng.gen()).collect();
    std::fs::write(dir.join("payload.bin"), random)?;
    std::fs::write(
        dir.join("notes.txt"),
        "Synthetic archive payload for channel sweeps.\n".repeat(64),
    )?;
    std::fs::write(dir.join("empty.dat"), b"")?;
    Ok(())
}

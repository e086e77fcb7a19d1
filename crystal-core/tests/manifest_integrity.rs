use crystal_core::error::ArchiveError;
use crystal_core::manifest::{Manifest, MANIFEST_FILE};
use crystal_core::pipeline::{self, EncodeOptions};
use crystal_core::sign;

fn encoded_archive(td: &tempfile::TempDir) -> std::path::PathBuf {
    let src = td.path().join("src");
    std::fs::create_dir(&src).unwrap();
    std::fs::write(src.join("a.txt"), b"Hello World").unwrap();
    std::fs::write(src.join("b.txt"), b"Test content").unwrap();
    let archive = td.path().join("archive");
    pipeline::encode_folder(&src, &archive, &EncodeOptions::default()).unwrap();
    archive
}

#[test]
fn save_load_is_identity() {
    let td = tempfile::tempdir().unwrap();
    let archive = encoded_archive(&td);
    let path = archive.join(MANIFEST_FILE);
    let mut loaded = Manifest::load(&path).unwrap();

    let copy = td.path().join("copy.json");
    loaded.save(&copy).unwrap();
    let reloaded = Manifest::load(&copy).unwrap();
    assert_eq!(reloaded, loaded);
}

#[test]
fn hash_excludes_the_integrity_block() {
    let td = tempfile::tempdir().unwrap();
    let archive = encoded_archive(&td);
    let manifest = Manifest::load(&archive.join(MANIFEST_FILE)).unwrap();
    let mut mutated = manifest.clone();
    mutated.integrity.merkle_root = "00".repeat(32);
    assert_eq!(manifest.compute_hash().unwrap(), mutated.compute_hash().unwrap());
}

#[test]
fn tampering_any_recorded_field_is_detected() {
    let td = tempfile::tempdir().unwrap();
    let archive = encoded_archive(&td);
    let path = archive.join(MANIFEST_FILE);

    // Flip one hex digit of files[0].sha256 in the serialized form.
    let mut value: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    let sha = value["files"][0]["sha256"].as_str().unwrap();
    let flipped = if sha.starts_with('0') {
        format!("1{}", &sha[1..])
    } else {
        format!("0{}", &sha[1..])
    };
    value["files"][0]["sha256"] = serde_json::Value::String(flipped);
    std::fs::write(&path, serde_json::to_string_pretty(&value).unwrap()).unwrap();

    assert!(matches!(Manifest::load(&path).unwrap_err(), ArchiveError::ManifestTampered));
}

#[test]
fn unparseable_manifest_is_tampered() {
    let td = tempfile::tempdir().unwrap();
    let path = td.path().join("manifest.json");
    std::fs::write(&path, b"{ not json").unwrap();
    assert!(matches!(Manifest::load(&path).unwrap_err(), ArchiveError::ManifestTampered));
}

#[test]
fn signature_survives_save_and_detects_tamper() {
    use rand::SeedableRng;
    let td = tempfile::tempdir().unwrap();
    let src = td.path().join("src");
    std::fs::create_dir(&src).unwrap();
    std::fs::write(src.join("a.txt"), b"signed payload").unwrap();
    let archive = td.path().join("archive");

    let mut rng = rand_chacha::ChaCha20Rng::seed_from_u64(99);
    let key = ed25519_dalek::SigningKey::generate(&mut rng);
    let opts = EncodeOptions { profile: "A".into(), seed: 1, sign_key: Some(key) };
    pipeline::encode_folder(&src, &archive, &opts).unwrap();

    let manifest = Manifest::load(&archive.join(MANIFEST_FILE)).unwrap();
    assert!(sign::verify_manifest(&manifest).unwrap());

    let mut forged = manifest.clone();
    let block = forged.integrity.signature.as_mut().unwrap();
    let mut sig = hex::decode(&block.signature).unwrap();
    sig[0] ^= 1;
    block.signature = hex::encode(sig);
    assert!(!sign::verify_manifest(&forged).unwrap());
}

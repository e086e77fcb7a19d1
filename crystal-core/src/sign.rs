use crate::error::{ArchiveError, Result};
use crate::manifest::{Manifest, SignatureBlock};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};

/// Sign the manifest self-hash and embed the signature block. The hash must
/// already be stamped (the integrity block is excluded from it, so adding
/// the signature does not disturb it).
pub fn sign_manifest(manifest: &mut Manifest, key: &SigningKey) -> Result<()> {
    let digest = hash_bytes(&manifest.integrity.manifest_hash)?;
    let sig = key.sign(&digest);
    manifest.integrity.signature = Some(SignatureBlock {
        algorithm: "Ed25519".into(),
        public_key: hex::encode(key.verifying_key().to_bytes()),
        signature: hex::encode(sig.to_bytes()),
    });
    Ok(())
}

/// Verify an embedded signature against the manifest self-hash using the
/// embedded public key. Trust in that key is the reader's concern.
pub fn verify_manifest(manifest: &Manifest) -> Result<bool> {
    let Some(block) = &manifest.integrity.signature else {
        return Ok(false);
    };
    if block.algorithm != "Ed25519" {
        return Err(ArchiveError::ManifestTampered);
    }
    let digest = hash_bytes(&manifest.integrity.manifest_hash)?;
    let pk_bytes: [u8; 32] = hex::decode(&block.public_key)
        .ok()
        .and_then(|v| v.try_into().ok())
        .ok_or(ArchiveError::ManifestTampered)?;
    let sig_bytes: [u8; 64] = hex::decode(&block.signature)
        .ok()
        .and_then(|v| v.try_into().ok())
        .ok_or(ArchiveError::ManifestTampered)?;
    let key = VerifyingKey::from_bytes(&pk_bytes).map_err(|_| ArchiveError::ManifestTampered)?;
    Ok(key.verify(&digest, &Signature::from_bytes(&sig_bytes)).is_ok())
}

fn hash_bytes(hex_hash: &str) -> Result<Vec<u8>> {
    hex::decode(hex_hash).map_err(|_| ArchiveError::ManifestTampered)
}

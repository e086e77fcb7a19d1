use crate::error::{ArchiveError, Result};
use crate::hashing;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

/// Leading magic of the packed blob.
pub const BLOB_MAGIC: &[u8; 8] = b"CRYSTAL\0";

const FILE_MARKER: &[u8; 5] = b"FILE\0";

/// One archived file, identified by its forward-slash relative path.
/// The entry list is ordered lexicographically by path; that order is part
/// of the archive identity.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct FileEntry {
    pub path: String,
    pub size: u64,
    pub sha256: String,
}

/// A record located inside a packed blob: its entry plus the byte range of
/// the file content.
#[derive(Debug, Clone)]
pub struct BlobRecord {
    pub entry: FileEntry,
    pub offset: usize,
}

/// Serialize a directory tree into the framed blob layout.
///
/// Files are walked in sorted relative-path order. Any unreadable file fails
/// the pack; there is no silent skip.
pub fn pack_folder(folder: &Path) -> Result<(Vec<u8>, Vec<FileEntry>)> {
    if !folder.is_dir() {
        return Err(ArchiveError::IoFailure {
            context: format!("source folder {:?}", folder),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"),
        });
    }

    let mut rel_paths: Vec<(String, PathBuf)> = Vec::new();
    for ent in walkdir::WalkDir::new(folder).min_depth(1) {
        let ent = ent.map_err(|e| ArchiveError::IoFailure {
            context: format!("walk {:?}", folder),
            source: e.into(),
        })?;
        if !ent.file_type().is_file() {
            continue;
        }
        let rel = ent
            .path()
            .strip_prefix(folder)
            .expect("walked path is under the walk root");
        rel_paths.push((normalize_rel_path(rel), ent.path().to_path_buf()));
    }
    rel_paths.sort_by(|a, b| a.0.cmp(&b.0));

    let mut blob = Vec::new();
    blob.extend_from_slice(BLOB_MAGIC);
    let mut entries = Vec::with_capacity(rel_paths.len());
    for (rel, abs) in rel_paths {
        let data = std::fs::read(&abs).map_err(ArchiveError::io(format!("read {:?}", abs)))?;
        blob.extend_from_slice(FILE_MARKER);
        blob.extend_from_slice(rel.as_bytes());
        blob.push(0);
        blob.extend_from_slice(&(data.len() as u64).to_be_bytes());
        blob.extend_from_slice(&data);
        entries.push(FileEntry {
            path: rel,
            size: data.len() as u64,
            sha256: hashing::sha256_hex(&data),
        });
    }
    Ok((blob, entries))
}

/// Walk the record frames of a packed blob without writing anything.
/// Rejects a missing magic, a truncated record, or an unsafe path.
pub fn parse_blob(blob: &[u8]) -> Result<Vec<BlobRecord>> {
    if blob.len() < BLOB_MAGIC.len() || &blob[..BLOB_MAGIC.len()] != BLOB_MAGIC {
        return Err(ArchiveError::MalformedBlob("missing CRYSTAL magic".into()));
    }
    let mut records = Vec::new();
    let mut pos = BLOB_MAGIC.len();
    while pos < blob.len() {
        if pos + FILE_MARKER.len() > blob.len() || &blob[pos..pos + FILE_MARKER.len()] != FILE_MARKER {
            return Err(ArchiveError::MalformedBlob(format!(
                "expected FILE marker at offset {}",
                pos
            )));
        }
        pos += FILE_MARKER.len();

        let name_end = blob[pos..]
            .iter()
            .position(|&b| b == 0)
            .map(|i| pos + i)
            .ok_or_else(|| ArchiveError::MalformedBlob("unterminated path".into()))?;
        let path = std::str::from_utf8(&blob[pos..name_end])
            .map_err(|_| ArchiveError::MalformedBlob("path is not valid UTF-8".into()))?
            .to_string();
        validate_rel_path(&path)?;
        pos = name_end + 1;

        if pos + 8 > blob.len() {
            return Err(ArchiveError::MalformedBlob(format!(
                "truncated size field for {:?}",
                path
            )));
        }
        let size = u64::from_be_bytes(blob[pos..pos + 8].try_into().unwrap());
        pos += 8;

        let size_usize = usize::try_from(size)
            .map_err(|_| ArchiveError::MalformedBlob(format!("record size overflow for {:?}", path)))?;
        if pos + size_usize > blob.len() {
            return Err(ArchiveError::MalformedBlob(format!(
                "truncated content for {:?} (want {} bytes)",
                path, size
            )));
        }
        let data = &blob[pos..pos + size_usize];
        records.push(BlobRecord {
            entry: FileEntry { path, size, sha256: hashing::sha256_hex(data) },
            offset: pos,
        });
        pos += size_usize;
    }
    Ok(records)
}

/// Deserialize a packed blob back into files under `output`, creating parent
/// directories as needed. Returns the entries in archive order.
pub fn unpack_blob(blob: &[u8], output: &Path) -> Result<Vec<FileEntry>> {
    let records = parse_blob(blob)?;
    std::fs::create_dir_all(output).map_err(ArchiveError::io(format!("create {:?}", output)))?;
    let mut entries = Vec::with_capacity(records.len());
    for rec in records {
        let dest = output.join(&rec.entry.path);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)
                .map_err(ArchiveError::io(format!("create {:?}", parent)))?;
        }
        let data = &blob[rec.offset..rec.offset + rec.entry.size as usize];
        std::fs::write(&dest, data).map_err(ArchiveError::io(format!("write {:?}", dest)))?;
        entries.push(rec.entry);
    }
    Ok(entries)
}

/// Host path -> forward-slash archive path.
fn normalize_rel_path(rel: &Path) -> String {
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    parts.join("/")
}

/// Archive paths must stay under the extraction root: relative, no `..`.
fn validate_rel_path(path: &str) -> Result<()> {
    let p = Path::new(path);
    if path.is_empty() || p.is_absolute() || path.starts_with('/') {
        return Err(ArchiveError::MalformedBlob(format!("unsafe path {:?}", path)));
    }
    for comp in p.components() {
        if matches!(comp, Component::ParentDir | Component::RootDir | Component::Prefix(_)) {
            return Err(ArchiveError::MalformedBlob(format!("unsafe path {:?}", path)));
        }
    }
    Ok(())
}

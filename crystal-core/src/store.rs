use crate::error::{ArchiveError, Result};
use crate::geometry::Tile;
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Tile container magic.
const TILE_MAGIC: &[u8; 8] = b"CRVOXEL\0";

/// Subdirectory of the archive holding the voxel store.
pub const VOXEL_DIR: &str = "voxels";

pub fn plane_dir(plane_id: u32) -> String {
    format!("plane_{plane_id:03}")
}

pub fn tile_file(tile_id: u32) -> String {
    format!("tile_{tile_id:04}.cvt")
}

pub fn tile_path(archive_dir: &Path, plane_id: u32, tile_id: u32) -> PathBuf {
    archive_dir.join(VOXEL_DIR).join(plane_dir(plane_id)).join(tile_file(tile_id))
}

/// Write one tile container: magic, u32 LE payload length, bincode payload,
/// crc32 trailer over the payload.
pub fn write_tile(archive_dir: &Path, tile: &Tile) -> Result<()> {
    let path = tile_path(archive_dir, tile.plane_id, tile.tile_id);
    let parent = path.parent().expect("tile path has a parent");
    std::fs::create_dir_all(parent).map_err(ArchiveError::io(format!("create {:?}", parent)))?;
    let payload = bincode::serialize(tile).map_err(|e| ArchiveError::IoFailure {
        context: format!("serialize tile {}/{}", tile.plane_id, tile.tile_id),
        source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
    })?;
    let mut h = crc32fast::Hasher::new();
    h.update(&payload);
    let crc = h.finalize();

    let mut f = File::create(&path).map_err(ArchiveError::io(format!("create {:?}", path)))?;
    f.write_all(TILE_MAGIC).map_err(ArchiveError::io("write tile magic"))?;
    f.write_all(&(payload.len() as u32).to_le_bytes())
        .map_err(ArchiveError::io("write tile length"))?;
    f.write_all(&payload).map_err(ArchiveError::io("write tile payload"))?;
    f.write_all(&crc.to_le_bytes()).map_err(ArchiveError::io("write tile crc"))?;
    Ok(())
}

/// Read one tile container, validating magic, length, and CRC. Any
/// malformation is an error; the caller treats the tile as lost.
pub fn read_tile(path: &Path) -> Result<Tile> {
    let mut buf = Vec::new();
    File::open(path)
        .and_then(|mut f| f.read_to_end(&mut buf))
        .map_err(ArchiveError::io(format!("read {:?}", path)))?;
    let malformed = |what: &str| ArchiveError::MalformedBlob(format!("{what} in {:?}", path));
    if buf.len() < TILE_MAGIC.len() + 8 || &buf[..TILE_MAGIC.len()] != TILE_MAGIC {
        return Err(malformed("bad tile magic"));
    }
    let len = u32::from_le_bytes(buf[8..12].try_into().unwrap()) as usize;
    if buf.len() != 12 + len + 4 {
        return Err(malformed("bad tile length"));
    }
    let payload = &buf[12..12 + len];
    let stored_crc = u32::from_le_bytes(buf[12 + len..].try_into().unwrap());
    let mut h = crc32fast::Hasher::new();
    h.update(payload);
    if h.finalize() != stored_crc {
        return Err(malformed("tile crc mismatch"));
    }
    bincode::deserialize(payload).map_err(|_| malformed("undecodable tile payload"))
}

/// Scan the voxel store, returning every readable tile and the count of
/// unreadable ones. Read order does not matter; the decoder sorts by sync
/// header before flattening.
pub fn scan_tiles(archive_dir: &Path) -> Result<(Vec<Tile>, usize)> {
    let root = archive_dir.join(VOXEL_DIR);
    let mut tiles = Vec::new();
    let mut unreadable = 0usize;
    if !root.is_dir() {
        return Err(ArchiveError::IoFailure {
            context: format!("voxel store {:?}", root),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "missing voxels directory"),
        });
    }
    for ent in walkdir::WalkDir::new(&root).min_depth(2).max_depth(2).sort_by_file_name() {
        let ent = ent.map_err(|e| ArchiveError::IoFailure {
            context: format!("scan {:?}", root),
            source: e.into(),
        })?;
        if !ent.file_type().is_file() {
            continue;
        }
        if ent.path().extension().map(|e| e == "cvt") != Some(true) {
            continue;
        }
        match read_tile(ent.path()) {
            Ok(tile) => tiles.push(tile),
            Err(err) => {
                tracing::warn!(path = ?ent.path(), %err, "dropping unreadable tile");
                unreadable += 1;
            }
        }
    }
    Ok((tiles, unreadable))
}

/// Paths of every tile file currently in the store.
pub fn list_tile_paths(archive_dir: &Path) -> Result<Vec<PathBuf>> {
    let root = archive_dir.join(VOXEL_DIR);
    let mut paths = Vec::new();
    for ent in walkdir::WalkDir::new(&root).min_depth(2).max_depth(2).sort_by_file_name() {
        let ent = ent.map_err(|e| ArchiveError::IoFailure {
            context: format!("scan {:?}", root),
            source: e.into(),
        })?;
        if ent.file_type().is_file() && ent.path().extension().map(|e| e == "cvt") == Some(true) {
            paths.push(ent.path().to_path_buf());
        }
    }
    Ok(paths)
}

use serde::{Deserialize, Serialize};

/// Symbols per tile.
pub const TILE_SYMBOLS: usize = 256;
/// Tiles per plane, laid out row-major on an 8x8 grid.
pub const TILES_PER_PLANE: usize = 64;
pub const TILES_X: usize = 8;
pub const TILES_Y: usize = 8;

/// One read-out tile: a sync header plus up to `TILE_SYMBOLS` voxels. The
/// header lets a reader place survivors even when tiles arrive out of order
/// or some are lost.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Tile {
    pub tile_id: u32,
    pub plane_id: u32,
    pub profile_tag: u8,
    pub symbols: Vec<u8>,
    pub angles: Vec<f32>,
    pub retardances: Vec<f32>,
}

impl Tile {
    /// Global position of this tile's first symbol.
    pub fn symbol_offset(&self) -> usize {
        (self.plane_id as usize * TILES_PER_PLANE + self.tile_id as usize) * TILE_SYMBOLS
    }
}

/// Symbol stream rebuilt from surviving tiles, with a per-symbol presence
/// mask marking the gaps left by lost tiles.
pub struct Flattened {
    pub angles: Vec<f32>,
    pub retardances: Vec<f32>,
    pub present: Vec<bool>,
    pub tiles_placed: usize,
    pub tiles_dropped: usize,
}

/// Expected tile count for a symbol stream.
pub fn tile_count(total_symbols: usize) -> usize {
    total_symbols.div_ceil(TILE_SYMBOLS)
}

/// Expected plane count for a symbol stream.
pub fn plane_count(total_symbols: usize) -> usize {
    tile_count(total_symbols).div_ceil(TILES_PER_PLANE)
}

/// Group a voxel stream into tiles in deterministic row-major order.
pub fn layout(
    symbols: &[u8],
    angles: &[f32],
    retardances: &[f32],
    profile_tag: u8,
) -> Vec<Tile> {
    assert_eq!(symbols.len(), angles.len());
    assert_eq!(symbols.len(), retardances.len());
    let mut tiles = Vec::with_capacity(tile_count(symbols.len()));
    for (global, start) in (0..symbols.len()).step_by(TILE_SYMBOLS).enumerate() {
        let end = (start + TILE_SYMBOLS).min(symbols.len());
        tiles.push(Tile {
            tile_id: (global % TILES_PER_PLANE) as u32,
            plane_id: (global / TILES_PER_PLANE) as u32,
            profile_tag,
            symbols: symbols[start..end].to_vec(),
            angles: angles[start..end].to_vec(),
            retardances: retardances[start..end].to_vec(),
        });
    }
    tiles
}

/// Flatten surviving tiles back into the symbol stream. Tiles are sorted by
/// `(plane_id, tile_id)`; a tile with a foreign profile tag, an
/// out-of-range position, or an inconsistent payload length is dropped and
/// its span stays a gap.
pub fn flatten(tiles: &[Tile], total_symbols: usize, profile_tag: u8) -> Flattened {
    let mut out = Flattened {
        angles: vec![0.0; total_symbols],
        retardances: vec![0.0; total_symbols],
        present: vec![false; total_symbols],
        tiles_placed: 0,
        tiles_dropped: 0,
    };
    let mut order: Vec<&Tile> = tiles.iter().collect();
    order.sort_by_key(|t| (t.plane_id, t.tile_id));
    for tile in order {
        let start = tile.symbol_offset();
        let expected = TILE_SYMBOLS.min(total_symbols.saturating_sub(start));
        let consistent = tile.profile_tag == profile_tag
            && tile.tile_id < TILES_PER_PLANE as u32
            && expected > 0
            && tile.angles.len() == expected
            && tile.retardances.len() == expected
            && tile.symbols.len() == expected;
        if !consistent {
            out.tiles_dropped += 1;
            continue;
        }
        out.angles[start..start + expected].copy_from_slice(&tile.angles);
        out.retardances[start..start + expected].copy_from_slice(&tile.retardances);
        for p in &mut out.present[start..start + expected] {
            *p = true;
        }
        out.tiles_placed += 1;
    }
    out
}

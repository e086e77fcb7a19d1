use crystal_core::channel::ChannelSimulator;
use crystal_core::pipeline::{self, EncodeOptions};
use crystal_core::store;
use crystal_core::voxel::VoxelMode;

fn encoded_archive(td: &tempfile::TempDir) -> std::path::PathBuf {
    let src = td.path().join("src");
    std::fs::create_dir(&src).unwrap();
    std::fs::write(src.join("payload.bin"), vec![0xC7u8; 16 * 1024]).unwrap();
    let archive = td.path().join("archive");
    pipeline::encode_folder(&src, &archive, &EncodeOptions::default()).unwrap();
    archive
}

#[test]
fn damage_is_seed_deterministic() {
    let mut a = ChannelSimulator::new(5);
    let mut b = ChannelSimulator::new(5);
    let mut bits_a = vec![0u8; 10_000];
    let mut bits_b = vec![0u8; 10_000];
    let fa = a.flip_bits(&mut bits_a, 0.01);
    let fb = b.flip_bits(&mut bits_b, 0.01);
    assert_eq!(fa, fb);
    assert_eq!(bits_a, bits_b);
    assert!(fa > 0);
}

#[test]
fn tile_erasure_breaks_the_container_and_returns_a_mask() {
    let td = tempfile::tempdir().unwrap();
    let archive = encoded_archive(&td);
    let total = store::list_tile_paths(&archive).unwrap().len();

    let mut sim = ChannelSimulator::new(6);
    let stats = sim.damage_store(&archive, VoxelMode::ThreeBit, 0.25, 0.0).unwrap();
    let expected = (total as f64 * 0.25).floor() as usize;
    assert_eq!(stats.tiles_erased.len(), expected);
    assert_eq!(stats.tiles_total, total);

    let (tiles, unreadable) = store::scan_tiles(&archive).unwrap();
    assert_eq!(unreadable, expected);
    assert_eq!(tiles.len(), total - expected);
    // The surviving sync headers exclude every erased tile.
    for tile in &tiles {
        assert!(!stats.tiles_erased.contains(&(tile.plane_id, tile.tile_id)));
    }
}

#[test]
fn bitflips_keep_voxels_on_reference_points() {
    let td = tempfile::tempdir().unwrap();
    let archive = encoded_archive(&td);
    let mut sim = ChannelSimulator::new(7);
    let stats = sim.damage_store(&archive, VoxelMode::ThreeBit, 0.0, 0.02).unwrap();
    assert!(stats.bits_flipped > 0);

    let mode = VoxelMode::ThreeBit;
    let (tiles, unreadable) = store::scan_tiles(&archive).unwrap();
    assert_eq!(unreadable, 0);
    for tile in &tiles {
        for (&angle, &ret) in tile.angles.iter().zip(&tile.retardances) {
            assert!(mode.angle_refs().contains(&angle));
            assert!(mode.retardance_refs().contains(&ret));
        }
    }
}

#[test]
fn gaussian_noise_stays_in_physical_range() {
    let mut sim = ChannelSimulator::new(8);
    let mut angles = vec![45.0f32; 2000];
    let mut rets = vec![0.75f32; 2000];
    sim.gaussian_noise(&mut angles, &mut rets, 2.0, 0.05);
    assert!(rets.iter().all(|&r| (0.0..=1.0).contains(&r)));
    // Noise actually moved something.
    assert!(angles.iter().any(|&a| (a - 45.0).abs() > 1e-3));
}

#[test]
fn drift_is_systematic() {
    let mut sim = ChannelSimulator::new(9);
    let mut angles = vec![0.0f32, 45.0, 90.0];
    let mut rets = vec![0.25f32, 0.5, 0.75];
    sim.calibration_drift(&mut angles, &mut rets, 3.0, 0.0);
    assert_eq!(angles, vec![3.0, 48.0, 93.0]);
    // Zero gain sigma leaves retardance untouched.
    assert_eq!(rets, vec![0.25, 0.5, 0.75]);
}

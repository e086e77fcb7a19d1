use crystal_core::ldpc::{bits_to_bytes, bytes_to_bits, LdpcCode};
use rand::{rngs::StdRng, Rng, SeedableRng};

fn random_bits(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len).map(|_| rng.gen_range(0..=1u8)).collect()
}

#[test]
fn bit_packing_roundtrips() {
    let bytes: Vec<u8> = (0..=255).collect();
    assert_eq!(bits_to_bytes(&bytes_to_bits(&bytes)), bytes);
    // MSB-first convention.
    assert_eq!(bytes_to_bits(&[0b1010_0001])[..4], [1, 0, 1, 0]);
}

#[test]
fn matrix_generation_is_deterministic() {
    let a = LdpcCode::new(1024, 768, 42);
    let b = LdpcCode::new(1024, 768, 42);
    let info = random_bits(768, 1);
    assert_eq!(a.encode(&info), b.encode(&info));
    let c = LdpcCode::new(1024, 768, 43);
    assert_ne!(a.encode(&info), c.encode(&info));
}

#[test]
fn clean_codeword_decodes_immediately() {
    for (n, k) in [(1024, 768), (1024, 849)] {
        let code = LdpcCode::new(n, k, 42);
        let info = random_bits(k, 2);
        let codeword = code.encode(&info);
        assert_eq!(codeword.len(), n);
        let (decoded, ok) = code.decode_hard(&codeword, 50);
        assert!(ok);
        assert_eq!(decoded, info);
    }
}

#[test]
fn any_single_bit_flip_is_corrected() {
    let code = LdpcCode::new(1024, 768, 42);
    let info = random_bits(768, 3);
    let codeword = code.encode(&info);
    for pos in 0..codeword.len() {
        let mut damaged = codeword.clone();
        damaged[pos] ^= 1;
        let (decoded, ok) = code.decode_hard(&damaged, 50);
        assert!(ok, "flip at {pos} not corrected");
        assert_eq!(decoded, info, "flip at {pos} decoded wrong");
    }
}

#[test]
fn hard_decoder_reports_failure_on_heavy_damage() {
    let code = LdpcCode::new(1024, 768, 42);
    let info = random_bits(768, 4);
    let mut damaged = code.encode(&info);
    let mut rng = StdRng::seed_from_u64(5);
    for bit in damaged.iter_mut() {
        if rng.gen::<f64>() < 0.25 {
            *bit ^= 1;
        }
    }
    let (_, ok) = code.decode_hard(&damaged, 50);
    assert!(!ok);
}

#[test]
fn soft_decoder_fixes_scattered_flips() {
    let code = LdpcCode::new(1024, 768, 42);
    let info = random_bits(768, 6);
    let mut damaged = code.encode(&info);
    for pos in [11usize, 200, 423, 700, 999] {
        damaged[pos] ^= 1;
    }
    let llrs: Vec<f64> = damaged.iter().map(|&b| if b == 0 { 4.0 } else { -4.0 }).collect();
    let (decoded, posterior, ok) = code.decode_soft(&llrs, 50, true);
    assert!(ok);
    assert_eq!(decoded, info);
    assert_eq!(posterior.len(), 1024);
}

#[test]
fn soft_decoder_fills_erasures() {
    let code = LdpcCode::new(1024, 768, 42);
    let info = random_bits(768, 7);
    let codeword = code.encode(&info);
    let mut rng = StdRng::seed_from_u64(8);
    let llrs: Vec<f64> = codeword
        .iter()
        .map(|&b| {
            if rng.gen::<f64>() < 0.10 {
                0.0 // erased position: no channel information
            } else if b == 0 {
                4.0
            } else {
                -4.0
            }
        })
        .collect();
    let (decoded, _, ok) = code.decode_soft(&llrs, 50, true);
    assert!(ok);
    assert_eq!(decoded, info);
}

#[test]
fn sum_product_variant_matches_on_light_damage() {
    let code = LdpcCode::new(1024, 768, 42);
    let info = random_bits(768, 9);
    let mut damaged = code.encode(&info);
    damaged[100] ^= 1;
    damaged[900] ^= 1;
    let llrs: Vec<f64> = damaged.iter().map(|&b| if b == 0 { 3.0 } else { -3.0 }).collect();
    let (decoded, _, ok) = code.decode_soft(&llrs, 50, false);
    assert!(ok);
    assert_eq!(decoded, info);
}

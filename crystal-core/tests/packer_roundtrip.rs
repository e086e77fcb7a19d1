use crystal_core::error::ArchiveError;
use crystal_core::packer;

#[test]
fn pack_unpack_roundtrip_preserves_bytes_and_order() {
    let td = tempfile::tempdir().unwrap();
    let src = td.path().join("src");
    std::fs::create_dir_all(src.join("nested/deep")).unwrap();
    std::fs::write(src.join("b.txt"), b"Test content").unwrap();
    std::fs::write(src.join("a.txt"), b"Hello World").unwrap();
    std::fs::write(src.join("nested/deep/c.bin"), vec![0xABu8; 5000]).unwrap();
    std::fs::write(src.join("nested/empty.dat"), b"").unwrap();

    let (blob, entries) = packer::pack_folder(&src).unwrap();
    assert!(blob.starts_with(b"CRYSTAL\0"));
    // Lexicographic by forward-slash path.
    let paths: Vec<&str> = entries.iter().map(|e| e.path.as_str()).collect();
    assert_eq!(paths, vec!["a.txt", "b.txt", "nested/deep/c.bin", "nested/empty.dat"]);
    assert_eq!(entries[3].size, 0);

    let out = td.path().join("out");
    let unpacked = packer::unpack_blob(&blob, &out).unwrap();
    assert_eq!(unpacked, entries);
    for e in &entries {
        let data = std::fs::read(out.join(&e.path)).unwrap();
        assert_eq!(data.len() as u64, e.size);
        assert_eq!(crystal_core::hashing::sha256_hex(&data), e.sha256);
    }
}

#[test]
fn empty_folder_packs_to_bare_magic() {
    let td = tempfile::tempdir().unwrap();
    let src = td.path().join("src");
    std::fs::create_dir(&src).unwrap();
    let (blob, entries) = packer::pack_folder(&src).unwrap();
    assert_eq!(blob, b"CRYSTAL\0");
    assert!(entries.is_empty());
    assert!(packer::parse_blob(&blob).unwrap().is_empty());
}

#[test]
fn bad_magic_is_malformed() {
    let err = packer::parse_blob(b"NOTCRYST").unwrap_err();
    assert!(matches!(err, ArchiveError::MalformedBlob(_)));
}

#[test]
fn truncated_record_is_malformed() {
    let td = tempfile::tempdir().unwrap();
    let src = td.path().join("src");
    std::fs::create_dir(&src).unwrap();
    std::fs::write(src.join("f.bin"), vec![7u8; 1000]).unwrap();
    let (blob, _) = packer::pack_folder(&src).unwrap();

    // Chop the content short.
    let cut = packer::parse_blob(&blob[..blob.len() - 10]);
    assert!(matches!(cut.unwrap_err(), ArchiveError::MalformedBlob(_)));

    // Chop inside the size field.
    let header_end = 8 + 5 + "f.bin".len() + 1 + 4;
    let cut = packer::parse_blob(&blob[..header_end]);
    assert!(matches!(cut.unwrap_err(), ArchiveError::MalformedBlob(_)));
}

#[test]
fn traversal_paths_are_rejected() {
    let mut blob = Vec::new();
    blob.extend_from_slice(b"CRYSTAL\0");
    blob.extend_from_slice(b"FILE\0");
    blob.extend_from_slice(b"../evil");
    blob.push(0);
    blob.extend_from_slice(&4u64.to_be_bytes());
    blob.extend_from_slice(b"ha!!");
    assert!(matches!(packer::parse_blob(&blob).unwrap_err(), ArchiveError::MalformedBlob(_)));
}

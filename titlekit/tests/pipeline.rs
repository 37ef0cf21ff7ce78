use std::fs;
use std::path::Path;

use titlekit::decrypt::{self, Never};
use titlekit::fst::{self, ExtractOptions};
use titlekit::manifest::DecryptionContext;
use titlekit::sig::SignatureType;

fn write_fixture_title(dir: &Path, contents: &[(u32, u16, u16, u64, [u8; 20])]) {
    let body_offset = SignatureType::Rsa2048Sha1.body_offset();

    let mut tik = vec![0u8; body_offset + 0x5C + 8];
    tik[0..4].copy_from_slice(&0x0001_0001u32.to_be_bytes());

    let table_start = body_offset + 0x984;
    let mut tmd = vec![0u8; table_start + 48 * contents.len()];
    tmd[0..4].copy_from_slice(&0x0001_0001u32.to_be_bytes());
    tmd[body_offset + 0x5E..body_offset + 0x5E + 2]
        .copy_from_slice(&(contents.len() as u16).to_be_bytes());

    for (i, (id, idx, ty, size, hash)) in contents.iter().enumerate() {
        let off = table_start + i * 48;
        tmd[off..off + 4].copy_from_slice(&id.to_be_bytes());
        tmd[off + 4..off + 6].copy_from_slice(&idx.to_be_bytes());
        tmd[off + 6..off + 8].copy_from_slice(&ty.to_be_bytes());
        tmd[off + 8..off + 16].copy_from_slice(&size.to_be_bytes());
        tmd[off + 16..off + 36].copy_from_slice(hash);
    }

    fs::write(dir.join("title.tik"), tik).unwrap();
    fs::write(dir.join("title.tmd"), tmd).unwrap();
}

#[test]
fn decrypt_flat_content_succeeds_with_hash_warning_on_garbage_ciphertext() {
    let dir = tempfile::tempdir().unwrap();
    write_fixture_title(dir.path(), &[(0, 0, 0x0, 64, [0u8; 20])]);

    fs::write(dir.path().join("00000000.app"), vec![0xABu8; 64]).unwrap();

    let mut warnings = Vec::new();
    let ctx = DecryptionContext::load(dir.path(), &mut warnings).unwrap();

    let report = decrypt::decrypt_title(dir.path(), None, &ctx, false, &Never).unwrap();

    assert!(report.is_success());
    assert_eq!(report.decrypted, vec!["00000000".to_string()]);
    assert!(report
        .warnings
        .iter()
        .any(|w| matches!(w, titlekit::Warning::HashMismatch { .. })));
    assert!(dir.path().join("00000000.app.dec").exists());
    assert_eq!(
        fs::metadata(dir.path().join("00000000.app.dec"))
            .unwrap()
            .len(),
        64
    );
}

#[test]
fn decrypt_reports_missing_container_as_warning_not_error() {
    let dir = tempfile::tempdir().unwrap();
    write_fixture_title(dir.path(), &[(0, 0, 0x0, 64, [0u8; 20])]);
    // No 00000000.app written.

    let mut warnings = Vec::new();
    let ctx = DecryptionContext::load(dir.path(), &mut warnings).unwrap();
    let report = decrypt::decrypt_title(dir.path(), None, &ctx, false, &Never).unwrap();

    assert!(!report.is_success());
    assert!(report
        .warnings
        .iter()
        .any(|w| matches!(w, titlekit::Warning::MissingContainer { .. })));
}

#[test]
fn extract_walks_fst_and_copies_file_ranges_from_precomputed_dec_files() {
    let dir = tempfile::tempdir().unwrap();
    write_fixture_title(
        dir.path(),
        &[(0, 0, 0x0, 0, [0u8; 20]), (1, 1, 0x0, 10, [0u8; 20])],
    );

    // Content 0: a tiny FST with two files living in content 1.
    let entries_offset = 0x14usize;
    let total_entries = 3usize; // root + two files
    let names_offset = entries_offset + 16 * total_entries;
    let name_table = b"hello.txt\0world.txt\0";
    let mut fst = vec![0u8; names_offset + name_table.len()];

    fst[8..12].copy_from_slice(&0u32.to_be_bytes()); // exh_count = 0

    // root entry (index 0): dir, total_entries at +8
    fst[entries_offset + 8..entries_offset + 12]
        .copy_from_slice(&(total_entries as u32).to_be_bytes());
    fst[entries_offset] = 1; // type = directory

    // entry 1: "hello.txt", content 1, raw_off=0 (shifted), size=5
    let e1 = entries_offset + 16;
    fst[e1] = 0; // regular file
    fst[e1 + 1..e1 + 4].copy_from_slice(&0u32.to_be_bytes()[1..]); // name_off = 0
    fst[e1 + 4..e1 + 8].copy_from_slice(&0u32.to_be_bytes()); // raw_off = 0
    fst[e1 + 8..e1 + 12].copy_from_slice(&5u32.to_be_bytes()); // size = 5
    fst[e1 + 12..e1 + 14].copy_from_slice(&0u16.to_be_bytes()); // flags = 0 (shift)
    fst[e1 + 14..e1 + 16].copy_from_slice(&1u16.to_be_bytes()); // content_index = 1

    // entry 2: "world.txt", content 1, raw_off=5 (unshifted via flags&4), size=5
    let e2 = entries_offset + 32;
    fst[e2] = 0;
    let name_off_2 = "hello.txt\0".len() as u32;
    fst[e2 + 1..e2 + 4].copy_from_slice(&name_off_2.to_be_bytes()[1..]);
    fst[e2 + 4..e2 + 8].copy_from_slice(&5u32.to_be_bytes()); // raw_off = 5
    fst[e2 + 8..e2 + 12].copy_from_slice(&5u32.to_be_bytes()); // size = 5
    fst[e2 + 12..e2 + 14].copy_from_slice(&4u16.to_be_bytes()); // flags = 4 (no shift)
    fst[e2 + 14..e2 + 16].copy_from_slice(&1u16.to_be_bytes()); // content_index = 1

    fst[names_offset..].copy_from_slice(name_table);

    fs::write(dir.path().join("00000000.dec"), fst).unwrap();
    fs::write(dir.path().join("00000001.dec"), b"helloworld").unwrap();

    let mut warnings = Vec::new();
    let ctx = DecryptionContext::load(dir.path(), &mut warnings).unwrap();

    let out_dir = dir.path().join("extracted");
    let options = ExtractOptions::default();
    let report = fst::extract_title(dir.path(), &out_dir, ctx.manifest(), &options, &Never).unwrap();

    assert!(report.is_success());
    assert_eq!(report.extracted.len(), 2);
    assert_eq!(
        fs::read_to_string(out_dir.join("hello.txt")).unwrap(),
        "hello"
    );
    assert_eq!(
        fs::read_to_string(out_dir.join("world.txt")).unwrap(),
        "world"
    );
}

// Fault Injection Tests for CFile
// These tests damage files on disk and check that readers report corruption
// instead of returning wrong data

use cfile::cfile::footer::CFileFooter;
use cfile::cfile::index::IndexTreeReader;
use cfile::cfile::FOOTER_TRAILER_SIZE;
use cfile::{CFileReader, CFileWriter, CompressionType, DataType, Error, Value, WriterOptions};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn create_file(dir: &TempDir, compression: CompressionType) -> PathBuf {
    init_logging();
    let path = dir.path().join("faulty.cfile");
    let options = WriterOptions::new()
        .data_type(DataType::Int32)
        .compression(compression)
        .values_per_block(100);
    let mut writer = CFileWriter::create(&path, options).unwrap();
    let values: Vec<Value> = (0..1000).map(Value::Int).collect();
    writer.append(&values).unwrap();
    writer.finish().unwrap();
    path
}

fn flip_byte(path: &Path, offset: u64) {
    let mut bytes = fs::read(path).unwrap();
    bytes[offset as usize] ^= 0x5a;
    fs::write(path, bytes).unwrap();
}

/// Split a file into its bytes before the footer and its decoded footer
fn split_footer(path: &Path) -> (Vec<u8>, CFileFooter) {
    let bytes = fs::read(path).unwrap();
    let trailer_start = bytes.len() - FOOTER_TRAILER_SIZE;
    let footer_len = CFileFooter::decode_trailer(&bytes[trailer_start..]).unwrap();
    let footer_start = trailer_start - footer_len;
    let footer = CFileFooter::decode(&bytes[footer_start..trailer_start]).unwrap();
    (bytes[..footer_start].to_vec(), footer)
}

fn rewrite_footer(path: &Path, edit: impl FnOnce(&mut CFileFooter)) {
    let (mut bytes, mut footer) = split_footer(path);
    edit(&mut footer);
    bytes.extend_from_slice(&footer.encode().unwrap());
    fs::write(path, bytes).unwrap();
}

/// A damaged byte inside the third data block fails reads through that block
#[test]
fn test_corrupt_third_data_block() {
    let dir = TempDir::new().unwrap();
    let path = create_file(&dir, CompressionType::Snappy);

    let pointer = {
        let reader = CFileReader::open(&path).unwrap();
        let leaves =
            IndexTreeReader::new(&reader.footer().posidx_info).leaf_entries(&reader).unwrap();
        leaves[2].pointer
    };
    flip_byte(&path, pointer.offset + pointer.size / 2);

    let reader = CFileReader::open(&path).unwrap();
    assert_eq!(reader.seek_to_ordinal(150).unwrap().value(), Some(&Value::Int(150)));
    assert!(matches!(reader.seek_to_ordinal(250), Err(Error::Corruption(_))));

    // a scan running into the block fails too
    let mut cursor = reader.seek_to_ordinal(195).unwrap();
    assert!(matches!(cursor.next_batch(10), Err(Error::Corruption(_))));
}

/// Every single-byte flip inside a stored data block is detected
#[test]
fn test_every_byte_of_block_is_checked() {
    let dir = TempDir::new().unwrap();
    let path = create_file(&dir, CompressionType::None);
    let pristine = fs::read(&path).unwrap();

    let pointer = {
        let reader = CFileReader::open(&path).unwrap();
        IndexTreeReader::new(&reader.footer().posidx_info).leaf_entries(&reader).unwrap()[2].pointer
    };

    for offset in pointer.offset..pointer.end_offset() {
        fs::write(&path, &pristine).unwrap();
        flip_byte(&path, offset);
        let reader = CFileReader::open(&path).unwrap();
        let result = reader.seek_to_ordinal(250);
        assert!(
            matches!(result, Err(Error::Corruption(_))),
            "flip at offset {} went undetected",
            offset
        );
    }
}

/// Damage to an index block surfaces as corruption
#[test]
fn test_corrupt_index_block() {
    let dir = TempDir::new().unwrap();
    let path = create_file(&dir, CompressionType::None);

    let root = {
        let reader = CFileReader::open(&path).unwrap();
        reader.footer().posidx_info.root_block
    };
    flip_byte(&path, root.offset + 6);

    let reader = CFileReader::open(&path).unwrap();
    assert!(matches!(reader.seek_to_ordinal(0), Err(Error::Corruption(_))));
}

/// Broken trailer, footer or header bytes are rejected at open
#[test]
fn test_corrupt_footer_and_header() {
    let dir = TempDir::new().unwrap();
    let path = create_file(&dir, CompressionType::None);
    let pristine = fs::read(&path).unwrap();
    let len = pristine.len() as u64;

    // trailing magic
    flip_byte(&path, len - 1);
    assert!(matches!(CFileReader::open(&path), Err(Error::Corruption(_))));

    // footer body
    fs::write(&path, &pristine).unwrap();
    flip_byte(&path, len - FOOTER_TRAILER_SIZE as u64 - 10);
    assert!(matches!(CFileReader::open(&path), Err(Error::Corruption(_))));

    // footer length
    fs::write(&path, &pristine).unwrap();
    flip_byte(&path, len - FOOTER_TRAILER_SIZE as u64 + 3);
    assert!(matches!(CFileReader::open(&path), Err(Error::Corruption(_))));

    // leading magic
    fs::write(&path, &pristine).unwrap();
    flip_byte(&path, 0);
    assert!(matches!(CFileReader::open(&path), Err(Error::Corruption(_))));
}

/// Truncated files are rejected at open
#[test]
fn test_truncated_file() {
    let dir = TempDir::new().unwrap();
    let path = create_file(&dir, CompressionType::Lz4);
    let bytes = fs::read(&path).unwrap();

    for keep in [0, 5, 20, bytes.len() / 2, bytes.len() - 1] {
        fs::write(&path, &bytes[..keep]).unwrap();
        assert!(
            matches!(CFileReader::open(&path), Err(Error::Corruption(_))),
            "truncation to {} bytes accepted",
            keep
        );
    }
}

/// Unknown format tags map to the unsupported error kinds
#[test]
fn test_unknown_tags() {
    let dir = TempDir::new().unwrap();

    let path = create_file(&dir, CompressionType::None);
    rewrite_footer(&path, |footer| footer.encoding = 42);
    assert!(matches!(CFileReader::open(&path), Err(Error::UnsupportedEncoding(_))));

    let path = create_file(&dir, CompressionType::None);
    rewrite_footer(&path, |footer| footer.compression = 200);
    assert!(matches!(CFileReader::open(&path), Err(Error::UnsupportedCompression(_))));

    let path = create_file(&dir, CompressionType::None);
    rewrite_footer(&path, |footer| footer.data_type = 0);
    assert!(matches!(CFileReader::open(&path), Err(Error::Corruption(_))));
}

/// Block pointers outside the data region are rejected at open
#[test]
fn test_out_of_bounds_pointer() {
    let dir = TempDir::new().unwrap();
    let path = create_file(&dir, CompressionType::None);
    rewrite_footer(&path, |footer| footer.posidx_info.root_block.offset += 1 << 20);
    assert!(matches!(CFileReader::open(&path), Err(Error::Corruption(_))));
}

/// A dictionary pointer on a non-dictionary file is inconsistent
#[test]
fn test_dictionary_pointer_mismatch() {
    let dir = TempDir::new().unwrap();
    let path = create_file(&dir, CompressionType::None);
    rewrite_footer(&path, |footer| footer.dict_block_ptr = Some(footer.posidx_info.root_block));
    assert!(matches!(CFileReader::open(&path), Err(Error::Corruption(_))));
}

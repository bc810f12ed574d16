// Bloom Filter Tests for CFile
// Per-block filters must never reject a value the block holds

use cfile::cfile::compression::BlockCompressor;
use cfile::cfile::index::IndexTreeReader;
use cfile::filter::{BloomFilter, Filter};
use cfile::{CFileReader, CFileWriter, CompressionType, DataType, EncodingType, Value, WriterOptions};
use std::path::Path;
use tempfile::TempDir;

fn load_blooms(path: &Path, reader: &CFileReader) -> Vec<BloomFilter> {
    let bytes = std::fs::read(path).unwrap();
    let compressor = BlockCompressor::new(reader.footer_info().compression).unwrap();
    reader
        .footer()
        .bloom_block_ptrs
        .iter()
        .map(|p| {
            let raw = compressor.decompress(&bytes[p.offset as usize..p.end_offset() as usize]).unwrap();
            BloomFilter::decode(&raw).unwrap()
        })
        .collect()
}

/// Every stored value tests positive in its own block's filter
#[test]
fn test_no_false_negatives() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bloom.cfile");

    let values: Vec<Value> = (0..5000).map(|i| Value::from(format!("user{}", i * 13 % 4999))).collect();
    let options = WriterOptions::new()
        .data_type(DataType::String)
        .compression(CompressionType::Zstd)
        .values_per_block(250);
    let mut writer = CFileWriter::create(&path, options).unwrap();
    writer.append(&values).unwrap();
    writer.finish().unwrap();

    let reader = CFileReader::open(&path).unwrap();
    let blooms = load_blooms(&path, &reader);
    assert_eq!(blooms.len(), 20);

    for (i, value) in values.iter().enumerate() {
        assert!(
            blooms[i / 250].may_contain(&value.encode_key()),
            "false negative for {:?} in block {}",
            value,
            i / 250
        );
    }
}

/// Absent values are mostly rejected at the configured rate
#[test]
fn test_false_positive_rate() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("fp.cfile");

    let values: Vec<Value> = (0..10_000).map(|i| Value::Int(i * 2)).collect();
    let options = WriterOptions::new().data_type(DataType::Int64).values_per_block(1000).bloom_fp_rate(0.01);
    let mut writer = CFileWriter::create(&path, options).unwrap();
    writer.append(&values).unwrap();
    writer.finish().unwrap();

    let reader = CFileReader::open(&path).unwrap();
    let blooms = load_blooms(&path, &reader);

    let probes = 5000;
    let mut false_positives = 0;
    for bloom in &blooms {
        false_positives += (0..probes)
            .filter(|i| bloom.may_contain(&Value::Int(i * 2 + 1).encode_key()))
            .count();
    }
    let rate = false_positives as f64 / (probes as usize * blooms.len()) as f64;
    assert!(rate < 0.03, "false positive rate too high: {:.4}", rate);
}

/// Point lookups agree with a linear scan, with and without filters
#[test]
fn test_point_lookup_with_and_without_filters() {
    let dir = TempDir::new().unwrap();

    for use_bloom in [true, false] {
        let path = dir.path().join(format!("lookup-{}.cfile", use_bloom));
        let values: Vec<Value> = (0..3000).map(|i| Value::Int((i * 7919) % 3001)).collect();
        let options = WriterOptions::new()
            .data_type(DataType::Int32)
            .encoding(EncodingType::BitShuffle)
            .values_per_block(200)
            .use_bloom_filter(use_bloom);
        let mut writer = CFileWriter::create(&path, options).unwrap();
        writer.append(&values).unwrap();
        writer.finish().unwrap();

        let reader = CFileReader::open(&path).unwrap();
        assert_eq!(reader.footer().bloom_block_ptrs.is_empty(), !use_bloom);

        for probe in (0..3100).step_by(53) {
            let expected = values.iter().position(|v| *v == Value::Int(probe)).map(|i| i as u64);
            assert_eq!(reader.point_lookup(&Value::Int(probe)).unwrap(), expected, "probe {}", probe);
        }
    }
}

/// Filters line up with data blocks in ordinal order
#[test]
fn test_one_filter_per_block() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("aligned.cfile");

    let values: Vec<Value> = (0..1000).map(Value::Int).collect();
    let options = WriterOptions::new().values_per_block(100).compression_threads(3);
    let mut writer = CFileWriter::create(&path, options).unwrap();
    writer.append(&values).unwrap();
    writer.finish().unwrap();

    let reader = CFileReader::open(&path).unwrap();
    let leaves = IndexTreeReader::new(&reader.footer().posidx_info).leaf_entries(&reader).unwrap();
    let blooms = load_blooms(&path, &reader);
    assert_eq!(leaves.len(), blooms.len());

    // bloom blocks follow the last data block
    let last_data = leaves.last().unwrap().pointer;
    assert!(reader.footer().bloom_block_ptrs[0].offset >= last_data.end_offset());

    for (block, bloom) in blooms.iter().enumerate() {
        let v = Value::Int(block as i64 * 100 + 42);
        assert!(bloom.may_contain(&v.encode_key()));
    }
}

/// Value-indexed lookups consult the candidate block's filter before reading it
#[test]
fn test_indexed_lookup_skips_rejected_blocks() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("sorted-bloom.cfile");

    // even numbers, with a run of duplicates straddling blocks
    let mut values: Vec<Value> = (0..1000).map(|i| Value::Int(i * 2)).collect();
    values.splice(300..300, std::iter::repeat(Value::Int(600)).take(150));
    let options = WriterOptions::new()
        .data_type(DataType::Int64)
        .values_per_block(100)
        .bloom_fp_rate(0.001)
        .write_value_index(true);
    let mut writer = CFileWriter::create(&path, options).unwrap();
    writer.append(&values).unwrap();
    writer.finish().unwrap();

    {
        let reader = CFileReader::open(&path).unwrap();
        assert_eq!(reader.point_lookup(&Value::Int(600)).unwrap(), Some(300));
        assert_eq!(reader.point_lookup(&Value::Int(602)).unwrap(), Some(451));
        assert_eq!(reader.point_lookup(&Value::Int(1998)).unwrap(), Some(1149));
        assert_eq!(reader.point_lookup(&Value::Int(601)).unwrap(), None);
    }

    // damage every data block; misses rejected by the filters never touch them
    let reader = CFileReader::open(&path).unwrap();
    let leaves = IndexTreeReader::new(&reader.footer().posidx_info).leaf_entries(&reader).unwrap();
    let mut bytes = std::fs::read(&path).unwrap();
    for leaf in &leaves {
        bytes[(leaf.pointer.offset + leaf.pointer.size / 2) as usize] ^= 0x5a;
    }
    std::fs::write(&path, bytes).unwrap();

    let reader = CFileReader::open(&path).unwrap();
    let misses = (0..200)
        .map(|i| reader.point_lookup(&Value::Int(i * 10 + 1)))
        .filter(|result| matches!(result, Ok(None)))
        .count();
    assert!(misses >= 190, "only {} of 200 misses skipped the data blocks", misses);
    assert!(reader.point_lookup(&Value::Int(1000)).is_err());
}

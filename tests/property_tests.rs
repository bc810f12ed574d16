// Property Tests for CFile
// Arbitrary value sequences round-trip through every encoding and codec

use cfile::{CFileReader, CFileWriter, CompressionType, DataType, EncodingType, Value, WriterOptions};
use proptest::prelude::*;
use tempfile::TempDir;

fn codec() -> impl Strategy<Value = CompressionType> {
    prop_oneof![
        Just(CompressionType::None),
        Just(CompressionType::Snappy),
        Just(CompressionType::Lz4),
        Just(CompressionType::Zstd),
    ]
}

fn int_encoding() -> impl Strategy<Value = EncodingType> {
    prop_oneof![
        Just(EncodingType::Plain),
        Just(EncodingType::Rle),
        Just(EncodingType::BitShuffle),
        Just(EncodingType::Dictionary),
    ]
}

fn string_encoding() -> impl Strategy<Value = EncodingType> {
    prop_oneof![Just(EncodingType::Plain), Just(EncodingType::Dictionary)]
}

fn write_and_scan(
    options: WriterOptions,
    cells: &[Option<Value>],
) -> Result<Vec<Option<Value>>, TestCaseError> {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("prop.cfile");
    let mut writer = CFileWriter::create(&path, options).unwrap();
    writer.append_nullable(cells).unwrap();
    writer.finish().unwrap();

    let reader = CFileReader::open(&path).unwrap();
    prop_assert_eq!(reader.num_values(), cells.len() as u64);
    Ok(reader.seek_to_first().unwrap().next_batch(cells.len() + 1).unwrap())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_int_round_trip(
        cells in prop::collection::vec(prop::option::weighted(0.8, -5000i64..5000), 0..600),
        encoding in int_encoding(),
        compression in codec(),
        per_block in 1usize..200,
    ) {
        let cells: Vec<Option<Value>> = cells.into_iter().map(|c| c.map(Value::Int)).collect();
        let options = WriterOptions::new()
            .data_type(DataType::Int32)
            .encoding(encoding)
            .compression(compression)
            .nullable(true)
            .values_per_block(per_block)
            .index_branching(3);
        prop_assert_eq!(write_and_scan(options, &cells)?, cells);
    }

    #[test]
    fn prop_string_round_trip(
        cells in prop::collection::vec(prop::option::of("[a-z]{0,12}"), 0..300),
        encoding in string_encoding(),
        compression in codec(),
    ) {
        let cells: Vec<Option<Value>> = cells.into_iter().map(|c| c.map(Value::from)).collect();
        let options = WriterOptions::new()
            .data_type(DataType::String)
            .encoding(encoding)
            .compression(compression)
            .nullable(true)
            .block_size(256);
        prop_assert_eq!(write_and_scan(options, &cells)?, cells);
    }

    #[test]
    fn prop_seek_to_value_is_leftmost(
        mut values in prop::collection::vec(-1000i64..1000, 1..400),
        probe in -1100i64..1100,
        per_block in 1usize..64,
    ) {
        values.sort_unstable();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sorted.cfile");
        let options = WriterOptions::new()
            .data_type(DataType::Int64)
            .values_per_block(per_block)
            .index_branching(2)
            .write_value_index(true);
        let mut writer = CFileWriter::create(&path, options).unwrap();
        let stored: Vec<Value> = values.iter().copied().map(Value::Int).collect();
        writer.append(&stored).unwrap();
        writer.finish().unwrap();

        let reader = CFileReader::open(&path).unwrap();
        let expected = values.iter().position(|v| *v >= probe);
        let found = reader.seek_to_value(&Value::Int(probe)).unwrap();
        prop_assert_eq!(found.as_ref().map(|c| c.ordinal() as usize), expected);
        if let Some(cursor) = found {
            prop_assert_eq!(cursor.value(), Some(&Value::Int(values[cursor.ordinal() as usize])));
        }

        let first_equal = values.iter().position(|v| *v == probe).map(|i| i as u64);
        prop_assert_eq!(reader.point_lookup(&Value::Int(probe)).unwrap(), first_equal);
    }
}

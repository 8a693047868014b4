// Parquet encoding for partition files
//
// Serializes a partition's rows to Parquet in memory and computes a Blake3
// content hash while encoding, so the bytes can be written to a temp file and
// renamed into place in one step.

use crate::error::{Result, WriterError};
use arrow::array::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::properties::{EnabledStatistics, WriterProperties};
use parquet::format::KeyValue;
use std::io::{self, Write};
use std::path::Path;
use upsert2parquet_config::{CompressionCodec, StorageConfig};

/// Key-value metadata entry naming the temporal key column
pub const TEMPORAL_KEY_METADATA: &str = "upsert2parquet.temporal_key";
/// Key-value metadata entry holding the writer version
pub const VERSION_METADATA: &str = "upsert2parquet.version";

/// Row-group size and compression used for every partition file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodingOptions {
    pub row_group_size: usize,
    pub compression: CompressionCodec,
}

impl Default for EncodingOptions {
    fn default() -> Self {
        Self::from(&StorageConfig::default())
    }
}

impl From<&StorageConfig> for EncodingOptions {
    fn from(config: &StorageConfig) -> Self {
        Self {
            row_group_size: config.parquet_row_group_size,
            compression: config.compression,
        }
    }
}

impl EncodingOptions {
    fn compression_setting(&self) -> Compression {
        match self.compression {
            CompressionCodec::Snappy => Compression::SNAPPY,
            CompressionCodec::Zstd => {
                let level = ZstdLevel::try_new(2).unwrap_or_default();
                Compression::ZSTD(level)
            }
            CompressionCodec::Uncompressed => Compression::UNCOMPRESSED,
        }
    }

    /// Writer properties for one partition file
    ///
    /// - Dictionary encoding enabled
    /// - Page-level statistics
    /// - Writer version and temporal key embedded as key-value metadata
    pub fn writer_properties(&self, temporal_key: Option<&str>) -> WriterProperties {
        let mut metadata = vec![KeyValue {
            key: VERSION_METADATA.to_string(),
            value: Some(env!("CARGO_PKG_VERSION").to_string()),
        }];
        if let Some(key) = temporal_key {
            metadata.push(KeyValue {
                key: TEMPORAL_KEY_METADATA.to_string(),
                value: Some(key.to_string()),
            });
        }

        WriterProperties::builder()
            .set_dictionary_enabled(true)
            .set_statistics_enabled(EnabledStatistics::Page)
            .set_compression(self.compression_setting())
            .set_data_page_size_limit(256 * 1024)
            .set_write_batch_size(32 * 1024)
            .set_max_row_group_size(self.row_group_size.max(1))
            .set_dictionary_page_size_limit(128 * 1024)
            .set_key_value_metadata(Some(metadata))
            .build()
    }
}

struct HashingBuffer {
    buffer: Vec<u8>,
    hasher: blake3::Hasher,
}

impl HashingBuffer {
    fn new() -> Self {
        Self {
            buffer: Vec::new(),
            hasher: blake3::Hasher::new(),
        }
    }

    fn finish(self) -> (Vec<u8>, Blake3Hash) {
        let hash = self.hasher.finalize();
        (self.buffer, Blake3Hash::new(*hash.as_bytes()))
    }
}

impl Write for HashingBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.hasher.update(buf);
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Blake3 hash representation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Blake3Hash {
    bytes: [u8; 32],
}

impl Blake3Hash {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self { bytes }
    }

    /// Hash of bytes already in memory
    pub fn of(data: &[u8]) -> Self {
        Self::new(*blake3::hash(data).as_bytes())
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }
}

/// Parquet bytes for one partition
pub struct EncodedPartition {
    pub bytes: Vec<u8>,
    pub hash: Blake3Hash,
    pub row_count: i64,
}

/// Encode `batch` into Parquet bytes. `path` is only used in error messages.
pub fn encode_partition(
    batch: &RecordBatch,
    properties: WriterProperties,
    path: &Path,
) -> Result<EncodedPartition> {
    let mut sink = HashingBuffer::new();
    let file_metadata = {
        let mut writer = ArrowWriter::try_new(&mut sink, batch.schema(), Some(properties))
            .map_err(|e| WriterError::parquet(path, e))?;
        writer
            .write(batch)
            .map_err(|e| WriterError::parquet(path, e))?;
        writer.close().map_err(|e| WriterError::parquet(path, e))?
    };

    let (bytes, hash) = sink.finish();
    Ok(EncodedPartition {
        bytes,
        hash,
        row_count: file_metadata.num_rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Int32Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
    use std::sync::Arc;

    fn create_test_batch() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int32, false),
            Field::new("name", DataType::Utf8, false),
        ]));

        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int32Array::from(vec![1, 2, 3])),
                Arc::new(StringArray::from(vec!["a", "b", "c"])),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_encode_hash_matches_bytes() {
        let batch = create_test_batch();
        let props = EncodingOptions::default().writer_properties(Some("id"));
        let encoded = encode_partition(&batch, props, Path::new("part.0.parquet")).unwrap();

        assert_eq!(&encoded.bytes[0..4], b"PAR1");
        assert_eq!(encoded.row_count, 3);
        assert_eq!(encoded.hash, Blake3Hash::of(&encoded.bytes));
        assert_eq!(encoded.hash.to_hex().len(), 64);
    }

    #[test]
    fn test_metadata_and_compression_applied() {
        let batch = create_test_batch();
        let options = EncodingOptions {
            row_group_size: 2,
            compression: CompressionCodec::Snappy,
        };
        let encoded = encode_partition(
            &batch,
            options.writer_properties(Some("id")),
            Path::new("part.0.parquet"),
        )
        .unwrap();

        let builder =
            ParquetRecordBatchReaderBuilder::try_new(bytes::Bytes::from(encoded.bytes)).unwrap();
        let metadata = builder.metadata();
        assert_eq!(metadata.num_row_groups(), 2);
        assert_eq!(
            metadata.row_group(0).column(0).compression(),
            Compression::SNAPPY
        );

        let kv = metadata.file_metadata().key_value_metadata().unwrap();
        assert!(kv
            .iter()
            .any(|e| e.key == TEMPORAL_KEY_METADATA && e.value.as_deref() == Some("id")));
        assert!(kv.iter().any(|e| e.key == VERSION_METADATA));
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let batch = create_test_batch();
        let options = EncodingOptions::default();
        let a = encode_partition(&batch, options.writer_properties(None), Path::new("a")).unwrap();
        let b = encode_partition(&batch, options.writer_properties(None), Path::new("b")).unwrap();
        assert_eq!(a.hash, b.hash);
    }
}

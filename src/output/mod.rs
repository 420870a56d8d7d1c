//! Output module
//!
//! The versioned file sink and the pieces it is built from.
//!
//! # Overview
//!
//! - [`CloudDestination`] - object storage from a URL (local, S3, R2, GCS, Azure)
//! - [`encode_parquet`] - Arrow RecordBatch to an in-memory Parquet file
//! - [`FileSink`] / [`ObjectStoreFileSink`] - overwrite writes with schema merge

mod cloud;
mod file_sink;
mod writer;

pub use cloud::CloudDestination;
pub use file_sink::{
    reconcile, FileSink, FileWriteResult, ManifestColumn, ObjectStoreFileSink, SchemaManifest,
    WriteOptions, DATA_FILE, MANIFEST_FILE,
};
pub use writer::{decode_parquet, encode_parquet, ParquetCompression, ParquetWriterConfig};

//! Source payload decoding
//!
//! Turns the bodies that sources hand back (a Data API response, a JSON
//! Lines export) into raw documents. Nothing here interprets Extended JSON;
//! that happens per document during flattening.

mod decoders;

pub use decoders::{DecodedRecords, JsonDecoder, JsonlDecoder, RecordDecoder};

//! Dataset ingestion: source descriptors, payload decoding and metadata

pub mod decode;
pub mod metadata;
pub mod source;

pub use decode::{decode_payload, PayloadFormat};
pub use metadata::{DateRange, MetadataRecord};
pub use source::{KnownSource, SourceCatalog, SourceDescriptor};

/// Per-file extraction: content hash, metadata tags and thumbnail

pub mod decoder;
pub mod fits;
pub mod hash;
pub mod pipeline;
pub mod thumbnail;
pub mod xisf;

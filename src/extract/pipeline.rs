use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use super::decoder::{ImageDecoder, StandardDecoder};
use super::hash::{hash_file, HashAlgorithm, DEFAULT_HASH_BUFFER};
use super::thumbnail::{generate_thumbnail, THUMBNAIL_SIZE};
use crate::cancel::CancelToken;
use crate::config::CatalogConfig;
use crate::error::ExtractError;
use crate::state::data::{CatalogRecord, CycleId, PathInfo, RecordDraft, Tags, ThumbnailBlob};
use crate::state::library::Catalog;

/// Output of the three extraction steps for one file
#[derive(Debug, Clone, PartialEq)]
pub struct Extracted {
    pub content_hash: String,
    pub tags: Tags,
    pub thumbnail: ThumbnailBlob,
}

/// Hash, tag and thumbnail one file, then commit it to the catalog.
#[derive(Clone)]
pub struct ExtractionPipeline {
    decoder: Arc<dyn ImageDecoder>,
    hash_algorithm: HashAlgorithm,
    hash_buffer_bytes: usize,
    thumbnail_max_dim: u32,
}

impl ExtractionPipeline {
    pub fn new(decoder: Arc<dyn ImageDecoder>) -> Self {
        Self {
            decoder,
            hash_algorithm: HashAlgorithm::default(),
            hash_buffer_bytes: DEFAULT_HASH_BUFFER,
            thumbnail_max_dim: THUMBNAIL_SIZE,
        }
    }

    pub fn from_config(config: &CatalogConfig) -> Self {
        Self::new(Arc::new(StandardDecoder))
            .hash_algorithm(config.hash_algorithm)
            .hash_buffer_bytes(config.hash_buffer_bytes)
            .thumbnail_max_dim(config.thumbnail_max_dim)
    }

    pub fn hash_algorithm(mut self, algorithm: HashAlgorithm) -> Self {
        self.hash_algorithm = algorithm;
        self
    }

    pub fn hash_buffer_bytes(mut self, bytes: usize) -> Self {
        self.hash_buffer_bytes = bytes;
        self
    }

    pub fn thumbnail_max_dim(mut self, max_dim: u32) -> Self {
        self.thumbnail_max_dim = max_dim;
        self
    }

    /// Run the hash, tag and thumbnail steps in that order. Cancellation is
    /// checked between steps. Nothing is written.
    pub fn extract(&self, path: &Path, cancel: &CancelToken) -> Result<Extracted, ExtractError> {
        let checkpoint = || {
            if cancel.is_canceled() {
                Err(ExtractError::Canceled)
            } else {
                Ok(())
            }
        };

        checkpoint()?;
        let content_hash = hash_file(path, self.hash_algorithm, self.hash_buffer_bytes, cancel)?;

        checkpoint()?;
        let decoded = self.decoder.decode(path)?;

        checkpoint()?;
        let thumbnail = generate_thumbnail(&decoded.image, self.thumbnail_max_dim).map_err(
            |source| ExtractError::Encode {
                path: path.to_path_buf(),
                source,
            },
        )?;

        Ok(Extracted {
            content_hash,
            tags: decoded.tags,
            thumbnail,
        })
    }

    /// Extract a New or Modified file and upsert its record. On any failure
    /// before the upsert nothing is written.
    pub fn process(
        &self,
        info: &PathInfo,
        cycle: CycleId,
        catalog: &dyn Catalog,
        cancel: &CancelToken,
    ) -> Result<CatalogRecord, ExtractError> {
        let extracted = self.extract(&info.absolute_path, cancel)?;

        // Last chance to discard before touching the catalog
        if cancel.is_canceled() {
            return Err(ExtractError::Canceled);
        }

        let (width, height) = (extracted.thumbnail.width, extracted.thumbnail.height);
        let record = catalog.upsert(&RecordDraft {
            absolute_path: info.key.clone(),
            size_bytes: info.size_bytes,
            mtime: info.mtime,
            content_hash: extracted.content_hash,
            tags: extracted.tags,
            thumbnail: extracted.thumbnail,
            seen_cycle: cycle,
        })?;

        debug!(
            "Extracted {} ({}x{} thumbnail)",
            record.absolute_path, width, height
        );
        Ok(record)
    }
}

impl std::fmt::Debug for ExtractionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractionPipeline")
            .field("hash_algorithm", &self.hash_algorithm)
            .field("hash_buffer_bytes", &self.hash_buffer_bytes)
            .field("thumbnail_max_dim", &self.thumbnail_max_dim)
            .finish()
    }
}

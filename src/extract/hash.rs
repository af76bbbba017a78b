//! Streaming content hash over the whole file.

use serde::{Deserialize, Serialize};
use sha1::Digest;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::cancel::CancelToken;
use crate::error::{ExtractError, PathError};

/// Nominal read buffer size
pub const DEFAULT_HASH_BUFFER: usize = 10 * 1024;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    #[default]
    Sha1,
    Sha256,
    Blake3,
}

enum Hasher {
    Sha1(sha1::Sha1),
    Sha256(sha2::Sha256),
    Blake3(Box<blake3::Hasher>),
}

impl Hasher {
    fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Sha1 => Hasher::Sha1(sha1::Sha1::new()),
            HashAlgorithm::Sha256 => Hasher::Sha256(sha2::Sha256::new()),
            HashAlgorithm::Blake3 => Hasher::Blake3(Box::new(blake3::Hasher::new())),
        }
    }

    fn update(&mut self, bytes: &[u8]) {
        match self {
            Hasher::Sha1(h) => h.update(bytes),
            Hasher::Sha256(h) => h.update(bytes),
            Hasher::Blake3(h) => {
                h.update(bytes);
            }
        }
    }

    fn finish_hex(self) -> String {
        match self {
            Hasher::Sha1(h) => format!("{:x}", h.finalize()),
            Hasher::Sha256(h) => format!("{:x}", h.finalize()),
            Hasher::Blake3(h) => h.finalize().to_hex().to_string(),
        }
    }
}

/// Hash everything `reader` yields, `buffer_bytes` at a time.
pub fn hash_reader<R: Read>(
    mut reader: R,
    algorithm: HashAlgorithm,
    buffer_bytes: usize,
) -> std::io::Result<String> {
    let mut hasher = Hasher::new(algorithm);
    let mut buffer = vec![0u8; buffer_bytes.max(1)];
    loop {
        let read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };
        hasher.update(&buffer[..read]);
    }
    Ok(hasher.finish_hex())
}

/// Lowercase hex digest of the file at `path`.
pub fn hash_file(
    path: &Path,
    algorithm: HashAlgorithm,
    buffer_bytes: usize,
    cancel: &CancelToken,
) -> Result<String, ExtractError> {
    let read_error = |source| PathError::Read {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(read_error)?;

    // Large frames are hashed chunk by chunk; stop early on cancel
    let reader = CancelableReader { inner: file, cancel };
    match hash_reader(reader, algorithm, buffer_bytes) {
        Ok(digest) => Ok(digest),
        Err(_) if cancel.is_canceled() => Err(ExtractError::Canceled),
        Err(source) => Err(read_error(source).into()),
    }
}

struct CancelableReader<'a, R> {
    inner: R,
    cancel: &'a CancelToken,
}

impl<R: Read> Read for CancelableReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.cancel.is_canceled() {
            return Err(std::io::Error::other("canceled"));
        }
        self.inner.read(buf)
    }
}

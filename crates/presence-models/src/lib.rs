use sha2::{Digest, Sha256};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Model file descriptor: expected filename, upstream URL, human-readable size.
pub struct ModelFile {
    pub name: &'static str,
    pub url: &'static str,
    pub size_display: &'static str,
}

/// BlazeFace short-range, tuned for faces within about two meters of a
/// front-facing camera.
///
/// No checksum is pinned here: deployments pin the digest they vetted via
/// configuration, and `verify_model_dir` reports the digest it computed.
pub const DETECTOR_MODEL: ModelFile = ModelFile {
    name: "blaze_face_short_range.tflite",
    url: "https://storage.googleapis.com/mediapipe-models/face_detector/blaze_face_short_range/float16/1/blaze_face_short_range.tflite",
    size_display: "230 KB",
};

#[derive(Error, Debug)]
pub enum ModelIntegrityError {
    #[error("model file not found: {name} ({path})")]
    MissingModel { name: &'static str, path: PathBuf },

    #[error("model file is empty: {name} ({path})")]
    EmptyModel { name: &'static str, path: PathBuf },

    #[error("failed to open model file: {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read model file: {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(
        "model checksum mismatch for {name} ({path})\n  expected: {expected}\n  got:      {got}"
    )]
    ChecksumMismatch {
        name: &'static str,
        path: PathBuf,
        expected: String,
        got: String,
    },
}

/// A model file that passed verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedModel {
    pub path: PathBuf,
    pub sha256: String,
    pub size_bytes: u64,
}

/// Compute SHA-256 hex digest of a file, returning it with the byte count.
pub fn sha256_file_hex(path: &Path) -> Result<(String, u64), ModelIntegrityError> {
    let mut file = fs::File::open(path).map_err(|source| ModelIntegrityError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    let mut total = 0u64;

    loop {
        let n = file
            .read(&mut buf)
            .map_err(|source| ModelIntegrityError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        if n == 0 {
            break;
        }
        total += n as u64;
        hasher.update(&buf[..n]);
    }

    Ok((format!("{:x}", hasher.finalize()), total))
}

/// Check that `path` exists, is non-empty and, when `expected_sha256` is
/// given, matches it (case-insensitive hex).
pub fn verify_file(
    name: &'static str,
    path: &Path,
    expected_sha256: Option<&str>,
) -> Result<VerifiedModel, ModelIntegrityError> {
    if !path.exists() {
        return Err(ModelIntegrityError::MissingModel {
            name,
            path: path.to_path_buf(),
        });
    }

    let (digest, size_bytes) = sha256_file_hex(path)?;
    if size_bytes == 0 {
        return Err(ModelIntegrityError::EmptyModel {
            name,
            path: path.to_path_buf(),
        });
    }

    if let Some(expected) = expected_sha256 {
        if !digest.eq_ignore_ascii_case(expected.trim()) {
            return Err(ModelIntegrityError::ChecksumMismatch {
                name,
                path: path.to_path_buf(),
                expected: expected.to_string(),
                got: digest,
            });
        }
    }

    Ok(VerifiedModel {
        path: path.to_path_buf(),
        sha256: digest,
        size_bytes,
    })
}

/// Verify the detector model inside `model_dir`.
pub fn verify_model_dir(
    model_dir: &Path,
    expected_sha256: Option<&str>,
) -> Result<VerifiedModel, ModelIntegrityError> {
    let path = model_dir.join(DETECTOR_MODEL.name);
    verify_file(DETECTOR_MODEL.name, &path, expected_sha256)
}

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::error::Error;
use svip::errors::{ErrorKind, SvipError};
use thiserror::Error;

/// Error type for encoding values stored by the Fjall backend and reading the
/// adapter's own manifest.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FjallCodecError {
    /// Serialization of a value failed
    #[error("Serialization failed: {0}")]
    SerializationError(String),
    /// Deserialization of stored bytes failed
    #[error("Deserialization failed: {0}")]
    DeserializationError(String),
    /// Stored bytes were decoded but left trailing data
    #[error("Trailing data after decoding: {0} byte(s)")]
    TrailingData(usize),
    /// The adapter manifest could not be parsed
    #[error("Invalid adapter manifest: {0}")]
    ManifestError(String),
    /// A dependency carries no version in the adapter manifest
    #[error("No version declared for dependency {0}")]
    UndeclaredVersion(String),
}

impl From<FjallCodecError> for SvipError {
    fn from(err: FjallCodecError) -> Self {
        SvipError::new(&err.to_string(), ErrorKind::EncodingError)
    }
}

pub type FjallCodecResult<T> = Result<T, FjallCodecError>;

/// Encodes `value` with bincode's standard configuration.
#[inline]
pub(crate) fn encode<T: Serialize + ?Sized>(value: &T) -> FjallCodecResult<Vec<u8>> {
    bincode::serde::encode_to_vec(value, bincode::config::standard())
        .map_err(|e| FjallCodecError::SerializationError(e.to_string()))
}

/// Decodes bytes written by [`encode`].
#[inline]
pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8]) -> FjallCodecResult<T> {
    let (value, read) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
        .map_err(|e| FjallCodecError::DeserializationError(e.to_string()))?;
    if read != bytes.len() {
        return Err(FjallCodecError::TrailingData(bytes.len() - read));
    }
    Ok(value)
}

/// Converts Fjall errors to SVIP errors.
///
/// I/O failures keep their kind, everything else is a backend error.
pub(crate) fn to_svip_error(error: impl Error) -> SvipError {
    let message = error.to_string();
    let kind = if message.contains("Io") || message.contains("I/O") || message.contains("os error") {
        ErrorKind::IOError
    } else {
        ErrorKind::BackendError
    };
    SvipError::new(&format!("Fjall Error: {}", message), kind)
}

//! Error types for the media transfer tool
//!
//! Errors are split by how far they are allowed to travel:
//! - [`TransferError`] ends a transfer run and is shown to the user
//! - [`ItemError`] describes one file that failed; it is counted and skipped
//! - [`VerificationError`] is returned when a manually entered path is rejected
//! - [`ConvertError`] is the cause behind a failed HEIC to JPEG conversion

use std::path::PathBuf;
use thiserror::Error;

/// Terminal failure of a transfer run
#[derive(Error, Debug)]
pub enum TransferError {
    /// The media source disappeared between discovery and transfer
    #[error("iPhone path '{}' is no longer accessible ({reason}). Please detect the iPhone again.", .path.display())]
    SourceUnavailable { path: PathBuf, reason: String },

    /// The media source exists but refuses directory listing
    #[error("Access to '{}' was denied. Please unlock your iPhone and tap 'Trust' when prompted.", .path.display())]
    AccessDenied { path: PathBuf },

    /// The destination directory cannot be created or written
    #[error("Cannot write to destination '{}': {reason}", .path.display())]
    Destination { path: PathBuf, reason: String },

    /// Another transfer is still running
    #[error("A transfer is already in progress")]
    AlreadyRunning,
}

/// Failure of a single file, recorded in the summary
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ItemError {
    /// Copying the file to the destination failed
    #[error("Failed to copy '{}': {reason}", .path.display())]
    Copy { path: PathBuf, reason: String },

    /// Converting the copied file to JPEG failed
    #[error("Failed to convert '{}': {reason}", .path.display())]
    Convert { path: PathBuf, reason: String },
}

impl ItemError {
    /// Path of the file the error refers to
    pub fn path(&self) -> &PathBuf {
        match self {
            ItemError::Copy { path, .. } | ItemError::Convert { path, .. } => path,
        }
    }
}

/// A manually entered path did not look like an iPhone
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerificationError {
    /// Nothing exists at the given path
    #[error("'{}' does not exist", .0.display())]
    NotFound(PathBuf),

    /// The path is a file, not a folder
    #[error("'{}' is not a folder", .0.display())]
    NotADirectory(PathBuf),

    /// The folder exists but has no camera storage in it
    #[error("'{}' does not look like an iPhone: {reason}", .path.display())]
    Rejected { path: PathBuf, reason: String },
}

/// Why converting one image failed
#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("metadata error: {0}")]
    Exif(#[from] exif::Error),

    #[cfg(feature = "heif")]
    #[error("error with libheif: {0}")]
    LibHeif(#[from] libheif_rs::HeifError),

    /// The file is not in a format any available decoder understands
    #[error("unsupported image: {0}")]
    Unsupported(String),

    /// The encoded metadata block does not fit into a JPEG APP1 segment
    #[error("metadata block too large ({0} bytes)")]
    MetadataTooLarge(usize),
}

/// Result type alias for transfer runs
pub type Result<T> = std::result::Result<T, TransferError>;

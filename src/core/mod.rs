//! Core functionality module
//!
//! Configuration, errors, cancellation and the transfer pipeline.
//!
//! # Submodules
//!
//! - `cancel` - Shared cancellation token
//! - `config` - Configuration loading, saving, and management
//! - `convert` - HEIC to JPEG conversion
//! - `error` - Error types and result aliases
//! - `metadata` - EXIF reading and translation for converted images
//! - `tracking` - Record of conversions done in a destination folder
//! - `transfer` - The copy-then-convert worker

pub mod cancel;
pub mod config;
pub mod convert;
pub mod error;
pub mod metadata;
pub mod tracking;
pub mod transfer;

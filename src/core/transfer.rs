//! Transfer pipeline: copy media off the device, then convert HEIC to JPEG
//!
//! A transfer runs in two phases over a verified [`MediaSourceHandle`]:
//!
//! 1. **Copy** - every media file under the device's `DCIM` folder is copied
//!    into the destination, keeping its timestamps. Progress 0-50.
//! 2. **Convert** - HEIC files now present in the destination are converted
//!    to JPEG next to the original. Progress 50-100.
//!
//! A failing file is recorded in the summary and skipped. Only problems with
//! the source as a whole or with the destination folder end the run early.
//! Cancellation is checked between files; finished files are kept.
//!
//! # Example
//!
//! ```rust,no_run
//! use iphone_media_transfer::core::transfer::{TransferConfig, TransferWorker};
//! use iphone_media_transfer::device::{submit_manual_path, Verifier};
//! use std::path::Path;
//!
//! let handle = submit_manual_path(Path::new("/Volumes/iPhone"), &Verifier::default()).unwrap();
//! let config = TransferConfig::with_destination("./transferred_photos")
//!     .with_progress(|update| println!("{}%", update.percent));
//! let summary = TransferWorker::new(config).transfer(&handle).unwrap();
//! println!("{}", summary);
//! ```

use crate::core::cancel::CancellationToken;
use crate::core::convert::{is_convertible, unique_path, Converter};
use crate::core::error::{ItemError, Result, TransferError};
use crate::core::tracking::ConversionLog;
use crate::device::traits::MediaSourceHandle;
use crate::device::verify::Verifier;
use filetime::FileTime;
use log::{debug, info, trace, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use walkdir::WalkDir;

/// Extensions copied off the device
pub const MEDIA_EXTENSIONS: &[&str] = &["heic", "heif", "jpg", "jpeg", "png", "mov", "mp4"];

// =============================================================================
// Configuration
// =============================================================================

/// What to do when a copied file's name is already taken in the destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    /// Replace the existing file
    #[default]
    Overwrite,
    /// Leave the existing file and skip the copy
    Skip,
    /// Copy under a new name (`IMG_0001_1.HEIC`)
    Rename,
}

/// Configuration for a transfer run
pub struct TransferConfig {
    /// Destination folder
    pub destination: PathBuf,
    /// Run the conversion phase
    pub convert: bool,
    /// Name clash handling in the copy phase
    pub on_conflict: ConflictPolicy,
    /// Callback for progress updates
    pub progress_callback: Option<Arc<dyn Fn(TransferUpdate) + Send + Sync>>,
    /// Callback for human-readable status lines
    pub status_callback: Option<Arc<dyn Fn(String) + Send + Sync>>,
}

impl std::fmt::Debug for TransferConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferConfig")
            .field("destination", &self.destination)
            .field("convert", &self.convert)
            .field("on_conflict", &self.on_conflict)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .field(
                "status_callback",
                &self.status_callback.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

impl Clone for TransferConfig {
    fn clone(&self) -> Self {
        Self {
            destination: self.destination.clone(),
            convert: self.convert,
            on_conflict: self.on_conflict,
            progress_callback: self.progress_callback.clone(),
            status_callback: self.status_callback.clone(),
        }
    }
}

impl TransferConfig {
    /// Create a config writing into `destination`
    pub fn with_destination<P: AsRef<Path>>(destination: P) -> Self {
        Self {
            destination: destination.as_ref().to_path_buf(),
            convert: true,
            on_conflict: ConflictPolicy::default(),
            progress_callback: None,
            status_callback: None,
        }
    }

    /// Enable or disable the conversion phase
    pub fn convert(mut self, value: bool) -> Self {
        self.convert = value;
        self
    }

    /// Set the name clash policy
    pub fn on_conflict(mut self, policy: ConflictPolicy) -> Self {
        self.on_conflict = policy;
        self
    }

    /// Set progress callback
    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(TransferUpdate) + Send + Sync + 'static,
    {
        self.progress_callback = Some(Arc::new(callback));
        self
    }

    /// Set status callback
    pub fn with_status<F>(mut self, callback: F) -> Self
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        self.status_callback = Some(Arc::new(callback));
        self
    }
}

// =============================================================================
// Items and progress
// =============================================================================

/// How a discovered file is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ItemKind {
    CopyOnly,
    ConvertAndCopy,
}

/// One media file found on the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferItem {
    source: PathBuf,
    destination: PathBuf,
    size: u64,
    kind: ItemKind,
}

impl TransferItem {
    fn new(source: PathBuf, destination_dir: &Path, size: u64) -> Option<Self> {
        let name = source.file_name()?;
        let destination = destination_dir.join(name);
        let kind = if is_convertible(&source) {
            ItemKind::ConvertAndCopy
        } else {
            ItemKind::CopyOnly
        };
        Some(Self {
            source,
            destination,
            size,
            kind,
        })
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Intended destination path, before conflict handling
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn kind(&self) -> ItemKind {
        self.kind
    }
}

/// Current phase of a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TransferPhase {
    Preparing,
    Copying,
    Converting,
    Complete,
}

/// Progress update information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferUpdate {
    pub phase: TransferPhase,
    /// Overall progress, 0-100, never decreasing
    pub percent: u8,
    /// Items processed in this phase (successful or not)
    pub completed: usize,
    /// Items in this phase
    pub total: usize,
    /// File just processed
    pub current_file: Option<PathBuf>,
}

/// Overall progress split into a copy half and a convert half
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressState {
    percent: u8,
}

impl ProgressState {
    pub fn percent(&self) -> u8 {
        self.percent
    }

    /// Record copy progress; returns the new overall value
    pub fn copy(&mut self, completed: usize, total: usize) -> u8 {
        self.raise(half_fraction(completed, total))
    }

    /// Record convert progress; returns the new overall value
    pub fn convert(&mut self, completed: usize, total: usize) -> u8 {
        self.raise(50 + half_fraction(completed, total))
    }

    pub fn finish(&mut self) -> u8 {
        self.raise(100)
    }

    fn raise(&mut self, value: u8) -> u8 {
        self.percent = self.percent.max(value.min(100));
        self.percent
    }
}

/// `floor(completed / total * 50)`; an empty phase counts as done
fn half_fraction(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 50;
    }
    ((completed.min(total) * 50) / total) as u8
}

// =============================================================================
// Summary
// =============================================================================

/// What a transfer run did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TransferSummary {
    pub destination: PathBuf,
    pub files_found: usize,
    pub copied: usize,
    pub copy_skipped: usize,
    pub copy_failed: usize,
    pub converted: usize,
    pub convert_skipped: usize,
    pub convert_failed: usize,
    pub bytes_copied: u64,
    pub cancelled: bool,
    pub duration_ms: u64,
    #[serde(serialize_with = "serialize_failures")]
    pub failures: Vec<ItemError>,
}

fn serialize_failures<S>(failures: &[ItemError], serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.collect_seq(failures.iter().map(|f| f.to_string()))
}

impl TransferSummary {
    /// Whether every file made it through both phases
    pub fn is_clean(&self) -> bool {
        !self.cancelled && self.copy_failed == 0 && self.convert_failed == 0
    }

    /// Get bytes copied in MB
    pub fn megabytes_copied(&self) -> f64 {
        self.bytes_copied as f64 / (1024.0 * 1024.0)
    }
}

impl std::fmt::Display for TransferSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Copied: {}, Converted: {}, Skipped: {}, Failed: {} copy / {} convert, Size: {:.2} MB, Duration: {:.2}s",
            self.copied,
            self.converted,
            self.copy_skipped + self.convert_skipped,
            self.copy_failed,
            self.convert_failed,
            self.megabytes_copied(),
            self.duration_ms as f64 / 1000.0
        )?;
        if self.cancelled {
            write!(f, " (cancelled)")?;
        }
        Ok(())
    }
}

// =============================================================================
// Worker
// =============================================================================

enum CopyOutcome {
    Copied(u64),
    Skipped,
}

/// Runs transfers
pub struct TransferWorker {
    config: TransferConfig,
    cancel: CancellationToken,
    converter: Converter,
}

impl TransferWorker {
    pub fn new(config: TransferConfig) -> Self {
        Self::with_cancellation(config, CancellationToken::new())
    }

    /// Create a worker that observes a shared cancellation token
    pub fn with_cancellation(config: TransferConfig, cancel: CancellationToken) -> Self {
        Self {
            config,
            cancel,
            converter: Converter::default(),
        }
    }

    /// Use a specific converter
    pub fn with_converter(mut self, converter: Converter) -> Self {
        self.converter = converter;
        self
    }

    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Copy everything from `handle` and convert HEIC files
    pub fn transfer(&self, handle: &MediaSourceHandle) -> Result<TransferSummary> {
        let start = Instant::now();
        let mut progress = ProgressState::default();
        let mut summary = TransferSummary {
            destination: self.config.destination.clone(),
            ..Default::default()
        };

        self.report(TransferPhase::Preparing, progress.percent(), 0, 0, None);
        let media_dir = check_source(handle.root())?;
        prepare_destination(&self.config.destination)?;

        let items = self.enumerate(&media_dir);
        summary.files_found = items.len();
        info!(
            "Found {} media file(s) in {}",
            items.len(),
            media_dir.display()
        );
        let heic_count = items
            .iter()
            .filter(|item| item.kind() == ItemKind::ConvertAndCopy)
            .count();
        let total_bytes: u64 = items.iter().map(TransferItem::size).sum();
        self.status(format!(
            "Found {} photos and videos ({} HEIC, {:.1} MB)",
            items.len(),
            heic_count,
            total_bytes as f64 / (1024.0 * 1024.0)
        ));

        self.copy_phase(&items, &mut progress, &mut summary);

        if summary.cancelled {
            self.status("Transfer cancelled. Files already copied were kept.".to_string());
        } else if self.config.convert {
            self.convert_phase(&mut progress, &mut summary);
        } else {
            progress.finish();
        }

        summary.duration_ms = start.elapsed().as_millis() as u64;
        if !summary.cancelled {
            let percent = progress.finish();
            self.report(TransferPhase::Complete, percent, 0, 0, None);
            self.status(format!("Transfer complete. {}", summary));
        }
        info!("Transfer finished: {}", summary);
        Ok(summary)
    }

    /// Run only the conversion phase over the destination folder
    pub fn convert_only(&self) -> Result<TransferSummary> {
        let start = Instant::now();
        let dest = &self.config.destination;
        if !dest.is_dir() {
            return Err(TransferError::Destination {
                path: dest.clone(),
                reason: "folder does not exist".to_string(),
            });
        }

        let mut progress = ProgressState::default();
        progress.copy(0, 0);
        let mut summary = TransferSummary {
            destination: dest.clone(),
            ..Default::default()
        };
        self.convert_phase(&mut progress, &mut summary);

        summary.duration_ms = start.elapsed().as_millis() as u64;
        if !summary.cancelled {
            let percent = progress.finish();
            self.report(TransferPhase::Complete, percent, 0, 0, None);
        }
        Ok(summary)
    }

    /// List media files under `media_dir`, in walk order
    pub fn enumerate(&self, media_dir: &Path) -> Vec<TransferItem> {
        let mut items = Vec::new();
        for entry in WalkDir::new(media_dir).follow_links(false) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping unreadable entry: {}", e);
                    continue;
                }
            };
            if !entry.file_type().is_file() || !is_media_file(entry.path()) {
                continue;
            }
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            if let Some(item) =
                TransferItem::new(entry.into_path(), &self.config.destination, size)
            {
                items.push(item);
            }
        }
        items
    }

    fn copy_phase(
        &self,
        items: &[TransferItem],
        progress: &mut ProgressState,
        summary: &mut TransferSummary,
    ) {
        let total = items.len();
        self.report(TransferPhase::Copying, progress.copy(0, total), 0, total, None);

        for (index, item) in items.iter().enumerate() {
            if self.cancel.is_cancelled() {
                info!("Copy cancelled after {} of {} file(s)", index, total);
                summary.cancelled = true;
                return;
            }

            match self.copy_item(item) {
                Ok(CopyOutcome::Copied(bytes)) => {
                    summary.copied += 1;
                    summary.bytes_copied += bytes;
                }
                Ok(CopyOutcome::Skipped) => summary.copy_skipped += 1,
                Err(e) => {
                    warn!("{}", e);
                    self.status(e.to_string());
                    summary.copy_failed += 1;
                    summary.failures.push(e);
                }
            }

            let percent = progress.copy(index + 1, total);
            self.report(
                TransferPhase::Copying,
                percent,
                index + 1,
                total,
                Some(item.source().to_path_buf()),
            );
        }
    }

    fn copy_item(&self, item: &TransferItem) -> std::result::Result<CopyOutcome, ItemError> {
        let destination = item.destination();
        let target = match self.config.on_conflict {
            _ if !destination.exists() => destination.to_path_buf(),
            ConflictPolicy::Overwrite => destination.to_path_buf(),
            ConflictPolicy::Skip => {
                trace!("Skipping existing file: {}", destination.display());
                return Ok(CopyOutcome::Skipped);
            }
            ConflictPolicy::Rename => unique_path(destination),
        };

        let bytes = copy_preserving_times(item.source(), &target).map_err(|e| ItemError::Copy {
            path: item.source().to_path_buf(),
            reason: e.to_string(),
        })?;
        debug!("Copied: {} ({} bytes)", target.display(), bytes);
        Ok(CopyOutcome::Copied(bytes))
    }

    fn convert_phase(&self, progress: &mut ProgressState, summary: &mut TransferSummary) {
        let candidates = match list_convertible(&self.config.destination) {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!("Cannot list {}: {}", self.config.destination.display(), e);
                self.status(format!("Could not look for HEIC files to convert: {}", e));
                return;
            }
        };

        let total = candidates.len();
        if total > 0 {
            self.status(format!(
                "Converting {} HEIC file(s) to JPEG using {}",
                total,
                self.converter.decoder_name()
            ));
        }
        self.report(TransferPhase::Converting, progress.convert(0, total), 0, total, None);

        let mut log = ConversionLog::load(&self.config.destination);
        for (index, path) in candidates.iter().enumerate() {
            if self.cancel.is_cancelled() {
                info!("Conversion cancelled after {} of {} file(s)", index, total);
                summary.cancelled = true;
                break;
            }

            if let Some(output) = log.converted_output(path) {
                trace!("Already converted: {} -> {}", path.display(), output.display());
                summary.convert_skipped += 1;
            } else {
                match self.converter.convert(path) {
                    Ok(conversion) => {
                        debug!("Converted {}", conversion.output.display());
                        log.record(path, &conversion.output);
                        summary.converted += 1;
                    }
                    Err(e) => {
                        let error = ItemError::Convert {
                            path: path.clone(),
                            reason: e.to_string(),
                        };
                        warn!("{}", error);
                        self.status(format!("{}. The HEIC file was kept.", error));
                        summary.convert_failed += 1;
                        summary.failures.push(error);
                    }
                }
            }

            let percent = progress.convert(index + 1, total);
            self.report(
                TransferPhase::Converting,
                percent,
                index + 1,
                total,
                Some(path.clone()),
            );
        }

        if let Err(e) = log.save() {
            warn!("Cannot save {}: {}", log.path().display(), e);
        }
    }

    /// Report progress to callback if configured
    fn report(
        &self,
        phase: TransferPhase,
        percent: u8,
        completed: usize,
        total: usize,
        current_file: Option<PathBuf>,
    ) {
        if let Some(ref callback) = self.config.progress_callback {
            callback(TransferUpdate {
                phase,
                percent,
                completed,
                total,
                current_file,
            });
        }
    }

    fn status(&self, message: String) {
        if let Some(ref callback) = self.config.status_callback {
            callback(message);
        }
    }
}

/// Whether a file has one of the copied media extensions
pub fn is_media_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| MEDIA_EXTENSIONS.iter().any(|m| ext.eq_ignore_ascii_case(m)))
}

/// Re-check the source right before copying and find its media folder
///
/// The phone may have been unplugged or locked since discovery.
fn check_source(root: &Path) -> Result<PathBuf> {
    let unavailable = |reason: String| TransferError::SourceUnavailable {
        path: root.to_path_buf(),
        reason,
    };

    match fs::metadata(root) {
        Ok(meta) if meta.is_dir() => {}
        Ok(_) => return Err(unavailable("not a folder".to_string())),
        Err(e) => return Err(unavailable(e.to_string())),
    }

    if let Err(e) = fs::read_dir(root) {
        return Err(listing_error(root, e));
    }

    let media_dir = Verifier::media_dir(root)
        .ok_or_else(|| unavailable("the DCIM folder is missing".to_string()))?;
    if let Err(e) = fs::read_dir(&media_dir) {
        return Err(listing_error(&media_dir, e));
    }
    Ok(media_dir)
}

fn listing_error(path: &Path, e: std::io::Error) -> TransferError {
    if e.kind() == ErrorKind::PermissionDenied {
        TransferError::AccessDenied {
            path: path.to_path_buf(),
        }
    } else {
        TransferError::SourceUnavailable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }
    }
}

/// Create the destination and make sure files can be written into it
fn prepare_destination(dest: &Path) -> Result<()> {
    let destination_error = |reason: String| TransferError::Destination {
        path: dest.to_path_buf(),
        reason,
    };

    fs::create_dir_all(dest).map_err(|e| destination_error(e.to_string()))?;

    let probe = dest.join(".iphone_transfer_write_test");
    fs::write(&probe, b"").map_err(|e| destination_error(e.to_string()))?;
    let _ = fs::remove_file(&probe);
    Ok(())
}

/// Copy through a `.part` file, then carry over the source timestamps
fn copy_preserving_times(source: &Path, target: &Path) -> std::io::Result<u64> {
    let meta = fs::metadata(source)?;

    let mut partial = target.as_os_str().to_owned();
    partial.push(".part");
    let partial = PathBuf::from(partial);

    let result = fs::copy(source, &partial).and_then(|bytes| {
        fs::rename(&partial, target)?;
        Ok(bytes)
    });
    let bytes = match result {
        Ok(bytes) => bytes,
        Err(e) => {
            let _ = fs::remove_file(&partial);
            return Err(e);
        }
    };

    let atime = FileTime::from_last_access_time(&meta);
    let mtime = FileTime::from_last_modification_time(&meta);
    if let Err(e) = filetime::set_file_times(target, atime, mtime) {
        debug!("Could not keep timestamps on {}: {}", target.display(), e);
    }
    Ok(bytes)
}

/// HEIC files directly inside `dir`, in lexical order
fn list_convertible(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_file() && is_convertible(p))
        .collect();
    files.sort();
    Ok(files)
}

// =============================================================================
// Tests
// =============================================================================

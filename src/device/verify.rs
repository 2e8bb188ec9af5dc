//! Verification predicate for candidate media source roots
//!
//! A root is accepted when it has a `DCIM` child (any case) and that folder
//! looks like Apple camera storage: a `NNNAPPLE` subfolder, or an `IMG_*`
//! photo/video inside one of the subfolders.
//!
//! An existing but empty or unreadable `DCIM` folder is also accepted. A
//! locked iPhone often exposes an empty `DCIM`, and rejecting it would hide
//! the device entirely. Callers that need certainty re-check the content
//! before trusting the handle.

use log::trace;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};

/// Standard media-storage folder name on camera devices
pub const MEDIA_DIR_NAME: &str = "DCIM";

/// Default number of entries inspected per subfolder
pub const DEFAULT_SCAN_LIMIT: usize = 50;

/// Folder names such as `100APPLE`, `101APPLE`
static APPLE_FOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\d{3}APPLE$").expect("valid folder pattern"));

/// File names such as `IMG_0001.HEIC`, `IMG_E0042.MOV`
static APPLE_FILE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^IMG_[^.]*\.(heic|heif|jpg|jpeg|png|mov|mp4)$").expect("valid file pattern")
});

/// Why a root was accepted or rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    /// `DCIM` contains a `NNNAPPLE` folder
    VendorFolder(String),
    /// `DCIM` contains an `IMG_*` media file
    VendorFile(PathBuf),
    /// `DCIM` exists but is empty or unreadable
    WeakEvidence,
    /// The root does not look like a media source
    Rejected(String),
}

impl Verification {
    /// Whether the root was accepted
    pub fn is_accepted(&self) -> bool {
        !matches!(self, Verification::Rejected(_))
    }
}

/// Decides whether a path plausibly is an iPhone storage root
#[derive(Debug, Clone)]
pub struct Verifier {
    scan_limit: usize,
}

impl Default for Verifier {
    fn default() -> Self {
        Self {
            scan_limit: DEFAULT_SCAN_LIMIT,
        }
    }
}

impl Verifier {
    /// Create a verifier that inspects at most `scan_limit` entries per subfolder
    pub fn with_scan_limit(scan_limit: usize) -> Self {
        Self {
            scan_limit: scan_limit.max(1),
        }
    }

    /// Decide whether `root` is a media source root
    ///
    /// Never fails: I/O errors count as rejection.
    pub fn verify(&self, root: &Path) -> bool {
        self.inspect(root).is_accepted()
    }

    /// Find the media-storage folder under `root`, matching its name case-insensitively
    pub fn media_dir(root: &Path) -> Option<PathBuf> {
        let entries = fs::read_dir(root).ok()?;
        entries
            .flatten()
            .find(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| name.eq_ignore_ascii_case(MEDIA_DIR_NAME))
                    && entry.path().is_dir()
            })
            .map(|entry| entry.path())
    }

    /// Inspect `root` and report the evidence found
    pub fn inspect(&self, root: &Path) -> Verification {
        let Some(dcim) = Self::media_dir(root) else {
            return Verification::Rejected(format!("no {} folder", MEDIA_DIR_NAME));
        };

        let entries: Vec<fs::DirEntry> = match fs::read_dir(&dcim) {
            Ok(entries) => entries.flatten().collect(),
            Err(e) => {
                trace!("{} is unreadable: {}", dcim.display(), e);
                return Verification::WeakEvidence;
            }
        };

        if entries.is_empty() {
            return Verification::WeakEvidence;
        }

        let mut subfolders = Vec::new();
        let mut loose_files = Vec::new();
        for entry in entries {
            let path = entry.path();
            if path.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    if APPLE_FOLDER.is_match(name) {
                        return Verification::VendorFolder(name.to_string());
                    }
                }
                subfolders.push(path);
            } else {
                loose_files.push(path);
            }
        }

        // Some mounts flatten DCIM, so loose files count as a subfolder of their own.
        if subfolders.is_empty() {
            if let Some(found) = self.first_vendor_file(loose_files) {
                return Verification::VendorFile(found);
            }
        }

        for folder in &subfolders {
            let Ok(children) = fs::read_dir(folder) else {
                continue;
            };
            let names = children.flatten().map(|e| e.path());
            if let Some(found) = self.first_vendor_file(names) {
                return Verification::VendorFile(found);
            }
        }

        Verification::Rejected(format!(
            "{} has no Apple folders or IMG_ files",
            MEDIA_DIR_NAME
        ))
    }

    fn first_vendor_file<I>(&self, paths: I) -> Option<PathBuf>
    where
        I: IntoIterator<Item = PathBuf>,
    {
        paths.into_iter().take(self.scan_limit).find(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|name| APPLE_FILE.is_match(name))
        })
    }
}

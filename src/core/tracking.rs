//! Record of conversions done in a destination folder
//!
//! A hidden JSON file next to the copied photos lists every HEIC file this
//! tool converted and the JPEG it produced. The convert phase consults it so
//! that running again does not convert the same photo twice, while a JPEG
//! that merely shares a HEIC file's name (the camera counter wraps after
//! `IMG_9999`) never stops a conversion.

use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

/// Name of the record file inside the destination folder
pub const CONVERSION_LOG_NAME: &str = ".iphone_transfer_conversions.json";

const LOG_VERSION: u32 = 1;

/// One HEIC file converted by this tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvertedEntry {
    /// File name of the JPEG written for it
    pub output: String,
    /// HEIC size at conversion time
    pub size: u64,
    /// HEIC modification time at conversion time (seconds since epoch)
    pub modified: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct LogFile {
    version: u32,
    #[serde(default)]
    converted: BTreeMap<String, ConvertedEntry>,
}

/// Conversion record of one destination folder
#[derive(Debug)]
pub struct ConversionLog {
    path: PathBuf,
    entries: BTreeMap<String, ConvertedEntry>,
    dirty: bool,
}

impl ConversionLog {
    /// Load the record of `dir`, starting empty if there is none
    pub fn load(dir: &Path) -> Self {
        let path = dir.join(CONVERSION_LOG_NAME);
        let entries = match File::open(&path) {
            Ok(file) => match serde_json::from_reader::<_, LogFile>(BufReader::new(file)) {
                Ok(log) => {
                    debug!(
                        "Loaded {} conversion record(s) from {}",
                        log.converted.len(),
                        path.display()
                    );
                    log.converted
                }
                Err(e) => {
                    warn!("Ignoring unreadable {}: {}", path.display(), e);
                    BTreeMap::new()
                }
            },
            Err(_) => BTreeMap::new(),
        };

        Self {
            path,
            entries,
            dirty: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// JPEG previously produced from `heic`, if the HEIC is unchanged and
    /// the JPEG is still there
    pub fn converted_output(&self, heic: &Path) -> Option<PathBuf> {
        let entry = self.entries.get(&file_key(heic)?)?;
        let (size, modified) = fingerprint(heic)?;
        if entry.size != size || entry.modified != modified {
            trace!("{} changed since it was converted", heic.display());
            return None;
        }

        let output = heic.with_file_name(&entry.output);
        output.is_file().then_some(output)
    }

    /// Remember that `heic` was converted into `output`
    pub fn record(&mut self, heic: &Path, output: &Path) {
        let (Some(key), Some(name), Some((size, modified))) = (
            file_key(heic),
            output.file_name().map(|n| n.to_string_lossy().into_owned()),
            fingerprint(heic),
        ) else {
            return;
        };

        self.entries.insert(
            key,
            ConvertedEntry {
                output: name,
                size,
                modified,
            },
        );
        self.dirty = true;
    }

    /// Write the record back if anything changed
    pub fn save(&mut self) -> std::io::Result<()> {
        if !self.dirty {
            trace!("Conversion record unchanged, skipping save");
            return Ok(());
        }

        let log = LogFile {
            version: LOG_VERSION,
            converted: self.entries.clone(),
        };
        let writer = BufWriter::new(File::create(&self.path)?);
        serde_json::to_writer_pretty(writer, &log)?;
        self.dirty = false;
        debug!("Saved conversion record: {}", self.path.display());
        Ok(())
    }
}

fn file_key(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().into_owned())
}

fn fingerprint(path: &Path) -> Option<(u64, u64)> {
    let meta = fs::metadata(path).ok()?;
    let modified = meta
        .modified()
        .ok()?
        .duration_since(UNIX_EPOCH)
        .ok()?
        .as_secs();
    Some((meta.len(), modified))
}

//! Probes over fixed filesystem locations
//!
//! Covers user-configured paths and the well-known places where each OS
//! mounts a phone: `/Volumes` on macOS, gvfs and `/media` on Linux, drive
//! letters on Windows.

use crate::device::traits::{ProbeContext, ProbeResult, ProbeStrategy, Transport};
use log::{debug, trace};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Volume name fragments that suggest an iPhone
pub const DEVICE_NAME_HINTS: &[&str] = &["iphone", "apple", "ipad"];

/// Where to look for candidate roots
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchLocation {
    /// The path itself is a candidate root
    Direct(PathBuf),
    /// Every child folder of the path is a candidate root
    Children(PathBuf),
}

/// Probe that checks a list of known locations
#[derive(Debug, Clone)]
pub struct PathListProbe {
    name: String,
    transport: Transport,
    locations: Vec<SearchLocation>,
}

impl PathListProbe {
    /// Create a probe over the given locations
    pub fn new(name: &str, transport: Transport, locations: Vec<SearchLocation>) -> Self {
        Self {
            name: name.to_string(),
            transport,
            locations,
        }
    }

    /// Probe for paths the user listed in the configuration
    pub fn configured(paths: &[PathBuf]) -> Self {
        Self::new(
            "Configured paths",
            Transport::Manual,
            paths.iter().cloned().map(SearchLocation::Direct).collect(),
        )
    }

    /// Probe for the platform's usual phone mount points
    pub fn mounted_volumes() -> Self {
        Self::new(
            "Mounted volumes",
            Transport::MountedVolume,
            platform_mount_locations(),
        )
    }

    /// Locations this probe searches
    pub fn locations(&self) -> &[SearchLocation] {
        &self.locations
    }

    /// Expand locations into candidate paths, hinted names first
    fn candidates(&self) -> Vec<PathBuf> {
        let mut candidates = Vec::new();
        for location in &self.locations {
            match location {
                SearchLocation::Direct(path) => {
                    if path.is_dir() {
                        candidates.push(path.clone());
                    }
                }
                SearchLocation::Children(parent) => {
                    let mut children = match list_child_dirs(parent) {
                        Some(children) => children,
                        None => continue,
                    };
                    children.sort_by_key(|child| !has_device_hint(child));
                    candidates.extend(children);
                }
            }
        }
        let mut seen = HashSet::new();
        candidates.retain(|path| seen.insert(path.clone()));
        candidates
    }
}

impl ProbeStrategy for PathListProbe {
    fn name(&self) -> &str {
        &self.name
    }

    fn transport(&self) -> Transport {
        self.transport
    }

    fn probe(&self, ctx: &ProbeContext) -> ProbeResult {
        let candidates = self.candidates();
        debug!("{}: {} candidate path(s)", self.name, candidates.len());
        ProbeResult::from_candidates(candidates, &ctx.verifier)
    }
}

/// Whether a path's last component names an Apple device
pub fn has_device_hint(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.to_lowercase())
        .is_some_and(|name| DEVICE_NAME_HINTS.iter().any(|hint| name.contains(hint)))
}

/// Child folders of `parent`, or `None` when it cannot be listed
fn list_child_dirs(parent: &Path) -> Option<Vec<PathBuf>> {
    let entries = match fs::read_dir(parent) {
        Ok(entries) => entries,
        Err(e) => {
            trace!("Skipping {}: {}", parent.display(), e);
            return None;
        }
    };
    let mut dirs: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort();
    Some(dirs)
}

/// Well-known mount locations for the current OS
#[cfg(target_os = "macos")]
pub fn platform_mount_locations() -> Vec<SearchLocation> {
    vec![
        SearchLocation::Direct(PathBuf::from("/Volumes/Apple iPhone")),
        SearchLocation::Direct(PathBuf::from("/Volumes/iPhone")),
        SearchLocation::Children(PathBuf::from("/Volumes")),
    ]
}

/// Well-known mount locations for the current OS
#[cfg(target_os = "linux")]
pub fn platform_mount_locations() -> Vec<SearchLocation> {
    let mut locations = Vec::new();
    if let Some(runtime) = dirs::runtime_dir() {
        locations.push(SearchLocation::Children(runtime.join("gvfs")));
    }
    if let Ok(user) = std::env::var("USER") {
        locations.push(SearchLocation::Children(PathBuf::from("/media").join(&user)));
        locations.push(SearchLocation::Children(
            PathBuf::from("/run/media").join(&user),
        ));
    }
    locations.push(SearchLocation::Children(PathBuf::from("/mnt")));
    locations
}

/// Well-known mount locations for the current OS
#[cfg(windows)]
pub fn platform_mount_locations() -> Vec<SearchLocation> {
    logical_drive_roots()
        .into_iter()
        .map(SearchLocation::Direct)
        .collect()
}

/// Well-known mount locations for the current OS
#[cfg(not(any(target_os = "macos", target_os = "linux", windows)))]
pub fn platform_mount_locations() -> Vec<SearchLocation> {
    Vec::new()
}

/// Root paths (`C:\`, `D:\`, ...) of the logical drives present
#[cfg(windows)]
pub fn logical_drive_roots() -> Vec<PathBuf> {
    use windows::Win32::Storage::FileSystem::GetLogicalDrives;

    // SAFETY: GetLogicalDrives takes no arguments and returns a bitmask.
    let mask = unsafe { GetLogicalDrives() };
    (0..26u8)
        .filter(|bit| mask & (1 << bit) != 0)
        .map(|bit| PathBuf::from(format!("{}:\\", (b'A' + bit) as char)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testdb::MediaTreeBuilder;

    #[test]
    fn test_direct_location_found() {
        let tree = MediaTreeBuilder::new().apple_folder("100APPLE").build();
        let probe = PathListProbe::configured(&[tree.root().to_path_buf()]);

        let result = probe.probe(&ProbeContext::default());
        assert_eq!(result, ProbeResult::Candidate(tree.root().to_path_buf()));
    }

    #[test]
    fn test_missing_direct_location_is_no_candidate() {
        let probe = PathListProbe::configured(&[PathBuf::from("/no/such/volume")]);
        assert_eq!(
            probe.probe(&ProbeContext::default()),
            ProbeResult::NoCandidate
        );
    }

    #[test]
    fn test_children_prefer_hinted_names() {
        let volumes = tempfile::tempdir().unwrap();
        fs::create_dir_all(volumes.path().join("Backup/DCIM/100CANON")).unwrap();
        fs::create_dir_all(volumes.path().join("Untitled")).unwrap();
        fs::create_dir_all(volumes.path().join("Apple iPhone/DCIM/100APPLE")).unwrap();

        let probe = PathListProbe::new(
            "Volumes",
            Transport::MountedVolume,
            vec![SearchLocation::Children(volumes.path().to_path_buf())],
        );

        let candidates = probe.candidates();
        assert_eq!(candidates[0], volumes.path().join("Apple iPhone"));

        let result = probe.probe(&ProbeContext::default());
        assert_eq!(
            result,
            ProbeResult::CandidateVerified(volumes.path().join("Apple iPhone"))
        );
    }

    #[test]
    fn test_overlapping_locations_list_each_path_once() {
        let volumes = tempfile::tempdir().unwrap();
        let phone = volumes.path().join("Apple iPhone");
        fs::create_dir_all(phone.join("DCIM/100APPLE")).unwrap();
        fs::create_dir_all(volumes.path().join("Untitled")).unwrap();

        let probe = PathListProbe::new(
            "Volumes",
            Transport::MountedVolume,
            vec![
                SearchLocation::Direct(phone.clone()),
                SearchLocation::Direct(volumes.path().join("Untitled")),
                SearchLocation::Children(volumes.path().to_path_buf()),
            ],
        );

        let candidates = probe.candidates();
        assert_eq!(candidates, vec![phone, volumes.path().join("Untitled")]);
    }

    #[test]
    fn test_has_device_hint() {
        assert!(has_device_hint(Path::new("/Volumes/Apple iPhone")));
        assert!(has_device_hint(Path::new("/run/user/1000/gvfs/gphoto2:host=Apple_Inc._iPhone")));
        assert!(!has_device_hint(Path::new("/media/usb-stick")));
    }
}

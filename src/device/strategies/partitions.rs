//! Last-resort scan over every mounted partition

use crate::device::traits::{ProbeContext, ProbeResult, ProbeStrategy, Transport};
use crate::device::verify::Verifier;
use log::{debug, trace};
use std::path::{Path, PathBuf};
use sysinfo::Disks;
use walkdir::WalkDir;

/// How deep below a mount point to look for a `DCIM` folder
const SCAN_DEPTH: usize = 1;

/// Probe that inspects every partition the OS reports
///
/// Removable disks are checked first. For each mount point the root itself
/// and its direct child folders are candidates, as long as they hold a
/// media-storage folder.
#[derive(Debug, Clone, Default)]
pub struct PartitionScanProbe {
    roots: Option<Vec<PathBuf>>,
}

impl PartitionScanProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan a fixed set of mount points instead of asking the OS
    pub fn with_roots(roots: Vec<PathBuf>) -> Self {
        Self { roots: Some(roots) }
    }

    fn mount_points(&self) -> Vec<PathBuf> {
        if let Some(roots) = &self.roots {
            return roots.clone();
        }

        let disks = Disks::new_with_refreshed_list();
        let mut mounts: Vec<(bool, PathBuf)> = disks
            .list()
            .iter()
            .map(|disk| (disk.is_removable(), disk.mount_point().to_path_buf()))
            .collect();
        mounts.sort_by_key(|(removable, _)| !removable);
        mounts.into_iter().map(|(_, path)| path).collect()
    }
}

impl ProbeStrategy for PartitionScanProbe {
    fn name(&self) -> &str {
        "Partition scan"
    }

    fn transport(&self) -> Transport {
        Transport::PartitionScan
    }

    fn probe(&self, ctx: &ProbeContext) -> ProbeResult {
        let mut candidates = Vec::new();
        for mount in self.mount_points() {
            trace!("Scanning partition {}", mount.display());
            candidates.extend(roots_with_media_dir(&mount));
        }
        candidates.dedup();
        debug!("Partition scan: {} candidate path(s)", candidates.len());

        // A lone DCIM on some partition is no proof; always verify here.
        candidates
            .iter()
            .map(|path| ProbeResult::verified(path, &ctx.verifier))
            .find(ProbeResult::is_some)
            .unwrap_or(ProbeResult::NoCandidate)
    }
}

fn roots_with_media_dir(mount: &Path) -> Vec<PathBuf> {
    WalkDir::new(mount)
        .max_depth(SCAN_DEPTH)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_dir())
        .map(|entry| entry.into_path())
        .filter(|dir| Verifier::media_dir(dir).is_some())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testdb::MediaTreeBuilder;
    use std::fs;

    #[test]
    fn test_finds_device_under_mount() {
        let mount = tempfile::tempdir().unwrap();
        fs::create_dir_all(mount.path().join("Camera/DCIM/100CANON")).unwrap();
        fs::create_dir_all(mount.path().join("Phone/DCIM/100APPLE")).unwrap();

        let probe = PartitionScanProbe::with_roots(vec![mount.path().to_path_buf()]);
        assert_eq!(
            probe.probe(&ProbeContext::default()),
            ProbeResult::CandidateVerified(mount.path().join("Phone"))
        );
    }

    #[test]
    fn test_mount_point_itself_is_candidate() {
        let tree = MediaTreeBuilder::new().apple_folder("100APPLE").build();
        let probe = PartitionScanProbe::with_roots(vec![tree.root().to_path_buf()]);
        assert_eq!(
            probe.probe(&ProbeContext::default()),
            ProbeResult::CandidateVerified(tree.root().to_path_buf())
        );
    }

    #[test]
    fn test_nothing_found() {
        let mount = tempfile::tempdir().unwrap();
        fs::create_dir_all(mount.path().join("Documents")).unwrap();

        let probe = PartitionScanProbe::with_roots(vec![
            mount.path().to_path_buf(),
            PathBuf::from("/no/such/mount"),
        ]);
        assert_eq!(
            probe.probe(&ProbeContext::default()),
            ProbeResult::NoCandidate
        );
    }
}

//! Probes that ask the OS where the phone is mounted
//!
//! Each probe runs one OS utility under a hard timeout and parses its output
//! into candidate roots. A missing tool, a timeout or a failure status all
//! mean "no candidate".

use crate::device::command::{output_lines, run_with_timeout};
use crate::device::traits::{ProbeContext, ProbeResult, ProbeStrategy, Transport};
use log::debug;
use std::path::PathBuf;

/// Turns a command's stdout into candidate paths
pub type OutputParser = fn(&str) -> Vec<PathBuf>;

/// Probe backed by an external command
#[derive(Debug, Clone)]
pub struct CommandProbe {
    name: String,
    program: String,
    args: Vec<String>,
    parser: OutputParser,
}

impl CommandProbe {
    /// Create a probe that runs `program args...` and parses the output
    pub fn new(name: &str, program: &str, args: &[&str], parser: OutputParser) -> Self {
        Self {
            name: name.to_string(),
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            parser,
        }
    }

    /// Spotlight query for iPhone volumes (macOS)
    pub fn spotlight() -> Self {
        Self::new(
            "Spotlight query",
            "mdfind",
            &["kMDItemKind == 'iPhone'"],
            parse_path_lines,
        )
    }

    /// FUSE mounts such as ifuse and gvfs (Linux)
    pub fn fuse_mounts() -> Self {
        Self::new(
            "FUSE mounts",
            "findmnt",
            &["-rn", "-o", "TARGET,FSTYPE"],
            parse_findmnt_fuse,
        )
    }

    /// Removable logical disks through CIM (Windows)
    pub fn removable_disks() -> Self {
        Self::new(
            "Removable disks",
            "powershell",
            &[
                "-NoProfile",
                "-NonInteractive",
                "-Command",
                "Get-CimInstance Win32_LogicalDisk -Filter 'DriveType=2' | ForEach-Object { $_.DeviceID }",
            ],
            parse_drive_ids,
        )
    }

    /// Program this probe runs
    pub fn program(&self) -> &str {
        &self.program
    }
}

impl ProbeStrategy for CommandProbe {
    fn name(&self) -> &str {
        &self.name
    }

    fn transport(&self) -> Transport {
        Transport::ShellNamespace
    }

    fn probe(&self, ctx: &ProbeContext) -> ProbeResult {
        let output = match run_with_timeout(&self.program, &self.args, ctx.command_timeout) {
            Ok(output) => output,
            Err(e) => {
                debug!("{}: {}", self.name, e);
                return ProbeResult::NoCandidate;
            }
        };

        let candidates: Vec<PathBuf> = (self.parser)(&output)
            .into_iter()
            .filter(|p| p.is_dir())
            .collect();
        debug!("{}: {} candidate path(s)", self.name, candidates.len());
        ProbeResult::from_candidates(candidates, &ctx.verifier)
    }
}

/// One absolute path per line
pub fn parse_path_lines(output: &str) -> Vec<PathBuf> {
    output_lines(output).map(PathBuf::from).collect()
}

/// `findmnt -rn -o TARGET,FSTYPE` rows whose type is a FUSE filesystem
///
/// `findmnt -r` escapes spaces in targets as `\x20`.
pub fn parse_findmnt_fuse(output: &str) -> Vec<PathBuf> {
    output_lines(output)
        .filter_map(|line| {
            let (target, fstype) = line.rsplit_once(' ')?;
            if !fstype.starts_with("fuse") {
                return None;
            }
            let target = target.replace("\\x20", " ");
            // gvfs mounts one folder per device under a common root.
            if fstype.contains("gvfsd") {
                Some(PathBuf::from(target).join("*"))
            } else {
                Some(PathBuf::from(target))
            }
        })
        .flat_map(expand_gvfs)
        .collect()
}

/// `E:` style drive ids, one per line
pub fn parse_drive_ids(output: &str) -> Vec<PathBuf> {
    output_lines(output)
        .filter(|line| line.len() == 2 && line.ends_with(':'))
        .map(|line| PathBuf::from(format!("{}\\", line)))
        .collect()
}

fn expand_gvfs(path: PathBuf) -> Vec<PathBuf> {
    if path.file_name().and_then(|n| n.to_str()) != Some("*") {
        return vec![path];
    }
    let Some(parent) = path.parent() else {
        return Vec::new();
    };
    match std::fs::read_dir(parent) {
        Ok(entries) => entries.flatten().map(|e| e.path()).collect(),
        Err(_) => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_path_lines() {
        let parsed = parse_path_lines("/Volumes/iPhone\n\n/Volumes/Other\n");
        assert_eq!(
            parsed,
            vec![PathBuf::from("/Volumes/iPhone"), PathBuf::from("/Volumes/Other")]
        );
    }

    #[test]
    fn test_parse_findmnt_keeps_fuse_only() {
        let output = "/ ext4\n/home/me/iPhone fuse.ifuse\n/boot/efi vfat\n/mnt/My\\x20Phone fuse\n";
        let parsed = parse_findmnt_fuse(output);
        assert_eq!(
            parsed,
            vec![
                PathBuf::from("/home/me/iPhone"),
                PathBuf::from("/mnt/My Phone")
            ]
        );
    }

    #[test]
    fn test_parse_findmnt_expands_gvfs() {
        let runtime = tempfile::tempdir().unwrap();
        let gvfs = runtime.path().join("gvfs");
        std::fs::create_dir_all(gvfs.join("afc:host=abc")).unwrap();

        let output = format!("{} fuse.gvfsd-fuse\n", gvfs.display());
        let parsed = parse_findmnt_fuse(&output);
        assert_eq!(parsed, vec![gvfs.join("afc:host=abc")]);
    }

    #[test]
    fn test_parse_drive_ids() {
        let parsed = parse_drive_ids("E:\r\nF:\r\nnot-a-drive\r\n");
        assert_eq!(parsed, vec![PathBuf::from("E:\\"), PathBuf::from("F:\\")]);
    }

    #[test]
    fn test_missing_tool_is_no_candidate() {
        let probe = CommandProbe::new(
            "Broken",
            "definitely-not-a-real-program-xyz",
            &[],
            parse_path_lines,
        );
        assert_eq!(
            probe.probe(&ProbeContext::default()),
            ProbeResult::NoCandidate
        );
    }
}

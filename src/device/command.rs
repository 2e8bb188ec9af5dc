//! Time-bounded execution of OS utilities
//!
//! Discovery shells out to tools like `mdfind`, `findmnt` and PowerShell.
//! Any of them can hang on an unresponsive device, so every call gets a hard
//! deadline after which the child process is killed.

use log::{debug, trace};
use std::ffi::OsStr;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

/// Why an external command produced no usable output
#[derive(Error, Debug)]
pub enum CommandError {
    /// The program could not be started (missing tool, permissions)
    #[error("failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The program did not finish within the deadline and was killed
    #[error("'{program}' timed out after {timeout:?}")]
    Timeout { program: String, timeout: Duration },

    /// The program exited with a failure status
    #[error("'{program}' exited with status {status}")]
    Failed { program: String, status: String },
}

/// Run `program` with `args`, returning its stdout as text
///
/// The child is killed when the deadline passes.
pub fn run_with_timeout<S: AsRef<OsStr>>(
    program: &str,
    args: &[S],
    timeout: Duration,
) -> Result<String, CommandError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|source| CommandError::Spawn {
            program: program.to_string(),
            source,
        })?;

    trace!("Running '{}' with a {:?} deadline", program, timeout);

    runtime.block_on(async {
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| CommandError::Spawn {
                program: program.to_string(),
                source,
            })?;

        // Dropping the output future on timeout drops the child, which kills it.
        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|source| CommandError::Spawn {
                program: program.to_string(),
                source,
            })?,
            Err(_) => {
                debug!("'{}' timed out, killing it", program);
                return Err(CommandError::Timeout {
                    program: program.to_string(),
                    timeout,
                });
            }
        };

        if !output.status.success() {
            return Err(CommandError::Failed {
                program: program.to_string(),
                status: output.status.to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    })
}

/// Non-empty, trimmed lines of a command's output
pub fn output_lines(output: &str) -> impl Iterator<Item = &str> {
    output.lines().map(str::trim).filter(|line| !line.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_missing_program_is_spawn_error() {
        let result = run_with_timeout(
            "definitely-not-a-real-program-xyz",
            &["--version"],
            Duration::from_secs(2),
        );
        assert!(matches!(result, Err(CommandError::Spawn { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_output_is_captured() {
        let output = run_with_timeout("echo", &["hello"], Duration::from_secs(5)).unwrap();
        assert_eq!(output.trim(), "hello");
    }

    #[cfg(unix)]
    #[test]
    fn test_hung_program_is_killed() {
        let start = Instant::now();
        let result = run_with_timeout("sleep", &["30"], Duration::from_millis(200));
        assert!(matches!(result, Err(CommandError::Timeout { .. })));
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[cfg(unix)]
    #[test]
    fn test_failure_status() {
        let result = run_with_timeout("false", &[] as &[&str], Duration::from_secs(5));
        assert!(matches!(result, Err(CommandError::Failed { .. })));
    }

    #[test]
    fn test_output_lines() {
        let lines: Vec<&str> = output_lines("  a \n\n b\r\n").collect();
        assert_eq!(lines, vec!["a", "b"]);
    }
}

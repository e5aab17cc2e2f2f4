//! Running the wrapped command
//!
//! stdin and stdout are inherited. stderr is forwarded byte for byte and its
//! tail is kept so a failed run can be reported with the command's own
//! diagnostics.

use crate::error::{CrosbyError, CrosbyResult};
use std::path::Path;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::debug;

/// Max number of stderr lines included in error messages.
const STDERR_TAIL_LINES: usize = 50;

/// Keep the last `STDERR_TAIL_LINES` lines of captured output
pub(crate) fn error_tail(lines: &[String]) -> String {
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

/// Run `args[0]` with `args[1..]` in `workdir` and wait for it.
///
/// A launch failure is `CommandFailed`; a non-zero exit or signal is
/// `CommandExecution` carrying the stderr tail.
pub async fn run_command(args: &[String], workdir: &Path) -> CrosbyResult<()> {
    let (program, rest) = args
        .split_first()
        .ok_or_else(|| CrosbyError::Internal("no command to run".to_string()))?;
    let shown = args.join(" ");
    debug!("Executing: {} in {}", shown, workdir.display());

    let mut child = Command::new(program)
        .args(rest)
        .current_dir(workdir)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| CrosbyError::command_failed(shown.clone(), e))?;

    let captured = match child.stderr.take() {
        Some(stderr) => forward_stderr(stderr).await,
        None => Vec::new(),
    };

    let status = child
        .wait()
        .await
        .map_err(|e| CrosbyError::command_failed(shown.clone(), e))?;

    if status.success() {
        Ok(())
    } else {
        debug!("Command exited with {}", status);
        let mut stderr = error_tail(&captured);
        if stderr.is_empty() {
            stderr = status.to_string();
        }
        Err(CrosbyError::command_exec(shown, stderr))
    }
}

/// Copy the child's stderr to ours until EOF, returning its lines.
///
/// Bytes are passed through untouched; only the captured copy is decoded.
/// The pipe is drained even if our own stderr goes away.
async fn forward_stderr(stderr: impl AsyncRead + Unpin) -> Vec<String> {
    let mut reader = BufReader::new(stderr);
    let mut out = tokio::io::stderr();
    let mut captured = Vec::new();
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                debug!("Reading command stderr failed: {}", e);
                break;
            }
        }
        if out.write_all(&buf).await.is_ok() {
            let _ = out.flush().await;
        }
        let line = String::from_utf8_lossy(&buf);
        captured.push(line.trim_end_matches(['\n', '\r']).to_string());
        if captured.len() > STDERR_TAIL_LINES * 2 {
            captured.drain(..STDERR_TAIL_LINES);
        }
    }
    captured
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string(), script.to_string()]
    }

    #[test]
    fn error_tail_keeps_last_lines() {
        let lines: Vec<String> = (0..60).map(|i| format!("line {}", i)).collect();
        let tail = error_tail(&lines);
        assert!(tail.starts_with("line 10"));
        assert!(tail.ends_with("line 59"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn runs_in_workdir() {
        let dir = TempDir::new().unwrap();
        run_command(&sh("echo built > out.txt"), dir.path()).await.unwrap();
        assert_eq!(
            std::fs::read_to_string(dir.path().join("out.txt")).unwrap(),
            "built\n"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn nonzero_exit_carries_stderr() {
        let dir = TempDir::new().unwrap();
        let err = run_command(&sh("echo 'undefined reference' >&2; exit 3"), dir.path())
            .await
            .unwrap_err();
        match err {
            CrosbyError::CommandExecution { stderr, .. } => {
                assert!(stderr.contains("undefined reference"))
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn missing_program_fails_to_launch() {
        let dir = TempDir::new().unwrap();
        let err = run_command(&["crosby-no-such-binary".to_string()], dir.path())
            .await
            .unwrap_err();
        assert!(matches!(err, CrosbyError::CommandFailed { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn invalid_utf8_stderr_does_not_stop_forwarding() {
        let dir = TempDir::new().unwrap();
        let script = "printf 'caf\\351 warning\\n' >&2; sleep 0.2; \
                      echo 'second warning' >&2; echo done > out.txt";
        run_command(&sh(script), dir.path()).await.unwrap();
        assert!(dir.path().join("out.txt").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn invalid_utf8_stderr_is_tailed_lossily() {
        let dir = TempDir::new().unwrap();
        let script = "printf 'caf\\351\\n' >&2; echo 'link failed' >&2; exit 1";
        let err = run_command(&sh(script), dir.path()).await.unwrap_err();
        match err {
            CrosbyError::CommandExecution { stderr, .. } => {
                assert!(stderr.starts_with("caf\u{FFFD}"));
                assert!(stderr.ends_with("link failed"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}

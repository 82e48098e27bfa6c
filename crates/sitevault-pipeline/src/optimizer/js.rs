//! External JavaScript minifier invocation.

use std::io;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Reasons a minifier run produced nothing usable.
#[derive(Debug, Error)]
pub(crate) enum MinifyError {
    #[error("no minifier configured")]
    Disabled,
    #[error("minifier could not be started")]
    Spawn { source: io::Error },
    #[error("minifier io failed")]
    Io { source: io::Error },
    #[error("minifier timed out")]
    Timeout { after: Duration },
    #[error("minifier exited unsuccessfully")]
    Exit { status: ExitStatus },
    #[error("minifier produced no output")]
    Empty,
}

impl MinifyError {
    pub(crate) const fn reason(&self) -> &'static str {
        match self {
            Self::Disabled => "js_minifier_disabled",
            Self::Spawn { .. } => "js_minifier_unavailable",
            Self::Io { .. } => "js_minifier_io",
            Self::Timeout { .. } => "js_minifier_timeout",
            Self::Exit { .. } => "js_minifier_failed",
            Self::Empty => "js_minifier_empty",
        }
    }
}

/// Pipe `source` through `command` and return its stdout.
///
/// The child is killed when the timeout elapses or the future is dropped.
pub(crate) async fn minify_js(
    source: &[u8],
    command: &[String],
    timeout: Duration,
) -> Result<Vec<u8>, MinifyError> {
    let (program, args) = command.split_first().ok_or(MinifyError::Disabled)?;
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| MinifyError::Spawn { source })?;

    let mut stdin = child.stdin.take().ok_or_else(|| MinifyError::Io {
        source: io::Error::other("stdin not captured"),
    })?;
    let input = source.to_vec();
    let writer = tokio::spawn(async move {
        let result = stdin.write_all(&input).await;
        drop(stdin);
        result
    });

    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| MinifyError::Timeout { after: timeout })?
        .map_err(|source| MinifyError::Io { source })?;
    if let Ok(Err(source)) = writer.await {
        return Err(MinifyError::Io { source });
    }
    if !output.status.success() {
        return Err(MinifyError::Exit {
            status: output.status,
        });
    }
    if output.stdout.iter().all(u8::is_ascii_whitespace) {
        return Err(MinifyError::Empty);
    }
    Ok(output.stdout)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(parts: &[&str]) -> Vec<String> {
        parts.iter().map(ToString::to_string).collect()
    }

    #[tokio::test]
    async fn empty_command_is_disabled() {
        let err = minify_js(b"var a = 1;", &[], Duration::from_secs(1))
            .await
            .expect_err("disabled");
        assert_eq!(err.reason(), "js_minifier_disabled");
    }

    #[tokio::test]
    async fn missing_program_is_reported() {
        let err = minify_js(
            b"var a = 1;",
            &command(&["sitevault-no-such-minifier"]),
            Duration::from_secs(1),
        )
        .await
        .expect_err("missing");
        assert_eq!(err.reason(), "js_minifier_unavailable");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn stdout_of_filter_is_returned() {
        let output = minify_js(b"var  a = 1;", &command(&["cat"]), Duration::from_secs(5))
            .await
            .expect("cat echoes input");
        assert_eq!(output, b"var  a = 1;");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn slow_minifier_times_out() {
        let err = minify_js(
            b"var a;",
            &command(&["sleep", "5"]),
            Duration::from_millis(100),
        )
        .await
        .expect_err("timeout");
        assert_eq!(err.reason(), "js_minifier_timeout");
    }
}

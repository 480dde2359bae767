//! Subprocess supervision - spawn, capture stdout, stream stderr to the log

use std::collections::VecDeque;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;

/// Stderr lines kept for error reports
const STDERR_HISTORY: usize = 50;

/// Output of a successful process. Its stderr has already gone to the log.
#[derive(Debug, Default)]
pub struct Captured {
    pub stdout: String,
}

/// Why a process did not succeed, with whatever stderr it produced
#[derive(Debug)]
pub struct ProcessFailure {
    pub cause: String,
    pub stderr: String,
}

/// Run a command to completion.
///
/// Stdout is buffered in full. Stderr is forwarded line by line to the log
/// under `label` while the last lines are kept for the failure report.
pub async fn run_captured(mut cmd: Command, label: &str) -> Result<Captured, ProcessFailure> {
    log::debug!("[{}] spawn {:?}", label, cmd.as_std());

    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|e| ProcessFailure {
        cause: format!("spawn failed: {}", e),
        stderr: String::new(),
    })?;

    let mut stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let read_stdout = async {
        let mut buf = Vec::new();
        if let Some(out) = stdout.as_mut() {
            if let Err(e) = out.read_to_end(&mut buf).await {
                log::warn!("[{}] stdout read error: {}", label, e);
            }
        }
        buf
    };

    let read_stderr = async {
        let mut history = VecDeque::with_capacity(STDERR_HISTORY);
        if let Some(err) = stderr {
            let mut lines = BufReader::new(err).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        log::info!("[{}] {}", label, line);
                        if history.len() == STDERR_HISTORY {
                            history.pop_front();
                        }
                        history.push_back(line);
                    }
                    Ok(None) => break,
                    Err(e) => {
                        log::warn!("[{}] stderr read error: {}", label, e);
                        break;
                    }
                }
            }
        }
        Vec::from(history).join("\n")
    };

    let (stdout_buf, stderr_text) = tokio::join!(read_stdout, read_stderr);

    let status = child.wait().await.map_err(|e| ProcessFailure {
        cause: format!("wait failed: {}", e),
        stderr: stderr_text.clone(),
    })?;

    if !status.success() {
        return Err(ProcessFailure {
            cause: status.to_string(),
            stderr: stderr_text,
        });
    }

    Ok(Captured {
        stdout: String::from_utf8_lossy(&stdout_buf).into_owned(),
    })
}

/// Quote a word for `sh -c`
pub fn shell_quote(word: &str) -> String {
    if !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,@+%".contains(c))
    {
        return word.to_string();
    }
    format!("'{}'", word.replace('\'', r#"'\''"#))
}

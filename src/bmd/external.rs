//! Version 0x0E payloads are decoded by an out-of-process tool.

use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

use super::error::{BmdError, Result};

/// Header the external tool expects in front of the encrypted body.
pub const DELEGATED_HEADER: &[u8; 4] = b"MAP\x01";

pub const DEFAULT_TOOL_NAME: &str = "mu_terrain_decrypt";

/// Decodes one tagged buffer into plaintext of implementation-defined length.
pub trait DelegatedDecryptor: Send + Sync {
    fn decrypt(&self, tagged: &[u8]) -> Result<Vec<u8>>;
}

/// Used when no tool is configured. Every call fails for that file only.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableDecryptor;

impl DelegatedDecryptor for UnavailableDecryptor {
    fn decrypt(&self, _tagged: &[u8]) -> Result<Vec<u8>> {
        Err(BmdError::decryption(format!(
            "version 0x0E requires the external {} tool, none configured",
            DEFAULT_TOOL_NAME
        )))
    }
}

/// Runs `<tool> <input> <output>` against temp files with a wall-clock timeout.
#[derive(Debug, Clone)]
pub struct ProcessDecryptor {
    tool: PathBuf,
    timeout: Duration,
}

impl ProcessDecryptor {
    pub fn new(tool: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            tool: tool.into(),
            timeout,
        }
    }
}

const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Characters of the tool's stderr kept in error messages.
const STDERR_TAIL: usize = 500;

fn stderr_tail(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    let text = text.trim();
    let skip = text.chars().count().saturating_sub(STDERR_TAIL);
    text.chars().skip(skip).collect()
}

impl DelegatedDecryptor for ProcessDecryptor {
    fn decrypt(&self, tagged: &[u8]) -> Result<Vec<u8>> {
        let dir = tempfile::tempdir()?;
        let input = dir.path().join("payload.enc");
        let output = dir.path().join("payload.dec");
        std::fs::write(&input, tagged)?;

        debug!(tool = %self.tool.display(), bytes = tagged.len(), "invoking delegated decryptor");

        let mut child = Command::new(&self.tool)
            .arg(&input)
            .arg(&output)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                BmdError::decryption(format!("failed to start {}: {}", self.tool.display(), e))
            })?;

        // drained on its own thread so a chatty tool cannot fill the pipe
        let stderr = child.stderr.take();
        let stderr_reader = thread::spawn(move || {
            let mut raw = Vec::new();
            if let Some(mut pipe) = stderr {
                let _ = pipe.read_to_end(&mut raw);
            }
            raw
        });

        let started = Instant::now();
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if started.elapsed() >= self.timeout {
                let _ = child.kill();
                let _ = child.wait();
                return Err(BmdError::decryption(format!(
                    "{} timed out after {}s",
                    self.tool.display(),
                    self.timeout.as_secs()
                )));
            }
            thread::sleep(POLL_INTERVAL);
        };

        if !status.success() {
            let tail = stderr_reader.join().map(|raw| stderr_tail(&raw)).unwrap_or_default();
            let mut message = format!("{} exited with {}", self.tool.display(), status);
            if !tail.is_empty() {
                message.push_str(": ");
                message.push_str(&tail);
            }
            return Err(BmdError::decryption(message));
        }

        std::fs::read(&output).map_err(|e| {
            BmdError::decryption(format!("{} produced no output: {}", self.tool.display(), e))
        })
    }
}

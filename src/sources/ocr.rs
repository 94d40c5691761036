use anyhow::{anyhow, bail, Context, Result};
use std::io::Write;
use std::process::{Command, Stdio};
use std::sync::Arc;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

pub const DEFAULT_OCR_LANGUAGES: &str = "eng+chi_sim";

/// Turns an encoded image into recognized text lines.
pub trait TextRecognizer: Send + Sync + 'static {
    fn recognize(&self, png: &[u8]) -> Result<String>;
}

/// Recognizer backed by the `tesseract` command line tool.
#[derive(Debug, Clone)]
pub struct TesseractRecognizer {
    binary: String,
    languages: String,
}

impl TesseractRecognizer {
    pub fn new(languages: impl Into<String>) -> Self {
        Self {
            binary: "tesseract".to_string(),
            languages: languages.into(),
        }
    }

    pub fn languages(&self) -> &str {
        &self.languages
    }

    pub fn is_available(&self) -> bool {
        Command::new(&self.binary)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }
}

impl Default for TesseractRecognizer {
    fn default() -> Self {
        Self::new(DEFAULT_OCR_LANGUAGES)
    }
}

impl TextRecognizer for TesseractRecognizer {
    fn recognize(&self, png: &[u8]) -> Result<String> {
        let spawned = Command::new(&self.binary)
            .args(["stdin", "stdout", "-l", &self.languages])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                bail!("{} not found (install tesseract-ocr)", self.binary)
            }
            Err(err) => return Err(anyhow!(err).context("failed to start tesseract")),
        };

        {
            let mut stdin = child
                .stdin
                .take()
                .context("tesseract stdin was not captured")?;
            stdin
                .write_all(png)
                .context("failed to pipe image to tesseract")?;
        }

        let output = child
            .wait_with_output()
            .context("failed to wait for tesseract")?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("tesseract failed: {}", stderr.trim());
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Runs recognition off the async runtime and swallows failures.
#[derive(Clone)]
pub struct ImageAdapter {
    recognizer: Arc<dyn TextRecognizer>,
}

impl ImageAdapter {
    pub fn new(recognizer: Arc<dyn TextRecognizer>) -> Self {
        Self { recognizer }
    }

    /// Recognized lines joined by newlines, or `None` when recognition failed or
    /// produced nothing.
    pub async fn recognize(&self, png: Vec<u8>) -> Option<String> {
        let recognizer = Arc::clone(&self.recognizer);
        let bytes = png.len();
        let result = tokio::task::spawn_blocking(move || recognizer.recognize(&png)).await;

        let raw = match result {
            Ok(Ok(text)) => text,
            Ok(Err(err)) => {
                log_warn!("image recognition failed ({bytes} bytes): {err:?}");
                return None;
            }
            Err(err) => {
                log_warn!("image recognition task failed: {err}");
                return None;
            }
        };

        let text = join_lines(&raw);
        if text.is_empty() {
            log_debug!("image recognition produced no text ({bytes} bytes)");
            None
        } else {
            Some(text)
        }
    }
}

fn join_lines(raw: &str) -> String {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

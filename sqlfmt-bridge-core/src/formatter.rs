//! High-level entry point: provision sqlfmt, map settings, run it.
//!
//! [`SqlFormatter`] is what a host embeds. Every call leases the binary for
//! the duration of the run, so an update landing in the meantime waits until
//! the invocation finishes.

use std::ops::Range;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::FormatSettings;
use crate::invoke::{build_args, run_formatter, FormatError, Formatted, DEFAULT_FORMAT_TIMEOUT};
use crate::provision::{BinaryStatus, ProvisionError, Provisioner};

#[derive(Debug, Error)]
pub enum FormatterError {
    #[error("sqlfmt is unavailable: {0}")]
    BinaryUnavailable(#[from] ProvisionError),

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error("Range {start}..{end} is not valid for a text of {len} bytes")]
    InvalidRange { start: usize, end: usize, len: usize },
}

impl FormatterError {
    /// True when sqlfmt rejected the SQL, as opposed to the environment
    /// (network, install root, process) failing.
    pub fn is_content_problem(&self) -> bool {
        matches!(self, Self::Format(e) if e.is_tool_error())
    }
}

/// Formats SQL with a provisioned sqlfmt binary.
pub struct SqlFormatter {
    provisioner: Arc<Provisioner>,
    root: PathBuf,
    timeout: Duration,
}

impl SqlFormatter {
    pub fn new(provisioner: Arc<Provisioner>, root: impl Into<PathBuf>) -> Self {
        Self {
            provisioner,
            root: root.into(),
            timeout: DEFAULT_FORMAT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Installs or updates the binary without formatting anything.
    pub async fn ensure_binary(&self) -> Result<PathBuf, FormatterError> {
        Ok(self
            .provisioner
            .ensure_binary(&self.root)
            .await
            .into_result()?)
    }

    /// Reports the installed binary without touching the network.
    pub async fn status(&self) -> BinaryStatus {
        self.provisioner.status(&self.root).await
    }

    /// Formats a whole document.
    ///
    /// On error the caller's text is left as it was; nothing partial is
    /// returned.
    pub async fn format(
        &self,
        text: &str,
        settings: &FormatSettings,
    ) -> Result<Formatted, FormatterError> {
        let lease = self.provisioner.lease(&self.root).await?;
        let args = build_args(settings);

        let formatted = run_formatter(lease.path(), &args, text, self.timeout).await?;
        if let Some(diagnostics) = &formatted.diagnostics {
            info!(%diagnostics, "sqlfmt reported diagnostics");
        }

        Ok(formatted)
    }

    /// Formats the byte range `range` of `text` and returns the whole
    /// document with that range replaced.
    pub async fn format_range(
        &self,
        text: &str,
        range: Range<usize>,
        settings: &FormatSettings,
    ) -> Result<Formatted, FormatterError> {
        check_range(text, &range)?;
        debug!(start = range.start, end = range.end, "Formatting range");

        let formatted = self.format(&text[range.clone()], settings).await?;

        let mut document = String::with_capacity(text.len() + formatted.text.len());
        document.push_str(&text[..range.start]);
        document.push_str(&formatted.text);
        document.push_str(&text[range.end..]);

        Ok(Formatted {
            text: document,
            diagnostics: formatted.diagnostics,
        })
    }
}

fn check_range(text: &str, range: &Range<usize>) -> Result<(), FormatterError> {
    let valid = range.start <= range.end
        && range.end <= text.len()
        && text.is_char_boundary(range.start)
        && text.is_char_boundary(range.end);

    if valid {
        Ok(())
    } else {
        Err(FormatterError::InvalidRange {
            start: range.start,
            end: range.end,
            len: text.len(),
        })
    }
}

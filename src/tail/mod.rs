/*!
# Log Tailer

Follows one family of rotating, append-only, newline-delimited node logs.

The node writes each family into hourly partitions
(`<root>/<YYYYMMDD>/<hour>`) and only ever appends to the newest file. A
`LogTailer` repeatedly asks which file is newest and yields the complete lines
appended since the previous poll:

- on the first file it opens after process start, reading begins at end-of-file
  so history is never replayed
- on every later switch the remaining complete lines of the old file are drained
  first, then the new file is read from byte 0
- a trailing line without its newline is held back until a later poll completes it
- a file that shrinks below the cursor was truncated in place and is reread from 0
- a late write to an older partition does not pull the tailer back to it while
  the current file still exists

The tailer is driven by a worker loop that owns it exclusively; it never sleeps
itself. `poll` reports `TailOutcome::Unavailable` when the family has no files yet
and an empty batch when the current file has no new data, leaving backoff policy to
the caller.
*/

pub mod discovery;
pub mod error;

use std::cmp::Ordering;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};
use tracing::{debug, info, warn};

pub use discovery::{latest_file, partition_cmp, read_last_line, rfind_line, LogFile};
pub use error::TailError;

/// Tailing behaviour shared by every log family
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TailConfig {
    /// Sleep after a poll that found no new data
    pub eof_backoff_ms: u64,
    /// Sleep while the family directory is missing or empty
    pub idle_recheck_secs: u64,
    /// Sleep after a read error before retrying
    pub error_backoff_ms: u64,
    /// Upper bound on lines returned by a single poll
    pub max_lines_per_poll: usize,
}

impl Default for TailConfig {
    fn default() -> Self {
        Self {
            eof_backoff_ms: 10,
            idle_recheck_secs: 10,
            error_backoff_ms: 1_000,
            max_lines_per_poll: 10_000,
        }
    }
}

impl TailConfig {
    pub fn eof_backoff(&self) -> Duration {
        Duration::from_millis(self.eof_backoff_ms)
    }

    pub fn idle_recheck(&self) -> Duration {
        Duration::from_secs(self.idle_recheck_secs)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }
}

/// Position of a tailer within its log family
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogCursor {
    /// Family directory
    pub root: PathBuf,
    /// File currently being followed
    pub path: Option<PathBuf>,
    /// Bytes of `path` consumed so far, buffered partial line included
    pub position: u64,
    /// No file has been opened since process start
    pub first_run: bool,
}

impl LogCursor {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            path: None,
            position: 0,
            first_run: true,
        }
    }
}

/// Result of one poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TailOutcome {
    /// The family directory is missing or holds no files
    Unavailable,
    /// Complete lines read during this poll, possibly none
    Lines(Vec<String>),
}

/// Incremental reader over the newest file of a log family
pub struct LogTailer {
    cursor: LogCursor,
    reader: Option<BufReader<File>>,
    pending: Vec<u8>,
    max_lines: usize,
}

impl LogTailer {
    pub fn new(root: impl Into<PathBuf>, config: &TailConfig) -> Self {
        Self {
            cursor: LogCursor::new(root),
            reader: None,
            pending: Vec::new(),
            max_lines: config.max_lines_per_poll.max(1),
        }
    }

    pub fn cursor(&self) -> &LogCursor {
        &self.cursor
    }

    pub fn root(&self) -> &Path {
        &self.cursor.root
    }

    /// Read whatever complete lines are available right now
    pub async fn poll(&mut self) -> Result<TailOutcome, TailError> {
        let Some(latest) = latest_file(&self.cursor.root).await? else {
            return Ok(TailOutcome::Unavailable);
        };
        let target = self.select(latest.path).await;

        let mut lines = Vec::new();

        if self.cursor.path.as_deref() != Some(target.as_path()) {
            if self.reader.is_some() {
                self.read_lines(&mut lines).await?;
                if lines.len() >= self.max_lines {
                    // old file still has backlog, switch on a later poll
                    return Ok(TailOutcome::Lines(lines));
                }
            }
            self.switch_to(target).await?;
        } else if self.reader.is_none() {
            self.reopen().await?;
        } else {
            self.check_truncation().await?;
        }

        self.read_lines(&mut lines).await?;
        Ok(TailOutcome::Lines(lines))
    }

    /// File to follow: the newest one, unless it belongs to an older partition
    /// than the current file and the current file is still there
    async fn select(&self, latest: PathBuf) -> PathBuf {
        let Some(current) = self.cursor.path.as_ref() else {
            return latest;
        };
        if *current == latest || partition_cmp(&latest, current) != Ordering::Less {
            return latest;
        }
        if !tokio::fs::try_exists(current).await.unwrap_or(false) {
            return latest;
        }

        debug!(
            current = %current.display(),
            written = %latest.display(),
            "ignoring write to an older partition"
        );
        current.clone()
    }

    /// Open `path` as the new current file
    async fn switch_to(&mut self, path: PathBuf) -> Result<(), TailError> {
        if !self.pending.is_empty() {
            debug!(
                path = ?self.cursor.path,
                bytes = self.pending.len(),
                "dropping unterminated line at rotation"
            );
            self.pending.clear();
        }

        let mut file = File::open(&path).await.map_err(|source| TailError::Open {
            path: path.clone(),
            source,
        })?;

        let position = if self.cursor.first_run {
            file.seek(SeekFrom::End(0))
                .await
                .map_err(|source| TailError::Open {
                    path: path.clone(),
                    source,
                })?
        } else {
            0
        };

        info!(
            root = %self.cursor.root.display(),
            file = %path.display(),
            position,
            "following log file"
        );

        self.reader = Some(BufReader::new(file));
        self.cursor.path = Some(path);
        self.cursor.position = position;
        self.cursor.first_run = false;
        Ok(())
    }

    /// Reopen the current file at the cursor after a read failure
    async fn reopen(&mut self) -> Result<(), TailError> {
        let Some(path) = self.cursor.path.clone() else {
            return Ok(());
        };

        let mut file = File::open(&path).await.map_err(|source| TailError::Open {
            path: path.clone(),
            source,
        })?;
        let len = file
            .metadata()
            .await
            .map_err(|source| TailError::Open {
                path: path.clone(),
                source,
            })?
            .len();

        if len < self.cursor.position {
            self.cursor.position = 0;
            self.pending.clear();
        }
        file.seek(SeekFrom::Start(self.cursor.position))
            .await
            .map_err(|source| TailError::Open { path, source })?;

        self.reader = Some(BufReader::new(file));
        Ok(())
    }

    /// Restart from byte 0 if the current file shrank below the cursor
    async fn check_truncation(&mut self) -> Result<(), TailError> {
        let (Some(reader), Some(path)) = (self.reader.as_mut(), self.cursor.path.as_ref()) else {
            return Ok(());
        };

        let len = reader
            .get_ref()
            .metadata()
            .await
            .map_err(|source| TailError::Read {
                path: path.clone(),
                source,
            })?
            .len();

        if len < self.cursor.position {
            warn!(
                file = %path.display(),
                len,
                position = self.cursor.position,
                "log file truncated, rereading from start"
            );
            reader
                .seek(SeekFrom::Start(0))
                .await
                .map_err(|source| TailError::Read {
                    path: path.clone(),
                    source,
                })?;
            self.cursor.position = 0;
            self.pending.clear();
        }
        Ok(())
    }

    /// Append complete lines from the current file to `lines`, up to the poll limit
    async fn read_lines(&mut self, lines: &mut Vec<String>) -> Result<(), TailError> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(());
        };

        while lines.len() < self.max_lines {
            let buffered = self.pending.len() as u64;
            let read = match reader.read_until(b'\n', &mut self.pending).await {
                Ok(read) => read,
                Err(source) => {
                    let path = self.cursor.path.clone().unwrap_or_default();
                    self.reader = None;
                    // bytes of an unterminated line are reread after reopening
                    self.cursor.position = self.cursor.position.saturating_sub(buffered);
                    self.pending.clear();
                    return Err(TailError::Read { path, source });
                }
            };
            if read == 0 {
                break;
            }
            self.cursor.position += read as u64;

            if self.pending.last() != Some(&b'\n') {
                // partial line, completed by a later read
                break;
            }
            lines.push(take_line(&mut self.pending));
        }
        Ok(())
    }
}

fn take_line(buf: &mut Vec<u8>) -> String {
    let mut end = buf.len();
    while end > 0 && matches!(buf[end - 1], b'\n' | b'\r') {
        end -= 1;
    }
    let line = String::from_utf8_lossy(&buf[..end]).into_owned();
    buf.clear();
    line
}

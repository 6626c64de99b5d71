//! Locating the newest file of a log family.

use std::cmp::Ordering;
use std::io::{self, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use super::error::TailError;

/// A candidate log file and its modification time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFile {
    pub path: PathBuf,
    pub modified: SystemTime,
}

/// Find the most recently modified regular file anywhere under `root`.
///
/// Hourly partitions (`<root>/<YYYYMMDD>/<hour>`) are walked recursively.
/// Ties on modification time go to the lexicographically greatest path.
/// A missing root yields `Ok(None)`: log families a node never writes are
/// simply absent.
pub async fn latest_file(root: &Path) -> Result<Option<LogFile>, TailError> {
    let mut newest: Option<LogFile> = None;
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            // the root is absent, or a partition was removed mid-walk
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(source) => return Err(TailError::Scan { path: dir, source }),
        };

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(source) => return Err(TailError::Scan { path: dir, source }),
            };

            let metadata = match entry.metadata().await {
                Ok(metadata) => metadata,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(source) => {
                    return Err(TailError::Scan {
                        path: entry.path(),
                        source,
                    })
                }
            };

            if metadata.is_dir() {
                pending.push(entry.path());
                continue;
            }
            if !metadata.is_file() {
                continue;
            }

            let candidate = LogFile {
                path: entry.path(),
                modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            };
            if is_newer(&candidate, newest.as_ref()) {
                newest = Some(candidate);
            }
        }
    }

    Ok(newest)
}

fn is_newer(candidate: &LogFile, current: Option<&LogFile>) -> bool {
    match current {
        None => true,
        Some(current) => {
            (candidate.modified, &candidate.path) > (current.modified, &current.path)
        }
    }
}

/// Order two files of one family by partition: `<YYYYMMDD>/<hour>` components
/// compare numerically, so hour 9 sorts before hour 10
pub fn partition_cmp(a: &Path, b: &Path) -> Ordering {
    partition_key(a).cmp(&partition_key(b))
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Segment {
    Number(u64),
    Text(String),
}

fn partition_key(path: &Path) -> Vec<Segment> {
    path.components()
        .map(|component| {
            let text = component.as_os_str().to_string_lossy();
            match text.parse::<u64>() {
                Ok(number) => Segment::Number(number),
                Err(_) => Segment::Text(text.into_owned()),
            }
        })
        .collect()
}

const BACKWARD_CHUNK: u64 = 64 * 1024;

/// Last non-empty line of a file, or `None` if the file has no content
pub async fn read_last_line(path: &Path) -> io::Result<Option<String>> {
    rfind_line(path, |line| (!line.trim().is_empty()).then(|| line.to_string())).await
}

/// Scan `path` from the end, newest line first, and return the first line
/// `select` accepts. Reads fixed-size chunks backwards from EOF.
pub async fn rfind_line<T>(path: &Path, select: impl FnMut(&str) -> Option<T>) -> io::Result<Option<T>> {
    rfind_line_chunked(path, BACKWARD_CHUNK, select).await
}

async fn rfind_line_chunked<T>(
    path: &Path,
    chunk_size: u64,
    mut select: impl FnMut(&str) -> Option<T>,
) -> io::Result<Option<T>> {
    let mut file = fs::File::open(path).await?;
    let mut end = file.metadata().await?.len();
    // start of the earliest line seen, not yet known to be complete
    let mut carry: Vec<u8> = Vec::new();

    while end > 0 {
        let start = end.saturating_sub(chunk_size);
        let mut buf = vec![0u8; (end - start) as usize];
        file.seek(SeekFrom::Start(start)).await?;
        file.read_exact(&mut buf).await?;
        buf.extend_from_slice(&carry);

        let mut segments: Vec<&[u8]> = buf.split(|&b| b == b'\n').collect();
        let head = if start > 0 { segments.remove(0) } else { &[][..] };

        for segment in segments.iter().rev() {
            let line = String::from_utf8_lossy(segment);
            if let Some(found) = select(line.trim_end_matches('\r')) {
                return Ok(Some(found));
            }
        }

        carry = head.to_vec();
        end = start;
    }
    Ok(None)
}

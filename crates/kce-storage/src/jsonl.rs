//! Append-only newline-delimited JSON logs.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::warn;

#[derive(Debug, Clone)]
pub struct JsonlLog {
    path: PathBuf,
}

impl JsonlLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record as a single line.
    ///
    /// The whole line goes out in one write. If a previous process died mid-line, the torn
    /// tail is terminated first so it stays isolated on its own line.
    pub async fn append<T: Serialize>(&self, record: &T) -> anyhow::Result<()> {
        let mut line = serde_json::to_vec(record)
            .with_context(|| format!("serializing record for {}", self.path.display()))?;
        line.push(b'\n');

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("creating log directory {}", parent.display()))?;
            }
        }

        let mut file = fs::OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("opening log {}", self.path.display()))?;

        if !ends_with_newline(&mut file).await? {
            line.insert(0, b'\n');
        }

        file.write_all(&line)
            .await
            .with_context(|| format!("appending to log {}", self.path.display()))?;
        file.flush()
            .await
            .with_context(|| format!("flushing log {}", self.path.display()))?;
        Ok(())
    }

    /// Read every well-formed record. Torn lines left by an interrupted writer are skipped.
    pub async fn read_all<T: DeserializeOwned>(&self) -> anyhow::Result<Vec<T>> {
        let text = fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("reading log {}", self.path.display()))?;

        let mut out = Vec::new();
        for (idx, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(record) => out.push(record),
                Err(err) => warn!(
                    path = %self.path.display(),
                    line = idx + 1,
                    error = %err,
                    "skipping unreadable log line"
                ),
            }
        }
        Ok(out)
    }
}

async fn ends_with_newline(file: &mut fs::File) -> anyhow::Result<bool> {
    let len = file.metadata().await.context("reading log metadata")?.len();
    if len == 0 {
        return Ok(true);
    }
    file.seek(SeekFrom::End(-1)).await.context("seeking log tail")?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last).await.context("reading log tail")?;
    Ok(last[0] == b'\n')
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::tempdir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Entry {
        title: Option<String>,
        n: i64,
    }

    #[tokio::test]
    async fn appends_one_object_per_line() {
        let dir = tempdir().expect("tempdir");
        let log = JsonlLog::new(dir.path().join("nested/jobs.jsonl"));

        log.append(&Entry { title: Some("Kierowca".into()), n: 1 }).await.unwrap();
        log.append(&Entry { title: None, n: 2 }).await.unwrap();

        let text = std::fs::read_to_string(log.path()).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(text.ends_with('\n'));

        let entries: Vec<Entry> = log.read_all().await.unwrap();
        assert_eq!(entries[0].n, 1);
        assert_eq!(entries[1].title, None);
    }

    #[tokio::test]
    async fn torn_tail_is_isolated_and_skipped() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("duplicates.log");
        std::fs::write(&path, "{\"title\":\"A\",\"n\":1}\n{\"title\":\"B\",\"n").unwrap();
        let log = JsonlLog::new(&path);

        log.append(&Entry { title: Some("C".into()), n: 3 }).await.unwrap();

        let entries: Vec<Entry> = log.read_all().await.unwrap();
        assert_eq!(entries.iter().map(|e| e.n).collect::<Vec<_>>(), vec![1, 3]);
    }
}

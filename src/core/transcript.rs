//! Send/receive transcript
//!
//! Records every exchange of a session. The whole transcript is rewritten
//! to disk as one JSON document each time it is persisted, so a reconnected
//! session starts a fresh file.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Entries kept when no limit is configured
pub const TRANSCRIPT_LIMIT: usize = 10_000;

/// One send/receive round
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    /// Unix timestamp in milliseconds
    pub timestamp: u64,
    pub sent: String,
    pub received: String,
    /// Screen rows after the round
    pub screen: Vec<String>,
}

pub struct Transcript {
    entries: Vec<TranscriptEntry>,
    file_path: PathBuf,
    max_entries: usize,
}

impl Transcript {
    pub fn new(file_path: impl Into<PathBuf>, max_entries: usize) -> Self {
        Self {
            entries: Vec::new(),
            file_path: file_path.into(),
            max_entries: max_entries.max(1),
        }
    }

    /// `<dir>/<username>.json`
    pub fn for_user(dir: &Path, username: &str, max_entries: usize) -> Self {
        Self::new(dir.join(format!("{}.json", username)), max_entries)
    }

    pub fn record(&mut self, sent: &[u8], received: &[u8], screen: Vec<String>) {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        self.entries.push(TranscriptEntry {
            timestamp,
            sent: String::from_utf8_lossy(sent).into_owned(),
            received: String::from_utf8_lossy(received).into_owned(),
            screen,
        });

        if self.entries.len() > self.max_entries {
            let excess = self.entries.len() - self.max_entries;
            self.entries.drain(..excess);
        }
    }

    /// Overwrite the file with the current entries
    pub fn persist(&self) -> io::Result<()> {
        if let Some(parent) = self.file_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let content = serde_json::to_vec_pretty(&self.entries)?;
        fs::write(&self.file_path, content)
    }

    pub fn load(path: &Path) -> io::Result<Vec<TranscriptEntry>> {
        let content = fs::read(path)?;
        Ok(serde_json::from_slice(&content)?)
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_persist_overwrites() -> io::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut transcript = Transcript::for_user(dir.path(), "bot000", 100);

        transcript.record(b"l", b"\x1b[3z", vec!["login".into()]);
        transcript.persist()?;
        transcript.record(b"p", b"Dlvl:1", vec!["Dlvl:1".into()]);
        transcript.persist()?;

        let saved = Transcript::load(&dir.path().join("bot000.json"))?;
        assert_eq!(saved.len(), 2);
        assert_eq!(saved[0].sent, "l");
        assert_eq!(saved[1].screen, vec!["Dlvl:1".to_string()]);
        Ok(())
    }

    #[test]
    fn test_oldest_entries_are_dropped() {
        let mut transcript = Transcript::new("unused.json", 2);
        for key in [b"a", b"b", b"c"] {
            transcript.record(key, b"", Vec::new());
        }
        let sent: Vec<&str> = transcript.entries().iter().map(|e| e.sent.as_str()).collect();
        assert_eq!(sent, vec!["b", "c"]);
    }

    #[test]
    fn test_creates_missing_directory() -> io::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("nested").join("t.json");
        let mut transcript = Transcript::new(&path, 10);
        transcript.record(b"\n", b"--More--", Vec::new());
        transcript.persist()?;
        assert!(path.exists());
        Ok(())
    }
}

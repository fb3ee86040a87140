//! Capture and raw byte logs
//!
//! Captured frames are appended as JSON lines so a session can be inspected
//! or replayed later. Tunnels log raw bytes per direction instead.

use crate::error::BridgeError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sniplay_protocol::{CapturedFrame, LinkFrame};
use std::path::Path;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;

/// One captured frame as stored on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureRecord {
    pub timestamp: DateTime<Utc>,
    pub rssi: i8,
    pub lqi: u8,
    pub length: usize,
    /// Frame bytes as lowercase hex
    pub payload: String,
}

impl CaptureRecord {
    #[must_use]
    pub fn from_captured(captured: &CapturedFrame, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            rssi: captured.rssi,
            lqi: captured.lqi,
            length: captured.frame.len(),
            payload: captured.frame.to_hex(),
        }
    }

    /// Rebuild the captured frame
    pub fn to_captured(&self) -> Result<CapturedFrame, BridgeError> {
        let bytes = decode_hex(&self.payload)
            .ok_or_else(|| BridgeError::InvalidRecord(format!("bad hex: {}", self.payload)))?;
        if bytes.len() != self.length {
            return Err(BridgeError::InvalidRecord(format!(
                "length mismatch: record says {}, payload has {}",
                self.length,
                bytes.len()
            )));
        }
        let frame = LinkFrame::new(bytes)?;
        Ok(CapturedFrame::new(frame, self.rssi, self.lqi))
    }
}

/// Parse contiguous hex (whitespace tolerated)
#[must_use]
pub fn decode_hex(s: &str) -> Option<Vec<u8>> {
    let digits: Vec<u8> = s.bytes().filter(|b| !b.is_ascii_whitespace()).collect();
    if digits.len() % 2 != 0 {
        return None;
    }
    digits
        .chunks(2)
        .map(|pair| {
            let pair = std::str::from_utf8(pair).ok()?;
            u8::from_str_radix(pair, 16).ok()
        })
        .collect()
}

async fn open_append(path: &Path) -> Result<File, BridgeError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    Ok(file)
}

/// Append-only JSON lines log of captured frames
pub struct CaptureLog {
    file: File,
    written: u64,
}

impl CaptureLog {
    /// Open (or create) a log file for appending
    pub async fn open(path: &Path) -> Result<Self, BridgeError> {
        let file = open_append(path).await?;
        tracing::info!("Logging captures to {:?}", path);
        Ok(Self { file, written: 0 })
    }

    /// Append one captured frame
    pub async fn append(&mut self, captured: &CapturedFrame) -> Result<(), BridgeError> {
        let record = CaptureRecord::from_captured(captured, Utc::now());
        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');
        self.file.write_all(&line).await?;
        self.file.flush().await?;
        self.written += 1;
        Ok(())
    }

    #[must_use]
    pub fn written(&self) -> u64 {
        self.written
    }
}

/// Read every record from a capture log, skipping lines that do not parse
pub async fn read_records(path: &Path) -> Result<Vec<CaptureRecord>, BridgeError> {
    let contents = fs::read_to_string(path).await?;
    let mut records = Vec::new();
    for (lineno, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<CaptureRecord>(line) {
            Ok(record) => records.push(record),
            Err(e) => tracing::warn!("Skipping {:?} line {}: {}", path, lineno + 1, e),
        }
    }
    tracing::debug!("Loaded {} capture records from {:?}", records.len(), path);
    Ok(records)
}

/// Append-only raw byte log
pub struct RawLog {
    file: File,
}

impl RawLog {
    pub async fn open(path: &Path) -> Result<Self, BridgeError> {
        let file = open_append(path).await?;
        Ok(Self { file })
    }

    pub async fn append(&mut self, data: &[u8]) -> Result<(), BridgeError> {
        self.file.write_all(data).await?;
        self.file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_path(name: &str) -> PathBuf {
        let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        std::env::temp_dir()
            .join(format!("sniplay-{}-{}", std::process::id(), nanos))
            .join(name)
    }

    #[test]
    fn test_decode_hex() {
        assert_eq!(decode_hex("01ff7A"), Some(vec![0x01, 0xFF, 0x7A]));
        assert_eq!(decode_hex("01 ff"), Some(vec![0x01, 0xFF]));
        assert_eq!(decode_hex(""), Some(vec![]));
        assert_eq!(decode_hex("0"), None);
        assert_eq!(decode_hex("zz"), None);
    }

    #[test]
    fn test_record_rejects_length_mismatch() {
        let record = CaptureRecord {
            timestamp: Utc::now(),
            rssi: -3,
            lqi: 9,
            length: 3,
            payload: "0102".to_string(),
        };
        assert!(matches!(
            record.to_captured(),
            Err(BridgeError::InvalidRecord(_))
        ));
    }

    #[tokio::test]
    async fn test_capture_log_append_and_read() {
        let path = temp_path("captures.jsonl");
        let first = CapturedFrame::new(LinkFrame::from_slice(&[0x41, 0x88]).unwrap(), -60, 110);
        let second = CapturedFrame::new(LinkFrame::default(), 0, 0);

        {
            let mut log = CaptureLog::open(&path).await.unwrap();
            log.append(&first).await.unwrap();
            log.append(&second).await.unwrap();
            assert_eq!(log.written(), 2);
        }

        let records = read_records(&path).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].payload, "4188");
        assert_eq!(records[0].to_captured().unwrap(), first);
        assert_eq!(records[1].to_captured().unwrap(), second);

        let _ = fs::remove_dir_all(path.parent().unwrap()).await;
    }

    #[tokio::test]
    async fn test_raw_log_appends() {
        let path = temp_path("raw.log");
        {
            let mut log = RawLog::open(&path).await.unwrap();
            log.append(b"Snif").await.unwrap();
        }
        {
            let mut log = RawLog::open(&path).await.unwrap();
            log.append(&[0x01, 0xAA]).await.unwrap();
        }
        let contents = fs::read(&path).await.unwrap();
        assert_eq!(contents, b"Snif\x01\xAA".to_vec());

        let _ = fs::remove_dir_all(path.parent().unwrap()).await;
    }
}

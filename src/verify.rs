//! Binary-signature integrity verification
//!
//! Confirms a downloaded artifact is structurally valid for its declared type by
//! checking magic-byte prefixes, never by trusting the extension alone. A
//! "successful" transfer does not guarantee byte-correctness: rate-limited and
//! anti-bot endpoints routinely answer 200 with an HTML error page, and partial
//! writes leave empty files behind.
//!
//! Corruption is never an error here; it is reported through
//! [`VerificationReport`] and the orchestrator decides what to re-fetch.

use crate::types::DownloadItem;
use serde::Serialize;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Bytes read from the head of a file for signature and heuristic checks.
///
/// Signatures need at most 16 bytes; the HTML-error heuristic looks a bit
/// further into the head.
const HEAD_LEN: usize = 512;

/// Bytes of the head consulted by signature matching.
const SIGNATURE_LEN: usize = 16;

/// Structural status of one file on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileStatus {
    /// File exists and its bytes match its declared type
    Valid,
    /// File does not exist
    Missing,
    /// File exists but its bytes do not match its declared type
    Corrupted(String),
}

/// One corrupted file within a [`VerificationReport`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CorruptedFile {
    /// File name within the entity's output directory
    pub name: String,
    /// Why the file failed verification
    pub reason: String,
}

/// Result of verifying an ordered expected-file list against disk
///
/// Recomputed fresh on every verification call; never persisted.
#[derive(Debug, Clone, Default, Serialize)]
pub struct VerificationReport {
    /// Expected files found valid on disk
    pub present_count: usize,
    /// Total files expected
    pub total_expected: usize,
    /// Expected files absent from disk
    pub missing_files: Vec<String>,
    /// Expected files present but structurally invalid
    pub corrupted_files: Vec<CorruptedFile>,
}

impl VerificationReport {
    /// True iff nothing is missing and nothing is corrupted
    pub fn all_present(&self) -> bool {
        self.missing_files.is_empty() && self.corrupted_files.is_empty()
    }
}

/// Check one file's bytes against the signature for its extension
///
/// Zero-length files are always corrupted ("Empty file"), regardless of
/// extension. Extensions without a known signature fall back to a heuristic
/// that rejects HTML error pages and all-zero content.
pub fn check_file(path: &Path) -> FileStatus {
    let mut file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return FileStatus::Missing,
        Err(e) => return FileStatus::Corrupted(format!("Unreadable: {e}")),
    };

    let mut head = [0u8; HEAD_LEN];
    let mut filled = 0;
    loop {
        match file.read(&mut head[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return FileStatus::Corrupted(format!("Unreadable: {e}")),
        }
        if filled == HEAD_LEN {
            break;
        }
    }

    if filled == 0 {
        return FileStatus::Corrupted("Empty file".to_string());
    }

    let head = &head[..filled];
    let sig = &head[..filled.min(SIGNATURE_LEN)];
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();

    match matches_signature(&ext, sig) {
        Some(true) => FileStatus::Valid,
        Some(false) => FileStatus::Corrupted(format!("Invalid {ext} signature")),
        None => check_unknown_extension(head),
    }
}

/// Match the first bytes of a file against the signature for `ext`
///
/// Returns `None` when the extension has no entry in the signature table.
fn matches_signature(ext: &str, sig: &[u8]) -> Option<bool> {
    let ok = match ext {
        "jpg" | "jpeg" => sig.starts_with(&[0xFF, 0xD8]),
        "png" => sig.starts_with(&[0x89, 0x50, 0x4E, 0x47]),
        "gif" => sig.starts_with(b"GIF87a") || sig.starts_with(b"GIF89a"),
        "webp" => sig.starts_with(b"RIFF") && slice_at(sig, 8, 4) == Some(b"WEBP".as_ref()),
        "bmp" => sig.starts_with(&[0x42, 0x4D]),
        "mp4" | "m4v" | "3gp" => {
            slice_at(sig, 4, 4) == Some(b"ftyp".as_ref())
                || matches!(
                    slice_at(sig, 8, 4),
                    Some(b"isom") | Some(b"mp41") | Some(b"mp42")
                )
        }
        "webm" | "mkv" => sig.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]),
        "avi" => sig.starts_with(b"RIFF") && slice_at(sig, 8, 4) == Some(b"AVI ".as_ref()),
        "mov" => matches!(
            slice_at(sig, 4, 4),
            Some(b"ftyp") | Some(b"moov") | Some(b"free")
        ),
        "wmv" | "asf" => sig.starts_with(&[0x30, 0x26, 0xB2, 0x75]),
        "flv" => sig.starts_with(b"FLV"),
        "ogv" => sig.starts_with(b"OggS"),
        _ => return None,
    };
    Some(ok)
}

fn slice_at(buf: &[u8], offset: usize, len: usize) -> Option<&[u8]> {
    buf.get(offset..offset + len)
}

/// Heuristic for files whose extension has no signature entry
///
/// Rejects content that looks like an HTML error page or is entirely zero bytes;
/// accepts everything else.
fn check_unknown_extension(head: &[u8]) -> FileStatus {
    let text = String::from_utf8_lossy(head).to_ascii_lowercase();
    if text.contains("<html")
        || text.contains("<!doctype")
        || text.contains("404")
        || text.contains("403")
        || text.contains("500")
    {
        return FileStatus::Corrupted("Looks like an HTML error page".to_string());
    }
    if head.iter().all(|&b| b == 0) {
        return FileStatus::Corrupted("Content is all zero bytes".to_string());
    }
    FileStatus::Valid
}

/// Verify an ordered expected-item list against disk
///
/// Each item's `target_path` is checked; the report keys entries by file name.
pub fn verify_items(items: &[DownloadItem]) -> VerificationReport {
    let mut report = VerificationReport {
        total_expected: items.len(),
        ..Default::default()
    };

    for item in items {
        match check_file(&item.target_path) {
            FileStatus::Valid => report.present_count += 1,
            FileStatus::Missing => report.missing_files.push(item.file_name()),
            FileStatus::Corrupted(reason) => report.corrupted_files.push(CorruptedFile {
                name: item.file_name(),
                reason,
            }),
        }
    }

    report
}

/// Verify an ordered expected-file-name list against a directory
pub fn verify_expected(dir: &Path, expected: &[String]) -> VerificationReport {
    let items: Vec<DownloadItem> = expected
        .iter()
        .enumerate()
        .map(|(i, name)| DownloadItem::new("", dir.join(name), i))
        .collect();
    verify_items(&items)
}

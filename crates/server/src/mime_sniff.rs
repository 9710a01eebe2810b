// SPDX-License-Identifier: MIT

//! Upload MIME sniffing (spec.md §6 "validates each file via a MIME
//! sniff", §1 "file-upload MIME sniffing... a pure collaborator" — out of
//! the broker's core concern, so mismatches are recorded as warnings
//! rather than rejections per SPEC_FULL.md §4.G).

use gueridon_core::ShortId;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// One deposited file plus whatever the sniff found.
#[derive(Debug, Clone, Serialize)]
pub struct ManifestEntry {
    pub name: String,
    pub size: u64,
    pub declared_content_type: Option<String>,
    pub sniffed_content_type: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadManifest {
    pub folder: String,
    pub deposit_dir: String,
    pub files: Vec<ManifestEntry>,
}

/// Magic-byte signatures for the small set of types spec.md calls out by
/// name (PNG/JPEG/PDF/plain text); anything else sniffs as `None` and is
/// left to the extension-based guess alone.
fn sniff_magic(bytes: &[u8]) -> Option<&'static str> {
    const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF];
    const PDF: &[u8] = b"%PDF-";

    if bytes.starts_with(PNG) {
        Some("image/png")
    } else if bytes.starts_with(JPEG) {
        Some("image/jpeg")
    } else if bytes.starts_with(PDF) {
        Some("application/pdf")
    } else if bytes.iter().take(512).all(|b| {
        b.is_ascii_graphic() || matches!(b, b' ' | b'\t' | b'\n' | b'\r')
    }) && !bytes.is_empty()
    {
        Some("text/plain")
    } else {
        None
    }
}

/// Generate the deposit directory name `mise/upload--<slug>--<short-id>`
/// (spec.md §6 filesystem layout).
pub fn deposit_dir_name(slug: &str) -> String {
    let short = uuid::Uuid::new_v4().to_string();
    format!("upload--{slug}--{}", short.short(8))
}

/// Sniff `filename`'s declared content-type against its magic bytes and
/// the extension-based guess from `mime_guess`. Returns the entry plus an
/// optional warning string (never an error: MIME sniffing never blocks an
/// upload, per spec.md §1).
pub fn sniff_entry(
    filename: &str,
    declared_content_type: Option<&str>,
    bytes: &[u8],
) -> (ManifestEntry, Option<String>) {
    let extension_guess = mime_guess::from_path(filename)
        .first()
        .map(|m| m.essence_str().to_string());
    let magic_guess = sniff_magic(bytes).map(str::to_string);
    let sniffed = magic_guess.clone().or_else(|| extension_guess.clone());

    let warning = match (declared_content_type, &magic_guess) {
        (Some(declared), Some(magic)) if declared != magic => Some(format!(
            "declared content-type {declared:?} does not match sniffed {magic:?}"
        )),
        _ => None,
    };

    (
        ManifestEntry {
            name: filename.to_string(),
            size: bytes.len() as u64,
            declared_content_type: declared_content_type.map(str::to_string),
            sniffed_content_type: sniffed,
        },
        warning,
    )
}

/// Reject any filename that would escape `deposit_dir` once joined
/// (spec.md §6 "400 on path traversal").
pub fn safe_join(deposit_dir: &Path, filename: &str) -> Option<PathBuf> {
    if filename.is_empty() || filename.contains(['/', '\\']) || filename == ".." {
        return None;
    }
    Some(deposit_dir.join(filename))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniffs_png_magic_bytes() {
        let bytes = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0];
        let (entry, warning) = sniff_entry("photo.png", Some("image/png"), &bytes);
        assert_eq!(entry.sniffed_content_type.as_deref(), Some("image/png"));
        assert!(warning.is_none());
    }

    #[test]
    fn mismatched_declared_type_warns_but_does_not_error() {
        let bytes = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0];
        let (_, warning) = sniff_entry("photo.txt", Some("text/plain"), &bytes);
        assert!(warning.unwrap().contains("does not match"));
    }

    #[test]
    fn safe_join_rejects_path_traversal() {
        let dir = Path::new("/tmp/deposit");
        assert!(safe_join(dir, "../../etc/passwd").is_none());
        assert!(safe_join(dir, "a/b").is_none());
        assert!(safe_join(dir, "report.pdf").is_some());
    }
}

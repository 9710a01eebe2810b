// SPDX-License-Identifier: MIT

//! `POST /upload/:folder` (spec.md §6): deposit files into a new
//! `mise/upload--<slug>--<short-id>/` folder (spec.md filesystem layout),
//! sniff each file's MIME type as a warning-only collaborator (never a
//! rejection, spec.md §1), and write a `manifest.json` beside them.
//!
//! 400 on path traversal or when the folder has no active runtime — both
//! reported via [`ServerError::Upload`], which this route maps to 400
//! regardless of the fact that "no runtime" is a 404 on every other route
//! (spec.md §6 calls this one out explicitly).

use crate::error::ServerError;
use crate::mime_sniff::{deposit_dir_name, safe_join, sniff_entry, UploadManifest};
use crate::state::AppState;
use axum::extract::{Multipart, Path, State};
use axum::Json;
use gueridon_core::{resolve_folder_path, FolderName};
use serde_json::{json, Value};

const LABEL_FIELD: &str = "label";
const MAX_SLUG_LEN: usize = 32;

pub async fn upload(
    State(state): State<AppState>,
    Path(folder): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<Value>, ServerError> {
    let folder = FolderName::new(folder);
    let folder_path = resolve_folder_path(&state.registry.config().scan_root, folder.as_str())?;

    state.registry.lookup(&folder).ok_or_else(|| {
        ServerError::Upload(format!("no active session for folder {:?}", folder.as_str()))
    })?;

    let mut slug = "upload".to_string();
    let mut files: Vec<(String, Option<String>, Vec<u8>)> = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::Upload(e.to_string()))?
    {
        if field.name() == Some(LABEL_FIELD) {
            let text = field.text().await.map_err(|e| ServerError::Upload(e.to_string()))?;
            slug = sanitize_slug(&text);
            continue;
        }

        let filename = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| ServerError::Upload("multipart field is missing a filename".to_string()))?;
        let declared_content_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await.map_err(|e| ServerError::Upload(e.to_string()))?;
        files.push((filename, declared_content_type, bytes.to_vec()));
    }

    if files.is_empty() {
        return Err(ServerError::Upload("request contained no files".to_string()));
    }

    let deposit_name = deposit_dir_name(&slug);
    let deposit_dir = folder_path.join("mise").join(&deposit_name);
    std::fs::create_dir_all(&deposit_dir).map_err(|e| ServerError::Upload(e.to_string()))?;

    let mut manifest_entries = Vec::with_capacity(files.len());
    let mut warnings = Vec::new();
    for (filename, declared_content_type, bytes) in files {
        let dest = safe_join(&deposit_dir, &filename)
            .ok_or_else(|| ServerError::Upload(format!("unsafe filename {filename:?}")))?;
        let (entry, warning) = sniff_entry(&filename, declared_content_type.as_deref(), &bytes);
        std::fs::write(&dest, &bytes).map_err(|e| ServerError::Upload(e.to_string()))?;
        if let Some(warning) = warning {
            warnings.push(warning);
        }
        manifest_entries.push(entry);
    }

    let manifest = UploadManifest {
        folder: folder.as_str().to_string(),
        deposit_dir: deposit_name,
        files: manifest_entries,
    };
    let manifest_json =
        serde_json::to_vec_pretty(&manifest).map_err(|e| ServerError::Upload(e.to_string()))?;
    std::fs::write(deposit_dir.join("manifest.json"), manifest_json)
        .map_err(|e| ServerError::Upload(e.to_string()))?;

    Ok(Json(json!({
        "folder": folder,
        "manifest": manifest,
        "warnings": warnings,
    })))
}

/// Reduce a caller-supplied label to the `[a-z0-9-]` alphabet
/// `deposit_dir_name` expects, falling back to `"upload"` when nothing
/// usable survives.
fn sanitize_slug(raw: &str) -> String {
    let cleaned: String = raw
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    let trimmed = cleaned.trim_matches('-');
    if trimmed.is_empty() {
        "upload".to_string()
    } else {
        trimmed.chars().take(MAX_SLUG_LEN).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_slug_lowercases_and_replaces_punctuation() {
        assert_eq!(sanitize_slug("Design Docs!"), "design-docs");
    }

    #[test]
    fn sanitize_slug_falls_back_when_empty() {
        assert_eq!(sanitize_slug("///"), "upload");
    }

    #[test]
    fn sanitize_slug_truncates_long_labels() {
        let long = "a".repeat(100);
        assert_eq!(sanitize_slug(&long).len(), MAX_SLUG_LEN);
    }
}

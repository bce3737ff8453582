//! Media delivery by content hash.

use std::path::{Path as FsPath, PathBuf};

use axum::{
    extract::{Extension, Path},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use base64::Engine;
use serde_json::json;
use tracing::warn;

use crate::domains::catalog::MediaAsset;
use crate::server::app::AppState;

fn resolve_path(media_root: &FsPath, file_path: &str) -> PathBuf {
    let path = FsPath::new(file_path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        media_root.join(path)
    }
}

fn mime_for(asset: &MediaAsset) -> String {
    asset.mime_type.clone().unwrap_or_else(|| {
        mime_guess::from_path(&asset.filename)
            .first_or_octet_stream()
            .to_string()
    })
}

async fn load_asset(state: &AppState, file_hash: &str) -> Option<(MediaAsset, Vec<u8>)> {
    let asset = MediaAsset::find_by_hash(file_hash, &state.deps.db_pool)
        .await
        .ok()
        .flatten()?;
    let path = resolve_path(&state.deps.media_root, &asset.file_path);
    match tokio::fs::read(&path).await {
        Ok(bytes) => Some((asset, bytes)),
        Err(e) => {
            warn!(file_hash, path = %path.display(), error = %e, "media file unreadable");
            None
        }
    }
}

/// Stream a media file by its content hash.
pub async fn video_handler(
    Extension(state): Extension<AppState>,
    Path(file_hash): Path<String>,
) -> Response {
    match load_asset(&state, &file_hash).await {
        Some((asset, bytes)) => {
            ([(header::CONTENT_TYPE, mime_for(&asset))], bytes).into_response()
        }
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Same content, base64-encoded for browser-plugin injection.
pub async fn video_base64_handler(
    Extension(state): Extension<AppState>,
    Path(file_hash): Path<String>,
) -> Response {
    match load_asset(&state, &file_hash).await {
        Some((asset, bytes)) => Json(json!({
            "hash": asset.file_hash,
            "mime_type": mime_for(&asset),
            "size_bytes": bytes.len(),
            "base64": base64::engine::general_purpose::STANDARD.encode(&bytes),
        }))
        .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

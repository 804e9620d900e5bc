use axum::{
    Extension, Json,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use tokio::io::AsyncWriteExt;
use tracing::{error, info};
use uuid::Uuid;

use nest_types::api::UploadResponse;

use crate::error::ApiError;
use crate::middleware::RequestContext;
use crate::state::AppState;

/// Subdirectory of the media dir that listing images are written to.
const LISTING_IMAGE_DIR: &str = "listings";

/// Recognises the accepted image formats by their leading bytes and returns
/// the file extension to store them under.
pub fn image_extension(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
        Some("png")
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("jpg")
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        Some("gif")
    } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        Some("webp")
    } else {
        None
    }
}

/// POST /api/media: takes raw image bytes, stores them under the media dir and
/// returns the reference to put in a listing's `images`.
pub async fn upload_image(
    State(state): State<AppState>,
    Extension(ctx): Extension<RequestContext>,
    bytes: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let caller = ctx.require()?;
    let settings = &state.settings;

    if bytes.is_empty() {
        return Err(ApiError::invalid("file", "The uploaded file is empty."));
    }
    if bytes.len() > settings.max_upload_bytes {
        return Err(ApiError::invalid(
            "file",
            format!("Images must be at most {} bytes.", settings.max_upload_bytes),
        ));
    }
    let Some(ext) = image_extension(&bytes) else {
        return Err(ApiError::invalid("file", "Upload a PNG, JPEG, WebP or GIF image."));
    };

    let dir = settings.media_dir.join(LISTING_IMAGE_DIR);
    tokio::fs::create_dir_all(&dir).await.map_err(|e| {
        error!("Failed to create media directory {}: {}", dir.display(), e);
        anyhow::anyhow!("media directory unavailable: {}", e)
    })?;

    let file_name = format!("{}.{}", Uuid::new_v4(), ext);
    let path = dir.join(&file_name);
    let mut file = tokio::fs::File::create(&path).await.map_err(|e| {
        error!("Failed to create file {}: {}", path.display(), e);
        anyhow::anyhow!("could not store image: {}", e)
    })?;
    file.write_all(&bytes).await.map_err(|e| {
        error!("Failed to write file {}: {}", path.display(), e);
        anyhow::anyhow!("could not store image: {}", e)
    })?;
    file.flush().await.map_err(|e| anyhow::anyhow!("could not store image: {}", e))?;

    let reference = format!("{LISTING_IMAGE_DIR}/{file_name}");
    info!("{} uploaded {} ({} bytes)", caller.email, reference, bytes.len());

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            url: settings.media_location(&reference),
            reference,
            size: bytes.len() as u64,
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognises_accepted_formats_only() {
        assert_eq!(image_extension(b"\x89PNG\r\n\x1a\n rest"), Some("png"));
        assert_eq!(image_extension(&[0xFF, 0xD8, 0xFF, 0xE0]), Some("jpg"));
        assert_eq!(image_extension(b"GIF89a...."), Some("gif"));
        assert_eq!(image_extension(b"RIFF\x10\x00\x00\x00WEBPVP8 "), Some("webp"));
        assert_eq!(image_extension(b"RIFF\x10\x00\x00\x00WAVE"), None);
        assert_eq!(image_extension(b"%PDF-1.7"), None);
        assert_eq!(image_extension(b""), None);
    }
}

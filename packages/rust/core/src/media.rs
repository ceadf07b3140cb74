//! Loading uploaded image bytes for vision analysis.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use coursegen_ai::ImagePayload;
use coursegen_shared::{CourseGenError, ImageRef, Result};
use tracing::debug;
use url::Url;

/// User-Agent string for media fetches.
const USER_AGENT: &str = concat!("CourseGen/", env!("CARGO_PKG_VERSION"));

/// Timeout for fetching a remote image.
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Resolves an [`ImageRef`] to bytes the vision model can read.
#[async_trait]
pub trait ImageLoader: Send + Sync {
    async fn load(&self, image: &ImageRef) -> Result<ImagePayload>;
}

/// Reads `media_dir/<filename>`, falling back to the image URL.
pub struct MediaLoader {
    media_dir: PathBuf,
    client: reqwest::Client,
}

impl MediaLoader {
    pub fn new(media_dir: impl Into<PathBuf>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(FETCH_TIMEOUT)
            .build()
            .map_err(|e| CourseGenError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            media_dir: media_dir.into(),
            client,
        })
    }

    /// Local path for `filename`, ignoring any directory components.
    fn local_path(&self, filename: &str) -> Option<PathBuf> {
        let name = Path::new(filename).file_name()?;
        Some(self.media_dir.join(name))
    }

    async fn fetch(&self, url: &Url) -> Result<(Vec<u8>, Option<String>)> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| CourseGenError::Network(format!("failed to fetch {url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CourseGenError::Network(format!("HTTP {status} for {url}")));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string());

        let bytes = response
            .bytes()
            .await
            .map_err(|e| CourseGenError::Network(format!("failed to read {url}: {e}")))?;
        Ok((bytes.to_vec(), content_type))
    }
}

fn guess_mime(filename: &str) -> String {
    mime_guess::from_path(filename)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

fn ensure_image(filename: &str, mime: String) -> Result<String> {
    if mime.starts_with("image/") {
        Ok(mime)
    } else {
        Err(CourseGenError::validation(format!(
            "{filename} is not an image ({mime})"
        )))
    }
}

#[async_trait]
impl ImageLoader for MediaLoader {
    async fn load(&self, image: &ImageRef) -> Result<ImagePayload> {
        if let Some(path) = self.local_path(&image.filename) {
            if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                let bytes = tokio::fs::read(&path)
                    .await
                    .map_err(|e| CourseGenError::io(&path, e))?;
                let mime = ensure_image(&image.filename, guess_mime(&image.filename))?;
                debug!(path = %path.display(), bytes = bytes.len(), "loaded local image");
                return Ok(ImagePayload::from_bytes(mime, &bytes));
            }
        }

        let url = Url::parse(image.url.trim())
            .ok()
            .filter(|u| matches!(u.scheme(), "http" | "https"))
            .ok_or_else(|| {
                CourseGenError::NotFound(format!(
                    "image {} is not in the media directory and has no http(s) URL",
                    image.filename
                ))
            })?;

        let (bytes, content_type) = self.fetch(&url).await?;
        let mime = content_type
            .filter(|m| m.starts_with("image/"))
            .unwrap_or_else(|| guess_mime(&image.filename));
        let mime = ensure_image(&image.filename, mime)?;
        debug!(%url, bytes = bytes.len(), "fetched remote image");
        Ok(ImagePayload::from_bytes(mime, &bytes))
    }
}

//! Listing pictures
//!
//! Pictures are harvested while a listing page is open, either by listening
//! to the image responses the page loads or by downloading the `src` of
//! picture elements, and composited into one vertical JPEG preview.

use crate::browser::{fetch_bytes, Page, ResponseFilter};
use crate::CasaError;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbImage};
use reqwest::Client;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use url::Url;

/// JPEG quality of composited previews
const PREVIEW_QUALITY: u8 = 50;

/// Background capture of image responses for one page
///
/// The listener runs beside the main navigation flow and never fails it:
/// subscription and decoding problems are logged and yield fewer pictures.
pub struct PictureCollector {
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<Vec<Vec<u8>>>>,
}

impl PictureCollector {
    /// A collector that captures nothing
    pub fn idle() -> Self {
        Self {
            stop: None,
            task: None,
        }
    }

    /// Starts listening for up to `limit` responses accepted by `filter`
    pub async fn start(page: &dyn Page, filter: ResponseFilter, limit: usize) -> Self {
        if limit == 0 {
            return Self::idle();
        }

        let mut responses = match page.subscribe_responses(filter).await {
            Ok(responses) => responses,
            Err(e) => {
                tracing::debug!("Picture capture unavailable: {}", e);
                return Self::idle();
            }
        };

        let (stop, mut stopped) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let mut pictures = Vec::new();
            loop {
                tokio::select! {
                    biased;
                    response = responses.recv() => match response {
                        Some(response) => {
                            tracing::trace!("Captured picture {}", response.url);
                            pictures.push(response.body);
                            if pictures.len() >= limit {
                                break;
                            }
                        }
                        None => break,
                    },
                    _ = &mut stopped => break,
                }
            }
            pictures
        });

        Self {
            stop: Some(stop),
            task: Some(task),
        }
    }

    /// Stops listening and returns the captured picture bodies
    pub async fn finish(mut self) -> Vec<Vec<u8>> {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        let Some(task) = self.task.take() else {
            return Vec::new();
        };
        match task.await {
            Ok(pictures) => pictures,
            Err(e) => {
                tracing::warn!("Picture listener failed: {}", e);
                Vec::new()
            }
        }
    }
}

impl Drop for PictureCollector {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Downloads the pictures shown by elements matching `selector`
///
/// Each element's `src` is resolved against the page URL. Failed downloads
/// are skipped.
pub async fn download_pictures(
    client: &Client,
    page: &dyn Page,
    selector: &str,
    limit: usize,
) -> Result<Vec<Vec<u8>>, CasaError> {
    let base = Url::parse(&page.url().await?)?;
    let mut pictures = Vec::new();

    for element in page.query_all(selector).await? {
        if pictures.len() >= limit {
            break;
        }
        let Some(src) = element.attribute("src").await? else {
            continue;
        };
        let url = match base.join(src.trim()) {
            Ok(url) => url,
            Err(e) => {
                tracing::debug!("Skipping picture '{}': {}", src, e);
                continue;
            }
        };
        match fetch_bytes(client, url.as_str()).await {
            Ok(bytes) => pictures.push(bytes),
            Err(e) => tracing::debug!("Picture download failed: {}", e),
        }
    }

    Ok(pictures)
}

/// Stacks pictures vertically into one JPEG
///
/// Every picture is scaled to the narrowest width first. Pictures that do
/// not decode are skipped; `None` when nothing decodes.
pub fn composite_vertically(pictures: &[Vec<u8>]) -> Result<Option<Vec<u8>>, CasaError> {
    let decoded: Vec<DynamicImage> = pictures
        .iter()
        .filter_map(|bytes| match image::load_from_memory(bytes) {
            Ok(picture) => Some(picture),
            Err(e) => {
                tracing::debug!("Skipping undecodable picture: {}", e);
                None
            }
        })
        .collect();

    let Some(width) = decoded.iter().map(DynamicImage::width).min() else {
        return Ok(None);
    };
    if width == 0 {
        return Ok(None);
    }

    let scaled: Vec<RgbImage> = decoded
        .iter()
        .map(|picture| {
            let height = (u64::from(picture.height()) * u64::from(width)
                / u64::from(picture.width()))
            .max(1) as u32;
            picture
                .resize_exact(width, height, FilterType::Triangle)
                .to_rgb8()
        })
        .collect();

    let total_height: u32 = scaled.iter().map(RgbImage::height).sum();
    let mut canvas = RgbImage::new(width, total_height);
    let mut y = 0i64;
    for picture in &scaled {
        imageops::replace(&mut canvas, picture, 0, y);
        y += i64::from(picture.height());
    }

    let mut preview = Vec::new();
    JpegEncoder::new_with_quality(&mut preview, PREVIEW_QUALITY).encode_image(&canvas)?;
    Ok(Some(preview))
}

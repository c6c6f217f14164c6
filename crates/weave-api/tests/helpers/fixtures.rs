//! Test fixtures: real PNG images and stub models.

use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use image::{DynamicImage, GrayImage, ImageFormat, Luma, Rgb, RgbImage};
use weave_inference::{CandidateMask, InferenceError, InpaintModel, InpaintRequest, Segmenter};
use weave_storage::{Storage, StorageBackend, StorageError, StorageResult};

pub const MODEL_WIDTH: u32 = 96;
pub const MODEL_HEIGHT: u32 = 128;

fn png(img: DynamicImage) -> Vec<u8> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .expect("encode png");
    buf
}

/// Smooth gradient standing in for a model photo.
pub fn model_png() -> Vec<u8> {
    png(DynamicImage::ImageRgb8(RgbImage::from_fn(
        MODEL_WIDTH,
        MODEL_HEIGHT,
        |x, y| Rgb([(x * 2) as u8, (y * 2) as u8, 140]),
    )))
}

/// Small red and blue checkerboard swatch.
pub fn fabric_png() -> Vec<u8> {
    png(DynamicImage::ImageRgb8(RgbImage::from_fn(8, 8, |x, y| {
        if (x / 2 + y / 2) % 2 == 0 {
            Rgb([200, 40, 40])
        } else {
            Rgb([40, 40, 200])
        }
    })))
}

fn band(width: u32, height: u32, rows: std::ops::Range<u32>) -> GrayImage {
    GrayImage::from_fn(width, height, |x, y| {
        if rows.contains(&y) && x >= width / 4 && x < width * 3 / 4 {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

/// Segmenter returning a lower-body band first and an upper-body band second,
/// so region assignment has to sort them.
pub struct BandSegmenter;

impl Segmenter for BandSegmenter {
    fn segment(&mut self, image: &RgbImage) -> Result<Vec<CandidateMask>, InferenceError> {
        let (w, h) = image.dimensions();
        Ok(vec![
            CandidateMask {
                mask: band(w, h, h * 5 / 8..h * 7 / 8),
                score: 0.9,
            },
            CandidateMask {
                mask: band(w, h, h / 8..h * 3 / 8),
                score: 0.8,
            },
        ])
    }
}

/// Inpainting stand-in: fills masked pixels with a flat colour and records
/// every prompt it was given.
#[derive(Clone, Default)]
pub struct PaintInpaint {
    pub prompts: Arc<Mutex<Vec<String>>>,
}

impl InpaintModel for PaintInpaint {
    fn inpaint(&mut self, request: &InpaintRequest<'_>) -> Result<RgbImage, InferenceError> {
        self.prompts
            .lock()
            .expect("prompt log")
            .push(request.prompt.to_string());
        let mut out = request.image.clone();
        for (x, y, px) in out.enumerate_pixels_mut() {
            if request.mask.get_pixel(x, y)[0] > 127 {
                *px = Rgb([10, 200, 10]);
            }
        }
        Ok(out)
    }
}

/// Inpainting model whose every pass fails.
pub struct FailingInpaint;

impl InpaintModel for FailingInpaint {
    fn inpaint(&mut self, _request: &InpaintRequest<'_>) -> Result<RgbImage, InferenceError> {
        Err(InferenceError::Inpainting("out of device memory".to_string()))
    }
}

/// Storage that refuses the second mask object it is asked to write.
pub struct SecondMaskFailsStorage {
    inner: Arc<dyn Storage>,
    mask_uploads: AtomicUsize,
}

impl SecondMaskFailsStorage {
    pub fn wrap(inner: Arc<dyn Storage>) -> Arc<dyn Storage> {
        Arc::new(Self {
            inner,
            mask_uploads: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Storage for SecondMaskFailsStorage {
    async fn upload(
        &self,
        key_prefix: &str,
        filename: &str,
        content_type: &str,
        data: Vec<u8>,
    ) -> StorageResult<(String, String)> {
        if key_prefix.ends_with("/masks") && self.mask_uploads.fetch_add(1, Ordering::SeqCst) == 1 {
            return Err(StorageError::UploadFailed("bucket unavailable".to_string()));
        }
        self.inner.upload(key_prefix, filename, content_type, data).await
    }

    async fn download(&self, storage_key: &str) -> StorageResult<Vec<u8>> {
        self.inner.download(storage_key).await
    }

    async fn delete(&self, storage_key: &str) -> StorageResult<()> {
        self.inner.delete(storage_key).await
    }

    async fn exists(&self, storage_key: &str) -> StorageResult<bool> {
        self.inner.exists(storage_key).await
    }

    fn backend_type(&self) -> StorageBackend {
        self.inner.backend_type()
    }
}

//! Segmentation service: candidate masks from a promptless model, reduced to
//! one top and one bottom region mask.

mod regions;

#[cfg(feature = "onnx")]
pub mod onnx;

pub use regions::{assign_regions, vertical_centroid, EMPTY_CENTROID};

use image::{GrayImage, RgbImage};

use crate::error::InferenceError;
use crate::slot::ModelSlot;

/// One region proposed by the segmentation model. `mask` is 0/255 and has the
/// input image's dimensions.
#[derive(Debug, Clone)]
pub struct CandidateMask {
    pub mask: GrayImage,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegionMasks {
    pub top: GrayImage,
    pub bottom: GrayImage,
}

/// Automatic (promptless) segmentation model.
pub trait Segmenter: Send {
    fn segment(&mut self, image: &RgbImage) -> Result<Vec<CandidateMask>, InferenceError>;
}

#[derive(Clone)]
pub struct SegmentationService {
    model: ModelSlot<Box<dyn Segmenter>>,
}

impl SegmentationService {
    pub fn new(model: ModelSlot<Box<dyn Segmenter>>) -> Self {
        Self { model }
    }

    /// Decode `image` and produce its region masks. Any failure, including a
    /// model that cannot be loaded, yields no masks.
    pub async fn generate_masks(&self, image: bytes::Bytes) -> Result<RegionMasks, InferenceError> {
        self.model
            .run(move |segmenter| {
                let rgb = image::load_from_memory(&image)
                    .map_err(|e| InferenceError::Segmentation(format!("cannot decode image: {}", e)))?
                    .to_rgb8();
                let (width, height) = rgb.dimensions();
                let candidates = segmenter.segment(&rgb).map_err(|e| match e {
                    InferenceError::Segmentation(_) | InferenceError::ModelUnavailable(_) => e,
                    other => InferenceError::Segmentation(other.to_string()),
                })?;
                tracing::debug!(
                    candidates = candidates.len(),
                    width,
                    height,
                    "Assigning segmentation candidates to regions"
                );
                Ok(assign_regions(candidates, width, height))
            })
            .await
    }
}

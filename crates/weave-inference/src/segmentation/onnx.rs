//! ONNX Runtime segmenter.
//!
//! Expects an automatic-mask export of a SAM-style model: one input image
//! tensor `[1, 3, S, S]` (RGB, ImageNet-style normalisation in 0-255 units)
//! and outputs `masks [1, N, S, S]` (logits) followed optionally by
//! `scores [1, N]`.

use image::imageops::{self, FilterType};
use image::{GrayImage, Luma, RgbImage};
use ndarray::Array4;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Value;
use std::path::Path;

use super::{CandidateMask, Segmenter};
use crate::error::InferenceError;

const PIXEL_MEAN: [f32; 3] = [123.675, 116.28, 103.53];
const PIXEL_STD: [f32; 3] = [58.395, 57.12, 57.375];

fn unavailable(e: impl std::fmt::Display) -> InferenceError {
    InferenceError::ModelUnavailable(e.to_string())
}

fn failed(e: impl std::fmt::Display) -> InferenceError {
    InferenceError::Segmentation(e.to_string())
}

pub struct OnnxSegmenter {
    session: Session,
    input_size: u32,
}

impl OnnxSegmenter {
    pub fn load(checkpoint: impl AsRef<Path>, input_size: u32) -> Result<Self, InferenceError> {
        let checkpoint = checkpoint.as_ref();
        if !checkpoint.exists() {
            return Err(InferenceError::ModelUnavailable(format!(
                "segmentation checkpoint not found at {}",
                checkpoint.display()
            )));
        }
        let session = Session::builder()
            .map_err(unavailable)?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(unavailable)?
            .commit_from_file(checkpoint)
            .map_err(unavailable)?;
        tracing::info!(
            checkpoint = %checkpoint.display(),
            input_size,
            "Segmentation session ready"
        );
        Ok(Self {
            session,
            input_size,
        })
    }

    fn preprocess(&self, image: &RgbImage) -> Array4<f32> {
        let size = self.input_size;
        let resized = imageops::resize(image, size, size, FilterType::Triangle);
        let mut input = Array4::<f32>::zeros((1, 3, size as usize, size as usize));
        for (x, y, pixel) in resized.enumerate_pixels() {
            for c in 0..3 {
                input[[0, c, y as usize, x as usize]] =
                    (pixel[c] as f32 - PIXEL_MEAN[c]) / PIXEL_STD[c];
            }
        }
        input
    }
}

impl Segmenter for OnnxSegmenter {
    fn segment(&mut self, image: &RgbImage) -> Result<Vec<CandidateMask>, InferenceError> {
        let (width, height) = image.dimensions();
        let input = Value::from_array(self.preprocess(image)).map_err(failed)?;
        let outputs = self.session.run(ort::inputs![input]).map_err(failed)?;

        let keys: Vec<_> = outputs.keys().collect();
        let masks_key = keys
            .first()
            .ok_or_else(|| InferenceError::Segmentation("model produced no outputs".into()))?;
        let masks = outputs
            .get(masks_key)
            .ok_or_else(|| InferenceError::Segmentation("mask output missing".into()))?
            .try_extract_array::<f32>()
            .map_err(failed)?;

        let shape = masks.shape().to_vec();
        if shape.len() < 3 {
            return Err(InferenceError::Segmentation(format!(
                "unexpected mask output shape {:?}",
                shape
            )));
        }
        let mask_h = shape[shape.len() - 2];
        let mask_w = shape[shape.len() - 1];
        let plane = mask_h * mask_w;
        let logits: Vec<f32> = masks.iter().copied().collect();
        let count = if plane == 0 { 0 } else { logits.len() / plane };

        let scores: Vec<f32> = match keys.get(1).and_then(|k| outputs.get(k)) {
            Some(value) => value
                .try_extract_array::<f32>()
                .map_err(failed)?
                .iter()
                .copied()
                .collect(),
            None => Vec::new(),
        };

        let candidates = (0..count)
            .map(|i| {
                let slice = &logits[i * plane..(i + 1) * plane];
                let mask = GrayImage::from_fn(mask_w as u32, mask_h as u32, |x, y| {
                    let logit = slice[y as usize * mask_w + x as usize];
                    Luma([if logit > 0.0 { 255 } else { 0 }])
                });
                CandidateMask {
                    mask: imageops::resize(&mask, width, height, FilterType::Nearest),
                    score: scores.get(i).copied().unwrap_or(1.0),
                }
            })
            .collect::<Vec<_>>();

        tracing::debug!(candidates = candidates.len(), "Segmentation inference complete");
        Ok(candidates)
    }
}

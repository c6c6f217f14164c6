//! Generative compositor: sequential masked inpainting, top region first.
//!
//! Each present region runs one inpainting pass over the current image with
//! that region's mask and the prompt extended by a region suffix. The output
//! of the top pass is the input of the bottom pass. A failing pass aborts the
//! whole render.

#[cfg(feature = "candle")]
pub mod candle;

use image::{GrayImage, RgbImage};

use crate::error::InferenceError;
use crate::slot::ModelSlot;

pub const TOP_PROMPT_SUFFIX: &str = ", top fabric texture";
pub const BOTTOM_PROMPT_SUFFIX: &str = ", bottom fabric texture";

#[derive(Debug, Clone, PartialEq)]
pub struct InpaintParams {
    /// Classifier-free guidance scale.
    pub guidance_scale: f64,
    pub steps: usize,
    /// Share of the schedule that is re-run: 1.0 regenerates the masked area from noise.
    pub strength: f64,
    pub seed: Option<u64>,
}

impl Default for InpaintParams {
    fn default() -> Self {
        Self {
            guidance_scale: 7.5,
            steps: 30,
            strength: 0.8,
            seed: None,
        }
    }
}

/// One inpainting pass.
#[derive(Debug, Clone, Copy)]
pub struct InpaintRequest<'a> {
    pub image: &'a RgbImage,
    /// White is regenerated, black is kept.
    pub mask: &'a GrayImage,
    pub prompt: &'a str,
    /// Fabric swatch for the region. The diffusion backend conditions on the
    /// prompt only.
    pub reference: &'a RgbImage,
    pub params: &'a InpaintParams,
}

pub trait InpaintModel: Send {
    /// Returns an image with the same dimensions as `request.image`.
    fn inpaint(&mut self, request: &InpaintRequest<'_>) -> Result<RgbImage, InferenceError>;
}

/// A fabric swatch and the mask of the region it is applied to.
#[derive(Debug, Clone)]
pub struct RegionPair {
    pub fabric: RgbImage,
    pub mask: GrayImage,
}

#[derive(Clone)]
pub struct GenerativeCompositor {
    model: ModelSlot<Box<dyn InpaintModel>>,
    defaults: InpaintParams,
}

impl GenerativeCompositor {
    pub fn new(model: ModelSlot<Box<dyn InpaintModel>>, defaults: InpaintParams) -> Self {
        Self { model, defaults }
    }

    pub fn defaults(&self) -> &InpaintParams {
        &self.defaults
    }

    pub async fn render(
        &self,
        base: RgbImage,
        top: Option<RegionPair>,
        bottom: Option<RegionPair>,
        prompt: &str,
        params: InpaintParams,
    ) -> Result<RgbImage, InferenceError> {
        if top.is_none() && bottom.is_none() {
            return Ok(base);
        }
        let prompt = prompt.to_string();
        self.model
            .run(move |model| {
                let mut current = base;
                let passes = [(top, TOP_PROMPT_SUFFIX), (bottom, BOTTOM_PROMPT_SUFFIX)];
                for (pair, suffix) in passes {
                    let Some(pair) = pair else { continue };
                    let region_prompt = format!("{}{}", prompt, suffix);
                    tracing::info!(prompt = %region_prompt, steps = params.steps, "Inpainting region");
                    let output = model
                        .inpaint(&InpaintRequest {
                            image: &current,
                            mask: &pair.mask,
                            prompt: &region_prompt,
                            reference: &pair.fabric,
                            params: &params,
                        })
                        .map_err(|e| match e {
                            InferenceError::Inpainting(_) | InferenceError::ModelUnavailable(_) => e,
                            other => InferenceError::Inpainting(other.to_string()),
                        })?;
                    if output.dimensions() != current.dimensions() {
                        return Err(InferenceError::Inpainting(format!(
                            "model returned {}x{} for a {}x{} input",
                            output.width(),
                            output.height(),
                            current.width(),
                            current.height()
                        )));
                    }
                    current = output;
                }
                Ok(current)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb};
    use std::sync::{Arc, Mutex};

    /// Paints masked pixels with a colour derived from the prompt and records every call.
    struct RecordingModel {
        calls: Arc<Mutex<Vec<String>>>,
        fail_on: Option<&'static str>,
    }

    impl InpaintModel for RecordingModel {
        fn inpaint(&mut self, request: &InpaintRequest<'_>) -> Result<RgbImage, InferenceError> {
            self.calls
                .lock()
                .unwrap()
                .push(request.prompt.to_string());
            if let Some(marker) = self.fail_on {
                if request.prompt.contains(marker) {
                    return Err(InferenceError::Inpainting("CUDA out of memory".into()));
                }
            }
            let colour = if request.prompt.ends_with(TOP_PROMPT_SUFFIX) {
                Rgb([255, 0, 0])
            } else {
                Rgb([0, 0, 255])
            };
            let mut out = request.image.clone();
            for (x, y, m) in request.mask.enumerate_pixels() {
                if m[0] > 127 {
                    out.put_pixel(x, y, colour);
                }
            }
            Ok(out)
        }
    }

    fn compositor(fail_on: Option<&'static str>) -> (GenerativeCompositor, Arc<Mutex<Vec<String>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let model: Box<dyn InpaintModel> = Box::new(RecordingModel {
            calls: calls.clone(),
            fail_on,
        });
        (
            GenerativeCompositor::new(ModelSlot::loaded("inpaint", model), InpaintParams::default()),
            calls,
        )
    }

    fn pair(overlap_row: u32) -> RegionPair {
        RegionPair {
            fabric: RgbImage::new(4, 4),
            mask: GrayImage::from_fn(8, 8, |_, y| Luma([if y <= overlap_row { 255 } else { 0 }])),
        }
    }

    #[tokio::test]
    async fn test_top_runs_before_bottom() {
        let (compositor, calls) = compositor(None);
        let bottom = RegionPair {
            fabric: RgbImage::new(4, 4),
            mask: GrayImage::from_fn(8, 8, |_, y| Luma([if y >= 3 { 255 } else { 0 }])),
        };
        let out = compositor
            .render(RgbImage::new(8, 8), Some(pair(4)), Some(bottom), "silk", InpaintParams::default())
            .await
            .unwrap();

        assert_eq!(
            *calls.lock().unwrap(),
            vec![
                "silk, top fabric texture".to_string(),
                "silk, bottom fabric texture".to_string()
            ]
        );
        // Rows 3-4 are in both masks; the bottom pass ran last.
        assert_eq!(out.get_pixel(0, 0), &Rgb([255, 0, 0]));
        assert_eq!(out.get_pixel(0, 3), &Rgb([0, 0, 255]));
        assert_eq!(out.get_pixel(0, 7), &Rgb([0, 0, 255]));
    }

    #[tokio::test]
    async fn test_single_region_runs_one_pass() {
        let (compositor, calls) = compositor(None);
        let bottom = pair(7);
        compositor
            .render(RgbImage::new(8, 8), None, Some(bottom), "denim", InpaintParams::default())
            .await
            .unwrap();
        assert_eq!(
            *calls.lock().unwrap(),
            vec!["denim, bottom fabric texture".to_string()]
        );
    }

    #[tokio::test]
    async fn test_no_regions_returns_base() {
        let (compositor, calls) = compositor(None);
        let base = RgbImage::from_pixel(3, 3, Rgb([1, 2, 3]));
        let out = compositor
            .render(base.clone(), None, None, "x", InpaintParams::default())
            .await
            .unwrap();
        assert_eq!(out, base);
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failing_pass_aborts_render() {
        let (compositor, calls) = compositor(Some("top"));
        let err = compositor
            .render(RgbImage::new(8, 8), Some(pair(3)), Some(pair(7)), "wool", InpaintParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, InferenceError::Inpainting(_)));
        assert_eq!(err.to_string(), "inpainting failed: CUDA out of memory");
        // The bottom pass never ran.
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unloadable_model_fails_render() {
        let compositor = GenerativeCompositor::new(
            ModelSlot::new("inpaint", || {
                Err(InferenceError::ModelUnavailable("weights not downloaded".into()))
            }),
            InpaintParams::default(),
        );
        let err = compositor
            .render(RgbImage::new(8, 8), Some(pair(3)), None, "wool", InpaintParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, InferenceError::ModelUnavailable(_)));
    }
}

//! Model-backed compositing for StyleWeave.
//!
//! - [`segmentation`]: promptless segmentation and the vertical-centroid
//!   heuristic that assigns candidate masks to the top and bottom regions
//! - [`inpaint`]: sequential top-then-bottom diffusion inpainting
//! - [`slot`]: [`ModelSlot`], the lazily loaded, single-owner handle every
//!   model lives behind
//!
//! Concrete backends are feature-gated: `onnx` for the ONNX Runtime
//! segmenter and `candle` for the Stable Diffusion inpainting pipeline.

pub mod error;
pub mod inpaint;
pub mod segmentation;
pub mod slot;

pub use error::InferenceError;
pub use inpaint::{
    GenerativeCompositor, InpaintModel, InpaintParams, InpaintRequest, RegionPair,
    BOTTOM_PROMPT_SUFFIX, TOP_PROMPT_SUFFIX,
};
pub use segmentation::{
    assign_regions, CandidateMask, RegionMasks, SegmentationService, Segmenter,
};
pub use slot::{ModelGuard, ModelSlot};

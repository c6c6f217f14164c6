//! Assignment of candidate masks to body regions.
//!
//! Candidates are ordered by the vertical position of their centroid
//! (ascending, ties keep model order). The first candidate whose centroid
//! lies above the image's vertical midpoint becomes the top mask, the first
//! at or below it the bottom mask. Confidence scores are not consulted.

use image::imageops::{self, FilterType};
use image::GrayImage;

use super::{CandidateMask, RegionMasks};

/// Centroid of a mask with no foreground pixels. Sorts after every real centroid.
pub const EMPTY_CENTROID: f64 = 9999.0;

const FOREGROUND: u8 = 127;

/// Mean row of the mask's foreground pixels.
pub fn vertical_centroid(mask: &GrayImage) -> f64 {
    let (mut sum, mut count) = (0u64, 0u64);
    for (_, y, pixel) in mask.enumerate_pixels() {
        if pixel[0] > FOREGROUND {
            sum += y as u64;
            count += 1;
        }
    }
    if count == 0 {
        EMPTY_CENTROID
    } else {
        sum as f64 / count as f64
    }
}

pub fn assign_regions(candidates: Vec<CandidateMask>, width: u32, height: u32) -> RegionMasks {
    let mut ranked: Vec<(f64, GrayImage)> = candidates
        .into_iter()
        .map(|candidate| {
            let mask = if candidate.mask.dimensions() == (width, height) {
                candidate.mask
            } else {
                imageops::resize(&candidate.mask, width, height, FilterType::Nearest)
            };
            (vertical_centroid(&mask), mask)
        })
        .collect();
    ranked.sort_by(|a, b| a.0.total_cmp(&b.0));

    let midpoint = height as f64 * 0.5;
    let mut top = None;
    let mut bottom = None;
    for (centroid, mask) in ranked {
        if centroid < midpoint {
            top.get_or_insert(mask);
        } else {
            bottom.get_or_insert(mask);
        }
        if top.is_some() && bottom.is_some() {
            break;
        }
    }

    RegionMasks {
        top: top.unwrap_or_else(|| GrayImage::new(width, height)),
        bottom: bottom.unwrap_or_else(|| GrayImage::new(width, height)),
    }
}

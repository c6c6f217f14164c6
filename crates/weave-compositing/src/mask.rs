//! Mask fitting, binarization and bounding boxes.

use image::imageops::{self, FilterType};
use image::{GrayImage, Luma};

/// Mask pixels strictly above this value are inside the region.
pub const MASK_THRESHOLD: u8 = 127;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Resize `mask` to `width`x`height` with linear interpolation when the sizes differ.
pub fn fit_to(mask: &GrayImage, width: u32, height: u32) -> GrayImage {
    if mask.dimensions() == (width, height) {
        return mask.clone();
    }
    imageops::resize(mask, width, height, FilterType::Triangle)
}

pub fn binarize(mask: &GrayImage) -> GrayImage {
    GrayImage::from_fn(mask.width(), mask.height(), |x, y| {
        if mask.get_pixel(x, y)[0] > MASK_THRESHOLD {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

/// Smallest box containing every pixel above [`MASK_THRESHOLD`], or `None` for an empty mask.
pub fn bounding_box(mask: &GrayImage) -> Option<BoundingBox> {
    let mut bounds: Option<(u32, u32, u32, u32)> = None;
    for (x, y, pixel) in mask.enumerate_pixels() {
        if pixel[0] <= MASK_THRESHOLD {
            continue;
        }
        bounds = Some(match bounds {
            None => (x, y, x, y),
            Some((min_x, min_y, max_x, max_y)) => {
                (min_x.min(x), min_y.min(y), max_x.max(x), max_y.max(y))
            }
        });
    }
    bounds.map(|(min_x, min_y, max_x, max_y)| BoundingBox {
        x: min_x,
        y: min_y,
        width: max_x - min_x + 1,
        height: max_y - min_y + 1,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask_with_rect(w: u32, h: u32, x0: u32, y0: u32, x1: u32, y1: u32) -> GrayImage {
        GrayImage::from_fn(w, h, |x, y| {
            if (x0..x1).contains(&x) && (y0..y1).contains(&y) {
                Luma([255])
            } else {
                Luma([0])
            }
        })
    }

    #[test]
    fn test_bounding_box_of_rectangle() {
        let mask = mask_with_rect(40, 30, 5, 8, 20, 12);
        assert_eq!(
            bounding_box(&mask),
            Some(BoundingBox {
                x: 5,
                y: 8,
                width: 15,
                height: 4
            })
        );
    }

    #[test]
    fn test_threshold_is_exclusive() {
        let mask = GrayImage::from_pixel(10, 10, Luma([MASK_THRESHOLD]));
        assert_eq!(bounding_box(&mask), None);

        let mut mask = mask;
        mask.put_pixel(3, 4, Luma([MASK_THRESHOLD + 1]));
        let bbox = bounding_box(&mask).unwrap();
        assert_eq!((bbox.x, bbox.y, bbox.width, bbox.height), (3, 4, 1, 1));
    }

    #[test]
    fn test_binarize_maps_to_extremes() {
        let mask = GrayImage::from_fn(4, 1, |x, _| Luma([[0, 127, 128, 255][x as usize]]));
        let bin = binarize(&mask);
        let values: Vec<u8> = bin.pixels().map(|p| p[0]).collect();
        assert_eq!(values, vec![0, 0, 255, 255]);
    }

    #[test]
    fn test_fit_to_resizes_only_when_needed() {
        let mask = mask_with_rect(20, 10, 0, 0, 10, 10);
        assert_eq!(fit_to(&mask, 20, 10), mask);

        let fitted = fit_to(&mask, 40, 20);
        assert_eq!(fitted.dimensions(), (40, 20));
        let bbox = bounding_box(&fitted).unwrap();
        assert_eq!(bbox.x, 0);
        assert!(bbox.width >= 19 && bbox.width <= 21);
    }
}

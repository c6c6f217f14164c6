//! Swatch tiling. The swatch is repeated, never stretched, so the fabric
//! keeps its texture scale.

use image::imageops::{self, FilterType};
use image::RgbImage;

/// Repeat `swatch` in both axes to cover `width`x`height`, anchored at the top-left.
pub fn tile(swatch: &RgbImage, width: u32, height: u32) -> RgbImage {
    let (sw, sh) = swatch.dimensions();
    if sw == 0 || sh == 0 {
        return RgbImage::new(width, height);
    }
    RgbImage::from_fn(width, height, |x, y| *swatch.get_pixel(x % sw, y % sh))
}

/// Tile `swatch` over a `box_width`x`box_height` patch, scale the patch by
/// `scale` and keep only the part that fits in `max_width`x`max_height`.
///
/// Only the visible pixels are ever allocated, so the cost is bounded by the
/// clip size whatever the scale. Returns `None` when the scaled patch has no
/// pixels.
pub fn scaled_tile(
    swatch: &RgbImage,
    box_width: u32,
    box_height: u32,
    scale: f32,
    max_width: u32,
    max_height: u32,
) -> Option<RgbImage> {
    let scale = scale as f64;
    let full_width = (box_width as f64 * scale).floor();
    let full_height = (box_height as f64 * scale).floor();
    if full_width < 1.0 || full_height < 1.0 || max_width == 0 || max_height == 0 {
        return None;
    }
    let width = full_width.min(max_width as f64) as u32;
    let height = full_height.min(max_height as f64) as u32;

    if scale == 1.0 {
        return Some(tile(swatch, width, height));
    }
    if scale < 1.0 {
        // The scaled patch is never larger than the box here.
        let patch = tile(swatch, box_width, box_height);
        let scaled = imageops::resize(&patch, full_width as u32, full_height as u32, FilterType::Triangle);
        if scaled.dimensions() == (width, height) {
            return Some(scaled);
        }
        return Some(imageops::crop_imm(&scaled, 0, 0, width, height).to_image());
    }

    // Upscaling: sample the pre-image of the visible area.
    let source_width = ((width as f64 / scale).ceil() as u32 + 1).min(box_width);
    let source_height = ((height as f64 / scale).ceil() as u32 + 1).min(box_height);
    let source = tile(swatch, source_width, source_height);
    let max_x = (source_width - 1) as f64;
    let max_y = (source_height - 1) as f64;
    Some(RgbImage::from_fn(width, height, |x, y| {
        let sx = ((x as f64 + 0.5) / scale - 0.5).clamp(0.0, max_x) as f32;
        let sy = ((y as f64 + 0.5) / scale - 0.5).clamp(0.0, max_y) as f32;
        imageops::interpolate_bilinear(&source, sx, sy)
            .unwrap_or_else(|| *source.get_pixel(sx as u32, sy as u32))
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn checker() -> RgbImage {
        RgbImage::from_fn(2, 3, |x, y| Rgb([x as u8 * 100, y as u8 * 50, 7]))
    }

    #[test]
    fn test_tile_repeats_without_stretching() {
        let swatch = checker();
        let tiled = tile(&swatch, 5, 7);
        assert_eq!(tiled.dimensions(), (5, 7));
        for (x, y, pixel) in tiled.enumerate_pixels() {
            assert_eq!(pixel, swatch.get_pixel(x % 2, y % 3));
        }
    }

    #[test]
    fn test_tile_crops_larger_swatch() {
        let swatch = RgbImage::from_fn(50, 50, |x, y| Rgb([x as u8, y as u8, 0]));
        let tiled = tile(&swatch, 10, 4);
        assert_eq!(tiled.dimensions(), (10, 4));
        assert_eq!(tiled.get_pixel(9, 3), &Rgb([9, 3, 0]));
    }

    #[test]
    fn test_scaled_tile_dimensions() {
        let swatch = checker();
        assert_eq!(scaled_tile(&swatch, 10, 6, 1.0, 100, 100).unwrap(), tile(&swatch, 10, 6));
        assert_eq!(
            scaled_tile(&swatch, 10, 6, 0.5, 100, 100).unwrap().dimensions(),
            (5, 3)
        );
        assert_eq!(
            scaled_tile(&swatch, 10, 6, 1.5, 100, 100).unwrap().dimensions(),
            (15, 9)
        );
        assert!(scaled_tile(&swatch, 10, 6, 0.01, 100, 100).is_none());
    }

    #[test]
    fn test_scaled_tile_is_clipped() {
        let swatch = checker();
        assert_eq!(
            scaled_tile(&swatch, 10, 6, 3.0, 12, 4).unwrap().dimensions(),
            (12, 4)
        );
        assert_eq!(
            scaled_tile(&swatch, 10, 6, 0.5, 4, 2).unwrap().dimensions(),
            (4, 2)
        );
    }

    #[test]
    fn test_huge_scale_only_builds_visible_pixels() {
        let swatch = RgbImage::from_pixel(4, 4, Rgb([10, 200, 30]));
        let patch = scaled_tile(&swatch, 30, 20, 100_000.0, 34, 28).unwrap();
        assert_eq!(patch.dimensions(), (34, 28));
        assert!(patch.pixels().all(|p| *p == Rgb([10, 200, 30])));
    }

    #[test]
    fn test_upscale_keeps_swatch_colours() {
        let swatch = RgbImage::from_fn(2, 1, |x, _| {
            if x == 0 {
                Rgb([255, 0, 0])
            } else {
                Rgb([0, 0, 255])
            }
        });
        let patch = scaled_tile(&swatch, 2, 1, 4.0, 100, 100).unwrap();
        assert_eq!(patch.dimensions(), (8, 4));
        assert_eq!(patch.get_pixel(0, 0), &Rgb([255, 0, 0]));
        assert_eq!(patch.get_pixel(7, 3), &Rgb([0, 0, 255]));
    }
}

//! Texture compositor used by the preview path.

use image::{GrayImage, RgbImage};

use crate::codec::{self, EncodedImage, OutputFormat};
use crate::error::CompositeError;
use crate::mask::{self, BoundingBox};
use crate::poisson::{seamless_clone, BlendSettings};
use crate::tiling;

/// Outcome of a composite. `Unchanged` means the base image is the result.
#[derive(Debug, Clone, PartialEq)]
pub enum Composite {
    Unchanged,
    Blended(RgbImage),
}

/// Where a tiled patch lands on the base image.
#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    /// Bounding box of the mask on the base image.
    pub mask_box: BoundingBox,
    /// Placed region, after scaling and clipping to the image.
    pub region: BoundingBox,
    pub patch: RgbImage,
}

impl Placement {
    pub fn center(&self) -> (u32, u32) {
        (
            self.region.x + self.region.width / 2,
            self.region.y + self.region.height / 2,
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct TextureCompositor {
    settings: BlendSettings,
}

impl TextureCompositor {
    pub fn new(settings: BlendSettings) -> Self {
        Self { settings }
    }

    /// Compute the patch and the region it covers, or `None` when nothing would be placed.
    pub fn place(
        &self,
        base: &RgbImage,
        swatch: &RgbImage,
        mask: &GrayImage,
        scale: f32,
    ) -> Result<Option<Placement>, CompositeError> {
        if !scale.is_finite() || scale <= 0.0 {
            return Err(CompositeError::InvalidScale(scale));
        }
        let (width, height) = base.dimensions();
        if width == 0 || height == 0 || swatch.width() == 0 || swatch.height() == 0 {
            return Err(CompositeError::EmptyImage);
        }

        let fitted = mask::fit_to(mask, width, height);
        let Some(mask_box) = mask::bounding_box(&fitted) else {
            return Ok(None);
        };

        let Some(patch) = tiling::scaled_tile(
            swatch,
            mask_box.width,
            mask_box.height,
            scale,
            width - mask_box.x,
            height - mask_box.y,
        ) else {
            return Ok(None);
        };
        let (placed_width, placed_height) = patch.dimensions();

        Ok(Some(Placement {
            mask_box,
            region: BoundingBox {
                x: mask_box.x,
                y: mask_box.y,
                width: placed_width,
                height: placed_height,
            },
            patch,
        }))
    }

    pub fn composite(
        &self,
        base: &RgbImage,
        swatch: &RgbImage,
        mask: &GrayImage,
        scale: f32,
    ) -> Result<Composite, CompositeError> {
        let Some(placement) = self.place(base, swatch, mask, scale)? else {
            tracing::debug!("Mask is empty after thresholding, leaving base unchanged");
            return Ok(Composite::Unchanged);
        };

        let mut pasted = base.clone();
        image::imageops::replace(
            &mut pasted,
            &placement.patch,
            placement.region.x as i64,
            placement.region.y as i64,
        );

        tracing::debug!(
            x = placement.region.x,
            y = placement.region.y,
            width = placement.region.width,
            height = placement.region.height,
            "Blending tiled fabric patch"
        );
        let blended = seamless_clone(&placement.patch, &pasted, placement.center(), &self.settings);
        Ok(Composite::Blended(blended))
    }

    /// Decode, composite and encode in one call. `Ok(None)` means the base is unchanged.
    pub fn composite_encoded(
        &self,
        base: &[u8],
        swatch: &[u8],
        mask: &[u8],
        scale: f32,
        format: OutputFormat,
    ) -> Result<Option<EncodedImage>, CompositeError> {
        let base = codec::decode_rgb(base)?;
        let swatch = codec::decode_rgb(swatch)?;
        let mask = codec::decode_luma(mask)?;
        match self.composite(&base, &swatch, &mask, scale)? {
            Composite::Unchanged => Ok(None),
            Composite::Blended(img) => codec::encode_rgb(&img, format).map(Some),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb};

    fn base() -> RgbImage {
        RgbImage::from_fn(64, 48, |x, y| Rgb([(x * 3) as u8, (y * 4) as u8, 120]))
    }

    fn swatch() -> RgbImage {
        RgbImage::from_fn(6, 6, |x, y| {
            if (x + y) % 2 == 0 {
                Rgb([220, 30, 30])
            } else {
                Rgb([30, 30, 220])
            }
        })
    }

    fn rect_mask(w: u32, h: u32, x0: u32, y0: u32, x1: u32, y1: u32) -> GrayImage {
        GrayImage::from_fn(w, h, |x, y| {
            if (x0..x1).contains(&x) && (y0..y1).contains(&y) {
                Luma([255])
            } else {
                Luma([0])
            }
        })
    }

    #[test]
    fn test_empty_mask_is_a_no_op() {
        let compositor = TextureCompositor::default();
        let mask = GrayImage::from_pixel(64, 48, Luma([100]));
        assert_eq!(
            compositor.composite(&base(), &swatch(), &mask, 1.0).unwrap(),
            Composite::Unchanged
        );
    }

    #[test]
    fn test_output_keeps_base_dimensions() {
        let compositor = TextureCompositor::default();
        let mask = rect_mask(64, 48, 10, 10, 40, 30);
        for scale in [0.5, 1.0, 2.0, 5.0] {
            match compositor.composite(&base(), &swatch(), &mask, scale).unwrap() {
                Composite::Blended(out) => assert_eq!(out.dimensions(), (64, 48)),
                Composite::Unchanged => panic!("expected a blend at scale {scale}"),
            }
        }
    }

    #[test]
    fn test_mask_is_resized_to_base() {
        let compositor = TextureCompositor::default();
        // Half-resolution mask covering the same area.
        let mask = rect_mask(32, 24, 5, 5, 20, 15);
        let placement = compositor
            .place(&base(), &swatch(), &mask, 1.0)
            .unwrap()
            .unwrap();
        assert!(placement.mask_box.x >= 9 && placement.mask_box.x <= 11);
        assert!(placement.mask_box.width >= 28 && placement.mask_box.width <= 32);
    }

    #[test]
    fn test_unit_scale_placement_is_repeatable() {
        let compositor = TextureCompositor::default();
        let mask = rect_mask(64, 48, 10, 10, 40, 30);
        let first = compositor.place(&base(), &swatch(), &mask, 1.0).unwrap().unwrap();
        let second = compositor
            .place(&base().clone(), &swatch(), &mask, 1.0)
            .unwrap()
            .unwrap();
        assert_eq!(first.region, second.region);
        assert_eq!(first.region, first.mask_box);
    }

    #[test]
    fn test_scaled_patch_is_clipped_to_image() {
        let compositor = TextureCompositor::default();
        let mask = rect_mask(64, 48, 40, 30, 60, 45);
        let placement = compositor
            .place(&base(), &swatch(), &mask, 3.0)
            .unwrap()
            .unwrap();
        assert_eq!(placement.region.x, 40);
        assert_eq!(placement.region.width, 24);
        assert_eq!(placement.region.height, 18);
        assert_eq!(placement.patch.dimensions(), (24, 18));
    }

    #[test]
    fn test_huge_scale_is_clipped_without_building_full_patch() {
        let compositor = TextureCompositor::default();
        let swatch = RgbImage::from_pixel(4, 4, Rgb([200, 40, 40]));
        let mask = rect_mask(64, 48, 30, 20, 60, 40);
        let placement = compositor
            .place(&base(), &swatch, &mask, 100_000.0)
            .unwrap()
            .unwrap();
        assert_eq!(placement.region.x, 30);
        assert_eq!(placement.region.y, 20);
        assert_eq!(placement.patch.dimensions(), (34, 28));
        match compositor.composite(&base(), &swatch, &mask, 100_000.0).unwrap() {
            Composite::Blended(out) => assert_eq!(out.dimensions(), (64, 48)),
            Composite::Unchanged => panic!("expected a blend"),
        }
    }

    #[test]
    fn test_scale_that_collapses_patch_is_unchanged() {
        let compositor = TextureCompositor::default();
        let mask = rect_mask(64, 48, 10, 10, 14, 14);
        assert_eq!(
            compositor.composite(&base(), &swatch(), &mask, 0.1).unwrap(),
            Composite::Unchanged
        );
    }

    #[test]
    fn test_invalid_scale_is_rejected() {
        let compositor = TextureCompositor::default();
        let mask = rect_mask(64, 48, 10, 10, 40, 30);
        for scale in [0.0, -1.0, f32::NAN, f32::INFINITY] {
            assert!(matches!(
                compositor.place(&base(), &swatch(), &mask, scale),
                Err(CompositeError::InvalidScale(_))
            ));
        }
    }

    #[test]
    fn test_fabric_texture_shows_in_region() {
        let compositor = TextureCompositor::default();
        let mask = rect_mask(64, 48, 10, 10, 40, 30);
        let Composite::Blended(out) = compositor.composite(&base(), &swatch(), &mask, 1.0).unwrap()
        else {
            panic!("expected a blend");
        };
        // Neighbouring checker cells keep their contrast after blending.
        let a = out.get_pixel(24, 20);
        let b = out.get_pixel(25, 20);
        assert!((a[0] as i32 - b[0] as i32).abs() > 100);
        // Far from the mask the base is untouched.
        assert_eq!(out.get_pixel(2, 2), base().get_pixel(2, 2));
    }

    #[test]
    fn test_composite_encoded_round_trip() {
        let compositor = TextureCompositor::default();
        let base = codec::encode_rgb(&base(), OutputFormat::Png).unwrap();
        let swatch = codec::encode_rgb(&swatch(), OutputFormat::Png).unwrap();
        let mask = codec::encode_mask(&rect_mask(64, 48, 10, 10, 40, 30)).unwrap();
        let out = compositor
            .composite_encoded(&base.data, &swatch.data, &mask.data, 1.0, OutputFormat::Jpeg)
            .unwrap()
            .unwrap();
        assert_eq!((out.width, out.height), (64, 48));

        let empty = codec::encode_mask(&GrayImage::new(64, 48)).unwrap();
        assert!(compositor
            .composite_encoded(&base.data, &swatch.data, &empty.data, 1.0, OutputFormat::Jpeg)
            .unwrap()
            .is_none());
    }
}

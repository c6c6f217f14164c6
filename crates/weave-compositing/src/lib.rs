//! Classical compositing for StyleWeave previews.
//!
//! The texture compositor fills a masked region of a model photo with a tiled
//! fabric swatch and blends it into the photo's gradient domain:
//!
//! 1. Fit the mask to the base image and binarize it (`> 127`)
//! 2. Take the mask's bounding box (empty mask: the base is returned unchanged)
//! 3. Tile the swatch over the box, then apply the caller's scale factor
//! 4. Place the patch at the box origin, clipped to the image
//! 5. Poisson-blend the placed patch into the base
//!
//! Decoding, encoding and upload validation helpers live here as well so
//! that every crate handling image bytes agrees on formats and limits.

pub mod codec;
pub mod error;
pub mod mask;
pub mod poisson;
pub mod texture;
pub mod tiling;
pub mod validation;

pub use codec::{EncodedImage, OutputFormat};
pub use error::CompositeError;
pub use mask::{BoundingBox, MASK_THRESHOLD};
pub use poisson::{seamless_clone, BlendSettings};
pub use texture::{Composite, Placement, TextureCompositor};
pub use validation::{extension_for, UploadValidator, ValidationError};

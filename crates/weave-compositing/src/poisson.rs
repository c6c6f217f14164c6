//! Poisson seamless cloning.
//!
//! The patch `g` is pasted into `dst` and corrected by a harmonic membrane
//! `h`, so the output `f = g + h` keeps the patch's gradients inside the
//! region while matching `dst` on the region's outer ring. The membrane is
//! seeded with a Coons patch of the boundary values and relaxed with
//! successive over-relaxation.

use image::{Rgb, RgbImage};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlendSettings {
    pub max_iterations: usize,
    /// Largest per-channel update (in 0-255 units) at which relaxation stops.
    pub tolerance: f32,
}

impl Default for BlendSettings {
    fn default() -> Self {
        Self {
            max_iterations: 400,
            tolerance: 0.01,
        }
    }
}

type Px = [f32; 3];

fn to_px(p: &Rgb<u8>) -> Px {
    [p[0] as f32, p[1] as f32, p[2] as f32]
}

fn sub(a: Px, b: Px) -> Px {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

/// Blend `src` into `dst` with its centre at `center` (in `dst` coordinates).
///
/// The blended region is the rectangle covered by `src` intersected with the
/// interior of `dst` (the outermost pixel ring of `dst` is the boundary and
/// is never written). Pixels outside the region are copied from `dst`.
pub fn seamless_clone(
    src: &RgbImage,
    dst: &RgbImage,
    center: (u32, u32),
    settings: &BlendSettings,
) -> RgbImage {
    let mut out = dst.clone();
    let (dw, dh) = dst.dimensions();
    let (sw, sh) = src.dimensions();
    if sw == 0 || sh == 0 || dw < 3 || dh < 3 {
        return out;
    }

    let origin_x = center.0 as i64 - (sw / 2) as i64;
    let origin_y = center.1 as i64 - (sh / 2) as i64;

    let x0 = origin_x.max(1);
    let y0 = origin_y.max(1);
    let x1 = (origin_x + sw as i64).min(dw as i64 - 1);
    let y1 = (origin_y + sh as i64).min(dh as i64 - 1);
    if x0 >= x1 || y0 >= y1 {
        return out;
    }

    let nx = (x1 - x0) as usize;
    let ny = (y1 - y0) as usize;
    let gw = nx + 2;
    let gh = ny + 2;

    // Patch value at a dst coordinate, replicating the patch edge outside it.
    let guide = |x: i64, y: i64| -> Px {
        let sx = (x - origin_x).clamp(0, sw as i64 - 1) as u32;
        let sy = (y - origin_y).clamp(0, sh as i64 - 1) as u32;
        to_px(src.get_pixel(sx, sy))
    };

    // Grid cell (i, j) maps to dst (x0 - 1 + i, y0 - 1 + j); the outer ring is fixed.
    let mut h = vec![[0f32; 3]; gw * gh];
    let idx = |i: usize, j: usize| j * gw + i;
    for j in 0..gh {
        for i in 0..gw {
            if i == 0 || j == 0 || i == gw - 1 || j == gh - 1 {
                let x = x0 - 1 + i as i64;
                let y = y0 - 1 + j as i64;
                h[idx(i, j)] = sub(to_px(dst.get_pixel(x as u32, y as u32)), guide(x, y));
            }
        }
    }

    seed_with_coons_patch(&mut h, gw, gh);

    let rho = ((std::f64::consts::PI / (nx + 1) as f64).cos()
        + (std::f64::consts::PI / (ny + 1) as f64).cos())
        / 2.0;
    let omega = (2.0 / (1.0 + (1.0 - rho * rho).max(0.0).sqrt())) as f32;

    let mut iterations = 0;
    while iterations < settings.max_iterations {
        iterations += 1;
        let mut max_delta = 0f32;
        for j in 1..=ny {
            for i in 1..=nx {
                let l = h[idx(i - 1, j)];
                let r = h[idx(i + 1, j)];
                let u = h[idx(i, j - 1)];
                let d = h[idx(i, j + 1)];
                let cell = &mut h[idx(i, j)];
                for c in 0..3 {
                    let avg = (l[c] + r[c] + u[c] + d[c]) * 0.25;
                    let delta = omega * (avg - cell[c]);
                    cell[c] += delta;
                    max_delta = max_delta.max(delta.abs());
                }
            }
        }
        if max_delta < settings.tolerance {
            break;
        }
    }
    tracing::trace!(iterations, nx, ny, "Seamless clone converged");

    for j in 1..=ny {
        for i in 1..=nx {
            let x = x0 - 1 + i as i64;
            let y = y0 - 1 + j as i64;
            let g = guide(x, y);
            let m = h[idx(i, j)];
            let px = Rgb([
                (g[0] + m[0]).round().clamp(0.0, 255.0) as u8,
                (g[1] + m[1]).round().clamp(0.0, 255.0) as u8,
                (g[2] + m[2]).round().clamp(0.0, 255.0) as u8,
            ]);
            out.put_pixel(x as u32, y as u32, px);
        }
    }
    out
}

/// Fill the interior of a grid from its boundary ring by transfinite interpolation.
fn seed_with_coons_patch(h: &mut [Px], gw: usize, gh: usize) {
    let idx = |i: usize, j: usize| j * gw + i;
    let (last_i, last_j) = (gw - 1, gh - 1);
    let c00 = h[idx(0, 0)];
    let c10 = h[idx(last_i, 0)];
    let c01 = h[idx(0, last_j)];
    let c11 = h[idx(last_i, last_j)];
    for j in 1..last_j {
        let v = j as f32 / last_j as f32;
        let left = h[idx(0, j)];
        let right = h[idx(last_i, j)];
        for i in 1..last_i {
            let u = i as f32 / last_i as f32;
            let top = h[idx(i, 0)];
            let bottom = h[idx(i, last_j)];
            let mut px = [0f32; 3];
            for c in 0..3 {
                let ruled = (1.0 - u) * left[c]
                    + u * right[c]
                    + (1.0 - v) * top[c]
                    + v * bottom[c];
                let bilinear = (1.0 - u) * (1.0 - v) * c00[c]
                    + u * (1.0 - v) * c10[c]
                    + (1.0 - u) * v * c01[c]
                    + u * v * c11[c];
                px[c] = ruled - bilinear;
            }
            h[idx(i, j)] = px;
        }
    }
}

// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Pixel filters shared by backends.

use peniko::Color;

use crate::pixel;
use crate::{DataSourceSurface, DrawError, SurfaceFormat};

/// Blur a `width` by `height` alpha plane in place with a Gaussian of
/// standard deviation `sigma`.
///
/// Pixels outside the plane count as transparent. The kernel reaches
/// `ceil(3 * sigma)` pixels each way.
pub fn gaussian_blur(alpha: &mut [f32], width: usize, height: usize, sigma: f32) {
    if sigma <= 0.0 || width == 0 || height == 0 {
        return;
    }
    let kernel = gaussian_kernel(sigma);
    let radius = kernel.len() / 2;
    let mut scratch = vec![0.0_f32; alpha.len()];
    // Horizontal pass into scratch.
    for y in 0..height {
        let row = &alpha[y * width..(y + 1) * width];
        for x in 0..width {
            let mut acc = 0.0;
            for (k, w) in kernel.iter().enumerate() {
                let sx = (x + k).wrapping_sub(radius);
                if sx < width {
                    acc += row[sx] * w;
                }
            }
            scratch[y * width + x] = acc;
        }
    }
    // Vertical pass back into alpha.
    for y in 0..height {
        for x in 0..width {
            let mut acc = 0.0;
            for (k, w) in kernel.iter().enumerate() {
                let sy = (y + k).wrapping_sub(radius);
                if sy < height {
                    acc += scratch[sy * width + x] * w;
                }
            }
            alpha[y * width + x] = acc;
        }
    }
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    reason = "kernel radius is a small positive pixel count"
)]
fn gaussian_kernel(sigma: f32) -> Vec<f32> {
    let radius = (3.0 * sigma).ceil().min(1024.0) as usize;
    let denom = 2.0 * sigma * sigma;
    let mut kernel: Vec<f32> = (0..=2 * radius)
        .map(|i| {
            let d = i as f32 - radius as f32;
            (-(d * d) / denom).exp()
        })
        .collect();
    let sum: f32 = kernel.iter().sum();
    for w in &mut kernel {
        *w /= sum;
    }
    kernel
}

/// Shadow of `surface`: its alpha, blurred by `sigma` and tinted with `color`.
///
/// The result has the same size as the input and is not offset.
pub fn shadow_surface(
    surface: &DataSourceSurface,
    color: Color,
    sigma: f32,
) -> Result<DataSourceSurface, DrawError> {
    let layout = surface.layout();
    let size = layout.size();
    let (w, h) = (size.width as usize, size.height as usize);
    let mut alpha = Vec::new();
    alpha
        .try_reserve_exact(w * h)
        .map_err(|_| DrawError::AllocationFailed(w * h * 4))?;
    {
        let map = surface.map();
        for y in 0..size.height {
            for x in 0..size.width {
                alpha.push(map.premul(x, y)[3]);
            }
        }
    }
    gaussian_blur(&mut alpha, w, h, sigma);
    let tint = pixel::premultiply(color);
    let out = DataSourceSurface::new(size, SurfaceFormat::B8G8R8A8)?;
    {
        let mut map = out.map_mut();
        for y in 0..size.height {
            for x in 0..size.width {
                let a = alpha[y as usize * w + x as usize];
                map.set_premul(x, y, pixel::scale(tint, a));
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::IntSize;

    #[test]
    fn kernel_is_normalized_and_symmetric() {
        let k = gaussian_kernel(2.0);
        assert_eq!(k.len(), 13);
        assert!((k.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        assert!((k[0] - k[12]).abs() < 1e-9);
    }

    #[test]
    fn blur_spreads_and_preserves_mass_inside() {
        let mut plane = vec![0.0_f32; 15 * 15];
        plane[7 * 15 + 7] = 1.0;
        gaussian_blur(&mut plane, 15, 15, 1.0);
        assert!(plane[7 * 15 + 7] < 1.0);
        assert!(plane[7 * 15 + 8] > 0.0);
        assert!((plane.iter().sum::<f32>() - 1.0).abs() < 1e-4);
    }

    #[test]
    fn zero_sigma_is_identity() {
        let mut plane = vec![0.0, 1.0, 0.0];
        gaussian_blur(&mut plane, 3, 1, 0.0);
        assert_eq!(plane, vec![0.0, 1.0, 0.0]);
    }

    #[test]
    fn shadow_tints_alpha() {
        let src = DataSourceSurface::new(IntSize::new(3, 3), SurfaceFormat::B8G8R8A8).unwrap();
        src.map_mut().set_premul(1, 1, [1.0, 1.0, 1.0, 1.0]);
        let shadow = shadow_surface(&src, Color::from_rgba8(0, 0, 255, 255), 0.0).unwrap();
        assert_eq!(shadow.premul_pixel(1, 1), Some([0.0, 0.0, 1.0, 1.0]));
        assert_eq!(shadow.premul_pixel(0, 0), Some([0.0; 4]));
    }
}

// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Conversions between stored pixels and premultiplied floating point color.
//!
//! Every backend reads and writes pixels through these helpers so that
//! format handling stays consistent across targets and surfaces.
//! Working colors are `[r, g, b, a]` premultiplied by alpha, each in `0..=1`.

use peniko::Color;

use crate::SurfaceFormat;

/// Premultiplied RGBA working color.
pub type Premul = [f32; 4];

/// Fully transparent working color.
pub const TRANSPARENT: Premul = [0.0; 4];

/// Convert a straight-alpha color to premultiplied working form.
pub fn premultiply(color: Color) -> Premul {
    let [r, g, b, a] = color.components;
    let a = a.clamp(0.0, 1.0);
    [
        r.clamp(0.0, 1.0) * a,
        g.clamp(0.0, 1.0) * a,
        b.clamp(0.0, 1.0) * a,
        a,
    ]
}

/// Convert a premultiplied working color back to a straight-alpha color.
pub fn unpremultiply(p: Premul) -> Color {
    let a = p[3];
    if a <= 0.0 {
        return Color::TRANSPARENT;
    }
    Color::new([p[0] / a, p[1] / a, p[2] / a, a])
}

/// Scale every channel of `p` by `k`.
pub fn scale(p: Premul, k: f32) -> Premul {
    [p[0] * k, p[1] * k, p[2] * k, p[3] * k]
}

/// Quantize a unit value to a byte.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    reason = "value is clamped to 0..=255 before the cast"
)]
pub fn unit_to_u8(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

fn u8_to_unit(v: u8) -> f32 {
    f32::from(v) / 255.0
}

/// Read one pixel stored in `format` from the start of `bytes`.
pub fn read(format: SurfaceFormat, bytes: &[u8]) -> Premul {
    match format {
        SurfaceFormat::B8G8R8A8 => [
            u8_to_unit(bytes[2]),
            u8_to_unit(bytes[1]),
            u8_to_unit(bytes[0]),
            u8_to_unit(bytes[3]),
        ],
        SurfaceFormat::B8G8R8X8 => [
            u8_to_unit(bytes[2]),
            u8_to_unit(bytes[1]),
            u8_to_unit(bytes[0]),
            1.0,
        ],
        SurfaceFormat::R8G8B8A8 => [
            u8_to_unit(bytes[0]),
            u8_to_unit(bytes[1]),
            u8_to_unit(bytes[2]),
            u8_to_unit(bytes[3]),
        ],
        SurfaceFormat::R8G8B8X8 => [
            u8_to_unit(bytes[0]),
            u8_to_unit(bytes[1]),
            u8_to_unit(bytes[2]),
            1.0,
        ],
        SurfaceFormat::R5G6B5 => {
            let v = u16::from_le_bytes([bytes[0], bytes[1]]);
            [
                f32::from((v >> 11) & 0x1f) / 31.0,
                f32::from((v >> 5) & 0x3f) / 63.0,
                f32::from(v & 0x1f) / 31.0,
                1.0,
            ]
        }
        SurfaceFormat::A8 => [0.0, 0.0, 0.0, u8_to_unit(bytes[0])],
    }
}

/// Write `p` into the start of `out` using `format`.
///
/// Formats without alpha store the color composited over black and read back
/// as opaque.
pub fn write(format: SurfaceFormat, p: Premul, out: &mut [u8]) {
    let [r, g, b, a] = p;
    match format {
        SurfaceFormat::B8G8R8A8 => {
            out[0] = unit_to_u8(b);
            out[1] = unit_to_u8(g);
            out[2] = unit_to_u8(r);
            out[3] = unit_to_u8(a);
        }
        SurfaceFormat::B8G8R8X8 => {
            out[0] = unit_to_u8(b);
            out[1] = unit_to_u8(g);
            out[2] = unit_to_u8(r);
            out[3] = 0xff;
        }
        SurfaceFormat::R8G8B8A8 => {
            out[0] = unit_to_u8(r);
            out[1] = unit_to_u8(g);
            out[2] = unit_to_u8(b);
            out[3] = unit_to_u8(a);
        }
        SurfaceFormat::R8G8B8X8 => {
            out[0] = unit_to_u8(r);
            out[1] = unit_to_u8(g);
            out[2] = unit_to_u8(b);
            out[3] = 0xff;
        }
        SurfaceFormat::R5G6B5 => {
            let q = |v: f32, max: f32| -> u16 {
                #[allow(
                    clippy::cast_possible_truncation,
                    clippy::cast_sign_loss,
                    reason = "value is clamped to 0..=max before the cast"
                )]
                let q = (v.clamp(0.0, 1.0) * max).round() as u16;
                q
            };
            let v = (q(r, 31.0) << 11) | (q(g, 63.0) << 5) | q(b, 31.0);
            out[..2].copy_from_slice(&v.to_le_bytes());
        }
        SurfaceFormat::A8 => out[0] = unit_to_u8(a),
    }
}

/// Premultiplied bytes of `p` in `[r, g, b, a]` order.
pub fn to_rgba8(p: Premul) -> [u8; 4] {
    [
        unit_to_u8(p[0]),
        unit_to_u8(p[1]),
        unit_to_u8(p[2]),
        unit_to_u8(p[3]),
    ]
}

/// Linear interpolation between two working colors.
pub fn lerp(a: Premul, b: Premul, t: f32) -> Premul {
    [
        a[0] + (b[0] - a[0]) * t,
        a[1] + (b[1] - a[1]) * t,
        a[2] + (b[2] - a[2]) * t,
        a[3] + (b[3] - a[3]) * t,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bgra_round_trips_opaque_red() {
        let mut px = [0_u8; 4];
        write(SurfaceFormat::B8G8R8A8, [1.0, 0.0, 0.0, 1.0], &mut px);
        assert_eq!(px, [0, 0, 255, 255]);
        assert_eq!(read(SurfaceFormat::B8G8R8A8, &px), [1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn x_formats_read_opaque() {
        let px = [10_u8, 20, 30, 0];
        assert_eq!(read(SurfaceFormat::R8G8B8X8, &px)[3], 1.0);
        let mut out = [0_u8; 4];
        write(SurfaceFormat::B8G8R8X8, [0.0, 0.0, 0.0, 0.5], &mut out);
        assert_eq!(out[3], 0xff);
    }

    #[test]
    fn premultiply_scales_color() {
        let p = premultiply(Color::from_rgba8(255, 0, 0, 128));
        assert!((p[0] - p[3]).abs() < 1e-6, "red channel should equal alpha");
        assert_eq!(p[1], 0.0);
    }

    #[test]
    fn rgb565_packs_white() {
        let mut out = [0_u8; 2];
        write(SurfaceFormat::R5G6B5, [1.0, 1.0, 1.0, 1.0], &mut out);
        assert_eq!(out, [0xff, 0xff]);
    }
}

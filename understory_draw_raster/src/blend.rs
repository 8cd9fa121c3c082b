// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Compositing of premultiplied colors.

use peniko::{BlendMode, Compose, Mix};
use understory_draw::pixel::Premul;

/// Combine `src` over `dst` under `mode`, both premultiplied.
pub(crate) fn composite(src: Premul, dst: Premul, mode: BlendMode) -> Premul {
    let src = if matches!(mode.mix, Mix::Normal) {
        src
    } else {
        mix(src, dst, mode.mix)
    };
    porter_duff(src, dst, mode.compose)
}

fn porter_duff(src: Premul, dst: Premul, compose: Compose) -> Premul {
    let (sa, da) = (src[3], dst[3]);
    let (fa, fb) = match compose {
        Compose::Clear => (0.0, 0.0),
        Compose::Copy => (1.0, 0.0),
        Compose::Dest => (0.0, 1.0),
        Compose::SrcOver => (1.0, 1.0 - sa),
        Compose::DestOver => (1.0 - da, 1.0),
        Compose::SrcIn => (da, 0.0),
        Compose::DestIn => (0.0, sa),
        Compose::SrcOut => (1.0 - da, 0.0),
        Compose::DestOut => (0.0, 1.0 - sa),
        Compose::SrcAtop => (da, 1.0 - sa),
        Compose::DestAtop => (1.0 - da, sa),
        Compose::Xor => (1.0 - da, 1.0 - sa),
        Compose::Plus | Compose::PlusLighter => (1.0, 1.0),
    };
    let mut out = [0.0; 4];
    for i in 0..4 {
        out[i] = (src[i] * fa + dst[i] * fb).clamp(0.0, 1.0);
    }
    out
}

/// Replace the source color with the blend of source and backdrop, weighted
/// by backdrop alpha.
fn mix(src: Premul, dst: Premul, mix: Mix) -> Premul {
    let (sa, da) = (src[3], dst[3]);
    if sa <= 0.0 {
        return src;
    }
    let cs = unpremul(src);
    let cb = unpremul(dst);
    let blended = match mix {
        Mix::Hue => set_lum(set_sat(cs, sat(cb)), lum(cb)),
        Mix::Saturation => set_lum(set_sat(cb, sat(cs)), lum(cb)),
        Mix::Color => set_lum(cs, lum(cb)),
        Mix::Luminosity => set_lum(cb, lum(cs)),
        separable => [
            blend_channel(separable, cb[0], cs[0]),
            blend_channel(separable, cb[1], cs[1]),
            blend_channel(separable, cb[2], cs[2]),
        ],
    };
    let mut out = [0.0; 4];
    for i in 0..3 {
        let c = (1.0 - da) * cs[i] + da * blended[i];
        out[i] = c * sa;
    }
    out[3] = sa;
    out
}

fn unpremul(p: Premul) -> [f32; 3] {
    if p[3] <= 0.0 {
        return [0.0; 3];
    }
    [p[0] / p[3], p[1] / p[3], p[2] / p[3]]
}

fn blend_channel(mix: Mix, cb: f32, cs: f32) -> f32 {
    match mix {
        Mix::Multiply => cb * cs,
        Mix::Screen => cb + cs - cb * cs,
        Mix::Overlay => hard_light(cs, cb),
        Mix::Darken => cb.min(cs),
        Mix::Lighten => cb.max(cs),
        Mix::ColorDodge => {
            if cb <= 0.0 {
                0.0
            } else if cs >= 1.0 {
                1.0
            } else {
                (cb / (1.0 - cs)).min(1.0)
            }
        }
        Mix::ColorBurn => {
            if cb >= 1.0 {
                1.0
            } else if cs <= 0.0 {
                0.0
            } else {
                1.0 - ((1.0 - cb) / cs).min(1.0)
            }
        }
        Mix::HardLight => hard_light(cb, cs),
        Mix::SoftLight => {
            if cs <= 0.5 {
                cb - (1.0 - 2.0 * cs) * cb * (1.0 - cb)
            } else {
                let d = if cb <= 0.25 {
                    ((16.0 * cb - 12.0) * cb + 4.0) * cb
                } else {
                    cb.sqrt()
                };
                cb + (2.0 * cs - 1.0) * (d - cb)
            }
        }
        Mix::Difference => (cb - cs).abs(),
        Mix::Exclusion => cb + cs - 2.0 * cb * cs,
        _ => cs,
    }
}

fn hard_light(cb: f32, cs: f32) -> f32 {
    if cs <= 0.5 {
        cb * 2.0 * cs
    } else {
        let s = 2.0 * cs - 1.0;
        cb + s - cb * s
    }
}

fn lum(c: [f32; 3]) -> f32 {
    0.3 * c[0] + 0.59 * c[1] + 0.11 * c[2]
}

fn clip_color(c: [f32; 3]) -> [f32; 3] {
    let l = lum(c);
    let n = c[0].min(c[1]).min(c[2]);
    let x = c[0].max(c[1]).max(c[2]);
    let mut out = c;
    if n < 0.0 && l - n > 0.0 {
        for v in &mut out {
            *v = l + (*v - l) * l / (l - n);
        }
    }
    if x > 1.0 && x - l > 0.0 {
        for v in &mut out {
            *v = l + (*v - l) * (1.0 - l) / (x - l);
        }
    }
    out
}

fn set_lum(c: [f32; 3], l: f32) -> [f32; 3] {
    let d = l - lum(c);
    clip_color([c[0] + d, c[1] + d, c[2] + d])
}

fn sat(c: [f32; 3]) -> f32 {
    c[0].max(c[1]).max(c[2]) - c[0].min(c[1]).min(c[2])
}

fn set_sat(c: [f32; 3], s: f32) -> [f32; 3] {
    let max = c[0].max(c[1]).max(c[2]);
    let min = c[0].min(c[1]).min(c[2]);
    if max <= min {
        return [0.0; 3];
    }
    let scale = s / (max - min);
    [(c[0] - min) * scale, (c[1] - min) * scale, (c[2] - min) * scale]
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Premul = [1.0, 0.0, 0.0, 1.0];
    const HALF_BLUE: Premul = [0.0, 0.0, 0.5, 0.5];

    #[test]
    fn source_over() {
        let out = composite(HALF_BLUE, RED, BlendMode::default());
        assert_eq!(out, [0.5, 0.0, 0.5, 1.0]);
    }

    #[test]
    fn clear_and_copy() {
        assert_eq!(composite(HALF_BLUE, RED, Compose::Clear.into()), [0.0; 4]);
        assert_eq!(composite(HALF_BLUE, RED, Compose::Copy.into()), HALF_BLUE);
        assert_eq!(composite(HALF_BLUE, RED, Compose::Dest.into()), RED);
    }

    #[test]
    fn destination_in_keeps_dest_under_source_alpha() {
        let out = composite(HALF_BLUE, RED, Compose::DestIn.into());
        assert_eq!(out, [0.5, 0.0, 0.0, 0.5]);
    }

    #[test]
    fn multiply_over_opaque_backdrop() {
        let white = [1.0, 1.0, 1.0, 1.0];
        let out = composite(RED, white, BlendMode::new(Mix::Multiply, Compose::SrcOver));
        assert_eq!(out, RED);
    }

    #[test]
    fn blend_over_transparent_backdrop_is_plain_source() {
        let difference = BlendMode::new(Mix::Difference, Compose::SrcOver);
        let out = composite(RED, [0.0; 4], difference);
        assert_eq!(out, RED);
    }
}

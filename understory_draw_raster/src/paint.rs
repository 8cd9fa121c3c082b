// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-pixel evaluation of patterns.

use kurbo::{Affine, Point, Rect, Vec2};
use understory_draw::pixel::{self, Premul};
use understory_draw::{
    BackendType, ExtendMode, Filter, GradientStop, GradientStops, IntRect, Pattern,
    SourceSurfaceRef, apply_extend,
};

/// Number of entries in a [`GradientRamp`].
pub const RAMP_SIZE: usize = 256;

/// Gradient stops sampled into a lookup table of premultiplied colors.
///
/// Produced once per [`GradientStops`] collection by the raster backend and
/// stored alongside the stops.
#[derive(Clone, Debug)]
pub struct GradientRamp {
    colors: Box<[Premul]>,
}

impl GradientRamp {
    /// Sample sorted `stops` at [`RAMP_SIZE`] evenly spaced offsets.
    pub fn new(stops: &[GradientStop], extend: ExtendMode) -> Self {
        let stops = GradientStops::new(stops, extend, BackendType::Raster);
        let last = (RAMP_SIZE - 1) as f32;
        let colors = (0..RAMP_SIZE)
            .map(|i| stops.premul_color_at(i as f32 / last))
            .collect();
        Self { colors }
    }

    /// Color at `t` in `0..=1`.
    pub fn color_at(&self, t: f32) -> Premul {
        let last = (RAMP_SIZE - 1) as f32;
        #[allow(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            reason = "t is clamped to 0..=1 before scaling"
        )]
        let i = (t.clamp(0.0, 1.0) * last).round() as usize;
        self.colors[i]
    }
}

fn gradient_color(stops: &GradientStops, t: f32) -> Premul {
    let t = apply_extend(t, stops.extend_mode());
    match stops.ramp::<GradientRamp>() {
        Some(ramp) => ramp.color_at(t),
        None => stops.premul_color_at(t),
    }
}

/// Surface pixels copied out for sampling.
#[derive(Clone, Debug)]
pub(crate) struct SurfaceSampler {
    texels: Vec<Premul>,
    window: IntRect,
    extend: ExtendMode,
    filter: Filter,
}

impl SurfaceSampler {
    /// Copy the part of `pattern`'s surface inside `window` (surface pixels),
    /// or the whole surface when `window` is `None`.
    fn new(
        surface: &SourceSurfaceRef,
        window: Option<Rect>,
        extend: ExtendMode,
        filter: Filter,
    ) -> Option<Self> {
        let data = surface.data_surface()?;
        let size = data.layout().size();
        let full = size.to_int_rect();
        let window = match window {
            Some(r) => IntRect::round_out(r).intersect(&full),
            None => full,
        };
        if window.is_empty() {
            return None;
        }
        let map = data.map();
        let mut texels = Vec::with_capacity(window.width as usize * window.height as usize);
        for y in window.y..window.bottom() {
            for x in window.x..window.right() {
                texels.push(map.premul(x as u32, y as u32));
            }
        }
        Some(Self {
            texels,
            window,
            extend,
            filter,
        })
    }

    fn texel(&self, x: i64, y: i64) -> Premul {
        let w = i64::from(self.window.width);
        let h = i64::from(self.window.height);
        let x = wrap(x, w, self.extend);
        let y = wrap(y, h, self.extend);
        #[allow(
            clippy::cast_possible_truncation,
            reason = "wrapped indices address the texel vector"
        )]
        let i = (y * w + x) as usize;
        self.texels[i]
    }

    /// Sample at `p` in surface pixel coordinates.
    fn sample(&self, p: Point) -> Premul {
        let u = p.x - f64::from(self.window.x);
        let v = p.y - f64::from(self.window.y);
        match self.filter {
            Filter::Point => self.texel(floor(u), floor(v)),
            Filter::Linear | Filter::Good => {
                let (u, v) = (u - 0.5, v - 0.5);
                let (x0, y0) = (floor(u), floor(v));
                #[allow(
                    clippy::cast_possible_truncation,
                    reason = "fractions lie in 0..1"
                )]
                let (fx, fy) = ((u - u.floor()) as f32, (v - v.floor()) as f32);
                let top = pixel::lerp(self.texel(x0, y0), self.texel(x0 + 1, y0), fx);
                let bottom = pixel::lerp(self.texel(x0, y0 + 1), self.texel(x0 + 1, y0 + 1), fx);
                pixel::lerp(top, bottom, fy)
            }
        }
    }
}

#[allow(
    clippy::cast_possible_truncation,
    reason = "sample positions are clamped to a range far inside i64"
)]
fn floor(v: f64) -> i64 {
    v.floor().clamp(-1.0e15, 1.0e15) as i64
}

fn wrap(i: i64, n: i64, extend: ExtendMode) -> i64 {
    match extend {
        ExtendMode::Pad => i.clamp(0, n - 1),
        ExtendMode::Repeat => i.rem_euclid(n),
        ExtendMode::Reflect => {
            let m = i.rem_euclid(2 * n);
            if m >= n { 2 * n - 1 - m } else { m }
        }
    }
}

/// A pattern prepared for evaluation at device pixels.
#[derive(Clone, Debug)]
pub(crate) enum Shader {
    Solid(Premul),
    Linear {
        to_pattern: Affine,
        begin: Point,
        axis: Vec2,
        stops: GradientStops,
    },
    Radial {
        to_pattern: Affine,
        center1: Point,
        radius1: f64,
        delta: Vec2,
        delta_radius: f64,
        stops: GradientStops,
    },
    Surface {
        to_pattern: Affine,
        sampler: SurfaceSampler,
    },
}

fn device_to_pattern(transform: Affine, matrix: Affine) -> Option<Affine> {
    let m = transform * matrix;
    let det = m.determinant();
    (det.is_finite() && det != 0.0).then(|| m.inverse())
}

impl Shader {
    /// Prepare `pattern` drawn under the user-to-device `transform`.
    ///
    /// Returns `None` when nothing would be painted, for example when the
    /// pattern matrix is singular.
    pub(crate) fn new(pattern: &Pattern, transform: Affine) -> Option<Self> {
        Self::with_window(pattern, transform, None)
    }

    /// Like [`new`](Self::new), restricting surface sampling to `window` in
    /// surface pixels.
    pub(crate) fn with_window(
        pattern: &Pattern,
        transform: Affine,
        window: Option<Rect>,
    ) -> Option<Self> {
        match pattern {
            Pattern::Color(c) => Some(Self::Solid(pixel::premultiply(*c))),
            Pattern::LinearGradient(g) => {
                let axis = g.end - g.begin;
                let len2 = axis.hypot2();
                if len2 == 0.0 {
                    return Some(Self::Solid(pixel::premultiply(g.stops.last_color())));
                }
                Some(Self::Linear {
                    to_pattern: device_to_pattern(transform, g.matrix)?,
                    begin: g.begin,
                    axis: axis / len2,
                    stops: g.stops.clone(),
                })
            }
            Pattern::RadialGradient(g) => Some(Self::Radial {
                to_pattern: device_to_pattern(transform, g.matrix)?,
                center1: g.center1,
                radius1: g.radius1,
                delta: g.center2 - g.center1,
                delta_radius: g.radius2 - g.radius1,
                stops: g.stops.clone(),
            }),
            Pattern::Surface(s) => Some(Self::Surface {
                to_pattern: device_to_pattern(transform, s.matrix)?,
                sampler: SurfaceSampler::new(&s.surface, window, s.extend_mode, s.filter)?,
            }),
        }
    }

    /// Premultiplied color at the center of device pixel `(x, y)`.
    pub(crate) fn eval(&self, x: i32, y: i32) -> Premul {
        let device = Point::new(f64::from(x) + 0.5, f64::from(y) + 0.5);
        match self {
            Self::Solid(c) => *c,
            Self::Linear {
                to_pattern,
                begin,
                axis,
                stops,
            } => {
                let p = *to_pattern * device;
                #[allow(
                    clippy::cast_possible_truncation,
                    reason = "gradient parameters only need f32 precision"
                )]
                let t = (p - *begin).dot(*axis) as f32;
                gradient_color(stops, t)
            }
            Self::Radial {
                to_pattern,
                center1,
                radius1,
                delta,
                delta_radius,
                stops,
            } => {
                let p = *to_pattern * device;
                match conical_parameter(p - *center1, *radius1, *delta, *delta_radius) {
                    #[allow(
                        clippy::cast_possible_truncation,
                        reason = "gradient parameters only need f32 precision"
                    )]
                    Some(t) => gradient_color(stops, t as f32),
                    None => pixel::TRANSPARENT,
                }
            }
            Self::Surface {
                to_pattern,
                sampler,
            } => sampler.sample(*to_pattern * device),
        }
    }
}

/// Largest `t` for which `p` lies on the circle interpolated between the two
/// gradient circles with a non-negative radius.
///
/// `p` is relative to the first center.
fn conical_parameter(p: Vec2, r1: f64, dc: Vec2, dr: f64) -> Option<f64> {
    let a = dc.hypot2() - dr * dr;
    let b = p.dot(dc) + r1 * dr;
    let c = p.hypot2() - r1 * r1;
    let valid = |t: f64| r1 + t * dr >= 0.0;
    if a.abs() < 1e-12 {
        if b == 0.0 {
            return None;
        }
        let t = c / (2.0 * b);
        return valid(t).then_some(t);
    }
    let disc = b * b - a * c;
    if disc < 0.0 {
        return None;
    }
    let root = disc.sqrt();
    let (t1, t2) = ((b + root) / a, (b - root) / a);
    let (hi, lo) = if t1 > t2 { (t1, t2) } else { (t2, t1) };
    if valid(hi) {
        Some(hi)
    } else if valid(lo) {
        Some(lo)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use peniko::color::palette::css::{BLUE, RED};
    use understory_draw::{
        DataSourceSurface, IntSize, LinearGradientPattern, RadialGradientPattern,
        SurfaceFormat, SurfacePattern,
    };

    fn red_to_blue(extend: ExtendMode) -> GradientStops {
        GradientStops::new(
            &[GradientStop::new(0.0, RED), GradientStop::new(1.0, BLUE)],
            extend,
            BackendType::Raster,
        )
    }

    fn close(a: Premul, b: Premul) -> bool {
        a.iter().zip(b).all(|(x, y)| (x - y).abs() < 0.02)
    }

    #[test]
    fn linear_gradient_runs_along_axis() {
        let g = LinearGradientPattern::new(
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            red_to_blue(ExtendMode::Pad),
        );
        let shader = Shader::new(&g.into(), Affine::IDENTITY).unwrap();
        assert!(close(shader.eval(-5, 0), [1.0, 0.0, 0.0, 1.0]));
        assert!(close(shader.eval(20, 3), [0.0, 0.0, 1.0, 1.0]));
        let mid = shader.eval(4, 0);
        assert!(close(mid, [0.55, 0.0, 0.45, 1.0]));
    }

    #[test]
    fn repeat_extend_wraps() {
        let g = LinearGradientPattern::new(
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            red_to_blue(ExtendMode::Repeat),
        );
        let shader = Shader::new(&g.into(), Affine::IDENTITY).unwrap();
        assert!(close(shader.eval(10, 0), shader.eval(0, 0)));
    }

    #[test]
    fn prepared_ramp_matches_direct_interpolation() {
        let stops = red_to_blue(ExtendMode::Pad);
        let ramp = GradientRamp::new(stops.stops(), ExtendMode::Pad);
        for t in [0.0, 0.25, 0.5, 0.9, 1.0] {
            assert!(close(ramp.color_at(t), stops.premul_color_at(t)));
        }
    }

    #[test]
    fn concentric_radial_gradient() {
        let g = RadialGradientPattern::new(
            Point::new(0.0, 0.0),
            0.0,
            Point::new(0.0, 0.0),
            10.0,
            red_to_blue(ExtendMode::Pad),
        );
        let shader = Shader::new(&g.into(), Affine::translate((0.5, 0.5))).unwrap();
        assert!(close(shader.eval(0, 0), [1.0, 0.0, 0.0, 1.0]));
        assert!(close(shader.eval(10, 0), [0.0, 0.0, 1.0, 1.0]));
        assert!(close(shader.eval(0, 5), [0.5, 0.0, 0.5, 1.0]));
    }

    #[test]
    fn radial_parameter_outside_cone_is_empty() {
        // Small circles drifting along x never reach points far off the axis.
        assert!(conical_parameter(Vec2::new(0.0, 50.0), 1.0, Vec2::new(10.0, 0.0), 1.0).is_none());
    }

    #[test]
    fn singular_pattern_matrix_paints_nothing() {
        let mut g = LinearGradientPattern::new(
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            red_to_blue(ExtendMode::Pad),
        );
        g.matrix = Affine::scale(0.0);
        assert!(Shader::new(&g.into(), Affine::IDENTITY).is_none());
    }

    #[test]
    fn surface_sampling_filters_and_extends() {
        let surface =
            DataSourceSurface::new(IntSize::new(2, 1), SurfaceFormat::R8G8B8A8).unwrap();
        {
            let mut map = surface.map_mut();
            map.set_premul(0, 0, [1.0, 0.0, 0.0, 1.0]);
            map.set_premul(1, 0, [0.0, 0.0, 1.0, 1.0]);
        }
        let mut pattern = SurfacePattern::new(surface.into_source());
        pattern.filter = Filter::Point;
        pattern.extend_mode = ExtendMode::Repeat;
        let shader = Shader::new(&pattern.clone().into(), Affine::IDENTITY).unwrap();
        assert!(close(shader.eval(0, 0), [1.0, 0.0, 0.0, 1.0]));
        assert!(close(shader.eval(3, 5), [0.0, 0.0, 1.0, 1.0]));

        pattern.filter = Filter::Linear;
        pattern.extend_mode = ExtendMode::Pad;
        pattern.matrix = Affine::scale(2.0);
        let shader = Shader::new(&pattern.into(), Affine::IDENTITY).unwrap();
        // Device pixel 1 center maps to surface x = 0.75, a quarter of the way
        // from the first texel center toward the second.
        assert!(close(shader.eval(1, 0), [0.75, 0.0, 0.25, 1.0]));
        assert!(close(shader.eval(0, 0), [1.0, 0.0, 0.0, 1.0]));
    }

    #[test]
    fn window_limits_sampling() {
        let surface =
            DataSourceSurface::new(IntSize::new(2, 1), SurfaceFormat::R8G8B8A8).unwrap();
        {
            let mut map = surface.map_mut();
            map.set_premul(0, 0, [1.0, 0.0, 0.0, 1.0]);
            map.set_premul(1, 0, [0.0, 0.0, 1.0, 1.0]);
        }
        let pattern: Pattern = SurfacePattern::new(surface.into_source()).into();
        let shader = Shader::with_window(
            &pattern,
            Affine::IDENTITY,
            Some(Rect::new(1.0, 0.0, 2.0, 1.0)),
        )
        .unwrap();
        // Bilinear taps to the left clamp to the window, not the surface.
        assert!(close(shader.eval(1, 0), [0.0, 0.0, 1.0, 1.0]));
        assert!(close(shader.eval(0, 0), [0.0, 0.0, 1.0, 1.0]));
    }
}

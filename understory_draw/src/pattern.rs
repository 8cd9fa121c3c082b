// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Paint sources.
//!
//! A [`Pattern`] describes the color at every point of user space. Gradient
//! patterns reference a [`GradientStops`] collection created by a draw
//! target, which binds them to that target's backend.

use core::any::Any;
use core::fmt;
use std::borrow::Cow;
use std::sync::Arc;

use kurbo::{Affine, Point};
use peniko::Color;

use crate::pixel::{self, Premul};
use crate::{BackendType, Filter, SourceSurfaceRef};

/// How a gradient or surface pattern continues past its defined range.
pub type ExtendMode = peniko::Extend;

/// One color stop of a gradient.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct GradientStop {
    /// Position along the gradient, `0..=1`.
    pub offset: f32,
    /// Color at that position.
    pub color: Color,
}

impl GradientStop {
    /// Create a stop.
    pub fn new(offset: f32, color: Color) -> Self {
        Self { offset, color }
    }
}

struct StopsInner {
    stops: Box<[GradientStop]>,
    extend: ExtendMode,
    backend: BackendType,
    ramp: Option<Arc<dyn Any + Send + Sync>>,
}

/// Immutable, backend-bound collection of gradient stops.
///
/// Stops are sorted by offset (stably, so equal offsets keep their order) and
/// offsets are clamped to `0..=1`. Cloning shares the collection.
#[derive(Clone)]
pub struct GradientStops {
    inner: Arc<StopsInner>,
}

impl fmt::Debug for GradientStops {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GradientStops")
            .field("stops", &self.inner.stops)
            .field("extend", &self.inner.extend)
            .field("backend", &self.inner.backend)
            .field("has_ramp", &self.inner.ramp.is_some())
            .finish()
    }
}

impl GradientStops {
    /// Sort and clamp `stops`, binding them to `backend`.
    pub fn new(stops: &[GradientStop], extend: ExtendMode, backend: BackendType) -> Self {
        Self::with_ramp(sorted_stops(stops), extend, backend, None)
    }

    pub(crate) fn with_ramp(
        stops: Vec<GradientStop>,
        extend: ExtendMode,
        backend: BackendType,
        ramp: Option<Arc<dyn Any + Send + Sync>>,
    ) -> Self {
        Self {
            inner: Arc::new(StopsInner {
                stops: stops.into_boxed_slice(),
                extend,
                backend,
                ramp,
            }),
        }
    }

    /// Backend this collection belongs to.
    pub fn backend_type(&self) -> BackendType {
        self.inner.backend
    }

    /// Sorted stops.
    pub fn stops(&self) -> &[GradientStop] {
        &self.inner.stops
    }

    /// Extend mode recorded at creation.
    pub fn extend_mode(&self) -> ExtendMode {
        self.inner.extend
    }

    /// Backend-prepared acceleration data, if it has type `T`.
    pub fn ramp<T: Any>(&self) -> Option<&T> {
        self.inner.ramp.as_deref()?.downcast_ref()
    }

    /// Color of the last stop, or transparent if there are none.
    pub fn last_color(&self) -> Color {
        self.inner
            .stops
            .last()
            .map_or(Color::TRANSPARENT, |s| s.color)
    }

    /// Premultiplied color at gradient position `t`, with `t` already mapped
    /// into `0..=1` by the extend mode.
    ///
    /// Interpolation happens between premultiplied colors.
    pub fn premul_color_at(&self, t: f32) -> Premul {
        let stops = &self.inner.stops;
        let Some(first) = stops.first() else {
            return pixel::TRANSPARENT;
        };
        if t <= first.offset {
            return pixel::premultiply(first.color);
        }
        for pair in stops.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            if t <= b.offset {
                let span = b.offset - a.offset;
                if span <= 0.0 {
                    return pixel::premultiply(b.color);
                }
                return pixel::lerp(
                    pixel::premultiply(a.color),
                    pixel::premultiply(b.color),
                    (t - a.offset) / span,
                );
            }
        }
        pixel::premultiply(self.last_color())
    }

    /// Returns `true` if both handles share the same collection.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Clamp offsets and sort stably by offset.
pub(crate) fn sorted_stops(stops: &[GradientStop]) -> Vec<GradientStop> {
    let mut out: Vec<GradientStop> = stops
        .iter()
        .map(|s| GradientStop::new(s.offset.clamp(0.0, 1.0), s.color))
        .collect();
    out.sort_by(|a, b| a.offset.total_cmp(&b.offset));
    out
}

/// Map an unbounded gradient parameter into `0..=1`.
pub fn apply_extend(t: f32, extend: ExtendMode) -> f32 {
    match extend {
        ExtendMode::Pad => t.clamp(0.0, 1.0),
        ExtendMode::Repeat => t - t.floor(),
        ExtendMode::Reflect => {
            let m = t.rem_euclid(2.0);
            if m > 1.0 { 2.0 - m } else { m }
        }
    }
}

/// Linear gradient between two points.
#[derive(Clone, Debug)]
pub struct LinearGradientPattern {
    /// Start point; offset 0.
    pub begin: Point,
    /// End point; offset 1.
    pub end: Point,
    /// Stops.
    pub stops: GradientStops,
    /// Pattern space to user space.
    pub matrix: Affine,
}

impl LinearGradientPattern {
    /// Gradient with an identity pattern matrix.
    pub fn new(begin: Point, end: Point, stops: GradientStops) -> Self {
        Self {
            begin,
            end,
            stops,
            matrix: Affine::IDENTITY,
        }
    }
}

/// Two-circle radial gradient.
#[derive(Clone, Debug)]
pub struct RadialGradientPattern {
    /// Center of the start circle.
    pub center1: Point,
    /// Center of the end circle.
    pub center2: Point,
    /// Radius of the start circle; offset 0.
    pub radius1: f64,
    /// Radius of the end circle; offset 1.
    pub radius2: f64,
    /// Stops.
    pub stops: GradientStops,
    /// Pattern space to user space.
    pub matrix: Affine,
}

impl RadialGradientPattern {
    /// Gradient with an identity pattern matrix.
    pub fn new(
        center1: Point,
        radius1: f64,
        center2: Point,
        radius2: f64,
        stops: GradientStops,
    ) -> Self {
        Self {
            center1,
            center2,
            radius1,
            radius2,
            stops,
            matrix: Affine::IDENTITY,
        }
    }
}

/// Pattern that samples a source surface.
#[derive(Clone, Debug)]
pub struct SurfacePattern {
    /// Surface to sample.
    pub surface: SourceSurfaceRef,
    /// Behavior outside the surface.
    pub extend_mode: ExtendMode,
    /// Pattern space (surface pixels) to user space.
    pub matrix: Affine,
    /// Sampling filter.
    pub filter: Filter,
}

impl SurfacePattern {
    /// Pattern with an identity matrix, clamped edges and the default filter.
    pub fn new(surface: SourceSurfaceRef) -> Self {
        Self {
            surface,
            extend_mode: ExtendMode::Pad,
            matrix: Affine::IDENTITY,
            filter: Filter::default(),
        }
    }
}

/// Discriminant of a [`Pattern`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PatternType {
    /// Solid color.
    Color,
    /// Linear gradient.
    LinearGradient,
    /// Radial gradient.
    RadialGradient,
    /// Surface.
    Surface,
}

/// A paint source.
#[derive(Clone, Debug)]
pub enum Pattern {
    /// Uniform color.
    Color(Color),
    /// Linear gradient.
    LinearGradient(LinearGradientPattern),
    /// Radial gradient.
    RadialGradient(RadialGradientPattern),
    /// Surface.
    Surface(SurfacePattern),
}

impl From<Color> for Pattern {
    fn from(color: Color) -> Self {
        Self::Color(color)
    }
}

impl From<LinearGradientPattern> for Pattern {
    fn from(p: LinearGradientPattern) -> Self {
        Self::LinearGradient(p)
    }
}

impl From<RadialGradientPattern> for Pattern {
    fn from(p: RadialGradientPattern) -> Self {
        Self::RadialGradient(p)
    }
}

impl From<SurfacePattern> for Pattern {
    fn from(p: SurfacePattern) -> Self {
        Self::Surface(p)
    }
}

impl Pattern {
    /// Which kind of pattern this is.
    pub fn pattern_type(&self) -> PatternType {
        match self {
            Self::Color(_) => PatternType::Color,
            Self::LinearGradient(_) => PatternType::LinearGradient,
            Self::RadialGradient(_) => PatternType::RadialGradient,
            Self::Surface(_) => PatternType::Surface,
        }
    }

    /// Gradient stops, for gradient patterns.
    pub fn stops(&self) -> Option<&GradientStops> {
        match self {
            Self::LinearGradient(p) => Some(&p.stops),
            Self::RadialGradient(p) => Some(&p.stops),
            Self::Color(_) | Self::Surface(_) => None,
        }
    }

    /// Source surface, for surface patterns.
    pub fn surface(&self) -> Option<&SourceSurfaceRef> {
        match self {
            Self::Surface(p) => Some(&p.surface),
            _ => None,
        }
    }

    /// The pattern backends should actually paint.
    ///
    /// A linear gradient whose endpoints coincide paints as the color of its
    /// last stop.
    pub fn resolved(&self) -> Cow<'_, Self> {
        match self {
            Self::LinearGradient(p) if p.begin == p.end => {
                Cow::Owned(Self::Color(p.stops.last_color()))
            }
            _ => Cow::Borrowed(self),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use peniko::color::palette::css::{BLUE, RED};

    #[test]
    fn stops_are_sorted_and_clamped() {
        let stops = GradientStops::new(
            &[
                GradientStop::new(1.5, BLUE),
                GradientStop::new(-1.0, RED),
                GradientStop::new(0.5, RED),
            ],
            ExtendMode::Pad,
            BackendType::None,
        );
        let offsets: Vec<f32> = stops.stops().iter().map(|s| s.offset).collect();
        assert_eq!(offsets, vec![0.0, 0.5, 1.0]);
        assert_eq!(stops.last_color(), BLUE);
    }

    #[test]
    fn equal_offsets_keep_insertion_order() {
        let stops = GradientStops::new(
            &[GradientStop::new(0.5, RED), GradientStop::new(0.5, BLUE)],
            ExtendMode::Pad,
            BackendType::None,
        );
        assert_eq!(stops.stops()[0].color, RED);
        assert_eq!(stops.premul_color_at(0.75), [0.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    fn interpolates_between_stops() {
        let stops = GradientStops::new(
            &[GradientStop::new(0.0, RED), GradientStop::new(1.0, BLUE)],
            ExtendMode::Pad,
            BackendType::None,
        );
        let mid = stops.premul_color_at(0.5);
        assert!((mid[0] - 0.5).abs() < 1e-6);
        assert!((mid[2] - 0.5).abs() < 1e-6);
        assert_eq!(mid[3], 1.0);
    }

    #[test]
    fn degenerate_linear_gradient_resolves_to_last_stop() {
        let stops = GradientStops::new(
            &[GradientStop::new(0.0, RED), GradientStop::new(1.0, BLUE)],
            ExtendMode::Pad,
            BackendType::None,
        );
        let p = Pattern::from(LinearGradientPattern::new(
            Point::new(3.0, 3.0),
            Point::new(3.0, 3.0),
            stops,
        ));
        match p.resolved().as_ref() {
            Pattern::Color(c) => assert_eq!(*c, BLUE),
            other => panic!("expected a solid color, got {other:?}"),
        }
    }

    #[test]
    fn extend_modes() {
        assert_eq!(apply_extend(1.25, ExtendMode::Pad), 1.0);
        assert_eq!(apply_extend(1.25, ExtendMode::Repeat), 0.25);
        assert_eq!(apply_extend(1.25, ExtendMode::Reflect), 0.75);
        assert_eq!(apply_extend(-0.25, ExtendMode::Reflect), 0.25);
    }
}

// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Path construction and geometric queries.
//!
//! A [`PathBuilder`] accumulates segments until [`PathBuilder::finish`] turns
//! them into an immutable [`Path`]. Paths are cheap to clone and are tagged
//! with the backend of the target that created their builder.
//!
//! Queries operate on the curve geometry directly:
//!
//! ```
//! use kurbo::{Affine, Point};
//! use understory_draw::{BackendType, FillRule, PathBuilder, PathSink};
//!
//! let mut b = PathBuilder::new(BackendType::None, FillRule::NonZero);
//! b.move_to(Point::new(0.0, 0.0));
//! b.line_to(Point::new(10.0, 0.0));
//! b.line_to(Point::new(10.0, 10.0));
//! b.line_to(Point::new(0.0, 10.0));
//! b.close();
//! let path = b.finish();
//! assert!(path.contains_point(Point::new(5.0, 5.0), Affine::IDENTITY));
//! assert_eq!(path.compute_length(), 40.0);
//! ```

use core::f64::consts::TAU;
use core::fmt;
use std::sync::Arc;

use kurbo::{
    Affine, BezPath, ParamCurve, ParamCurveArclen, ParamCurveDeriv, PathEl, PathSeg, Point, Rect,
    Shape, StrokeOpts, Vec2,
};

use crate::{BackendType, FillRule, StrokeOptions};

/// Flattening tolerance used for arcs and stroke outlines, in user units.
pub const TOLERANCE: f64 = 0.1;

const ARCLEN_ACCURACY: f64 = 1e-6;

/// Anything that accepts path segments.
///
/// [`PathBuilder`] is the canonical sink; font outlines and arc helpers are
/// written against this trait.
pub trait PathSink {
    /// Start a new subpath at `p`.
    fn move_to(&mut self, p: Point);
    /// Straight segment to `p`.
    fn line_to(&mut self, p: Point);
    /// Cubic Bézier segment to `p`.
    fn bezier_to(&mut self, cp1: Point, cp2: Point, p: Point);
    /// Quadratic Bézier segment to `p`.
    fn quadratic_bezier_to(&mut self, cp: Point, p: Point);
    /// Close the current subpath.
    fn close(&mut self);
    /// Circular arc around `origin`.
    ///
    /// A straight segment joins the current point to the arc start. Angles are
    /// in radians; clockwise sweeps follow increasing angles in a y-down space.
    /// The sweep is normalized into the requested direction and never exceeds
    /// a full turn.
    fn arc(
        &mut self,
        origin: Point,
        radius: f64,
        start_angle: f64,
        end_angle: f64,
        anticlockwise: bool,
    );
    /// The current point, or the origin if nothing has been drawn.
    fn current_point(&self) -> Point;
}

/// Normalize arc angles so the sweep runs in the requested direction.
///
/// Returns `(start, end)`; `end - start` is the signed sweep, at most a full
/// turn in magnitude.
pub fn normalize_arc_angles(start: f64, end: f64, anticlockwise: bool) -> (f64, f64) {
    let (mut start, mut end) = (start, end);
    if !anticlockwise && end < start {
        let correction = ((start - end) / TAU).ceil();
        end += correction * TAU;
    } else if anticlockwise && start < end {
        let correction = ((end - start) / TAU).ceil();
        start += correction * TAU;
    }
    if !anticlockwise && end - start > TAU {
        end = start + TAU;
    } else if anticlockwise && start - end > TAU {
        end = start - TAU;
    }
    (start, end)
}

/// Accumulates segments for a [`Path`].
///
/// Segment calls without a current point start a subpath where the segment
/// starts. Once [`finish`](Self::finish) has been called the builder is spent;
/// any further write is a programming error and panics.
pub struct PathBuilder {
    path: BezPath,
    fill_rule: FillRule,
    backend: BackendType,
    current: Option<Point>,
    subpath_start: Point,
    open: bool,
    finished: bool,
}

impl fmt::Debug for PathBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathBuilder")
            .field("elements", &self.path.elements().len())
            .field("fill_rule", &self.fill_rule)
            .field("backend", &self.backend)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl PathBuilder {
    /// Create an empty builder.
    ///
    /// Usually obtained from `DrawTarget::create_path_builder`, which tags it
    /// with the target's backend.
    pub fn new(backend: BackendType, fill_rule: FillRule) -> Self {
        Self::from_bez_path(BezPath::new(), backend, fill_rule)
    }

    fn from_bez_path(path: BezPath, backend: BackendType, fill_rule: FillRule) -> Self {
        let mut current = None;
        let mut subpath_start = Point::ZERO;
        let mut open = false;
        for el in path.elements() {
            match *el {
                PathEl::MoveTo(p) => {
                    subpath_start = p;
                    current = Some(p);
                    open = true;
                }
                PathEl::LineTo(p) | PathEl::QuadTo(_, p) | PathEl::CurveTo(_, _, p) => {
                    current = Some(p);
                }
                PathEl::ClosePath => {
                    current = Some(subpath_start);
                    open = false;
                }
            }
        }
        Self {
            path,
            fill_rule,
            backend,
            current,
            subpath_start,
            open,
            finished: false,
        }
    }

    /// Fill rule the finished path will carry.
    pub fn fill_rule(&self) -> FillRule {
        self.fill_rule
    }

    /// Backend this builder belongs to.
    pub fn backend_type(&self) -> BackendType {
        self.backend
    }

    /// Returns `true` once [`finish`](Self::finish) has been called.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Produce the immutable path and spend the builder.
    ///
    /// # Panics
    ///
    /// Panics if the builder was already finished.
    pub fn finish(&mut self) -> Path {
        self.ensure_writable();
        self.finished = true;
        Path {
            inner: Arc::new(PathData {
                path: core::mem::take(&mut self.path),
                fill_rule: self.fill_rule,
                backend: self.backend,
            }),
        }
    }

    fn ensure_writable(&self) {
        assert!(
            !self.finished,
            "PathBuilder: write after finish(); create a new builder instead"
        );
    }

    fn begin_segment(&mut self, fallback: Point) {
        if self.open {
            return;
        }
        let start = self.current.unwrap_or(fallback);
        self.path.move_to(start);
        self.subpath_start = start;
        self.open = true;
    }

    /// Append every element of `path`, mapped through `transform`.
    pub fn append(&mut self, path: &BezPath, transform: Affine) {
        for el in path.elements() {
            match transform * *el {
                PathEl::MoveTo(p) => self.move_to(p),
                PathEl::LineTo(p) => self.line_to(p),
                PathEl::QuadTo(c, p) => self.quadratic_bezier_to(c, p),
                PathEl::CurveTo(c1, c2, p) => self.bezier_to(c1, c2, p),
                PathEl::ClosePath => self.close(),
            }
        }
    }
}

impl PathSink for PathBuilder {
    fn move_to(&mut self, p: Point) {
        self.ensure_writable();
        self.path.move_to(p);
        self.subpath_start = p;
        self.current = Some(p);
        self.open = true;
    }

    fn line_to(&mut self, p: Point) {
        self.ensure_writable();
        if !self.open && self.current.is_none() {
            self.move_to(p);
            return;
        }
        self.begin_segment(p);
        self.path.line_to(p);
        self.current = Some(p);
    }

    fn bezier_to(&mut self, cp1: Point, cp2: Point, p: Point) {
        self.ensure_writable();
        self.begin_segment(cp1);
        self.path.curve_to(cp1, cp2, p);
        self.current = Some(p);
    }

    fn quadratic_bezier_to(&mut self, cp: Point, p: Point) {
        self.ensure_writable();
        self.begin_segment(cp);
        self.path.quad_to(cp, p);
        self.current = Some(p);
    }

    fn close(&mut self) {
        self.ensure_writable();
        if self.open {
            self.path.close_path();
            self.open = false;
            self.current = Some(self.subpath_start);
        }
    }

    fn arc(
        &mut self,
        origin: Point,
        radius: f64,
        start_angle: f64,
        end_angle: f64,
        anticlockwise: bool,
    ) {
        self.ensure_writable();
        let (start, end) = normalize_arc_angles(start_angle, end_angle, anticlockwise);
        self.line_to(origin + Vec2::from_angle(start) * radius);
        let sweep = end - start;
        if sweep == 0.0 || radius <= 0.0 {
            return;
        }
        let arc = kurbo::Arc {
            center: origin,
            radii: Vec2::new(radius, radius),
            start_angle: start,
            sweep_angle: sweep,
            x_rotation: 0.0,
        };
        for el in arc.append_iter(TOLERANCE) {
            match el {
                PathEl::LineTo(p) => self.line_to(p),
                PathEl::QuadTo(c, p) => self.quadratic_bezier_to(c, p),
                PathEl::CurveTo(c1, c2, p) => self.bezier_to(c1, c2, p),
                PathEl::MoveTo(_) | PathEl::ClosePath => {}
            }
        }
    }

    fn current_point(&self) -> Point {
        self.current.unwrap_or(Point::ZERO)
    }
}

#[derive(Debug)]
struct PathData {
    path: BezPath,
    fill_rule: FillRule,
    backend: BackendType,
}

/// Immutable geometry produced by a [`PathBuilder`].
///
/// Cloning shares the underlying geometry.
#[derive(Clone, Debug)]
pub struct Path {
    inner: Arc<PathData>,
}

impl Path {
    /// Backend tag inherited from the builder.
    pub fn backend_type(&self) -> BackendType {
        self.inner.backend
    }

    /// Fill rule used for filling and containment.
    pub fn fill_rule(&self) -> FillRule {
        self.inner.fill_rule
    }

    /// Underlying curve geometry.
    pub fn as_bez_path(&self) -> &BezPath {
        &self.inner.path
    }

    /// Returns `true` if both handles share the same geometry.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// New builder seeded with a copy of this path.
    pub fn copy_to_builder(&self, fill_rule: FillRule) -> PathBuilder {
        PathBuilder::from_bez_path(self.inner.path.clone(), self.inner.backend, fill_rule)
    }

    /// New builder seeded with a copy of this path mapped through `transform`.
    pub fn transformed_copy_to_builder(
        &self,
        transform: Affine,
        fill_rule: FillRule,
    ) -> PathBuilder {
        let path = transform * &self.inner.path;
        PathBuilder::from_bez_path(path, self.inner.backend, fill_rule)
    }

    /// Whether `point` lies inside the path filled under `transform`.
    pub fn contains_point(&self, point: Point, transform: Affine) -> bool {
        let Some(local) = inverse_point(transform, point) else {
            return false;
        };
        let winding = closed_subpaths(&self.inner.path).winding(local);
        fill_rule_includes(self.inner.fill_rule, winding)
    }

    /// Whether `point` lies inside the outline of the stroked path.
    pub fn stroke_contains_point(
        &self,
        stroke: &StrokeOptions,
        point: Point,
        transform: Affine,
    ) -> bool {
        let Some(local) = inverse_point(transform, point) else {
            return false;
        };
        stroke_outline(&self.inner.path, stroke).winding(local) != 0
    }

    /// Axis-aligned bounds of the path under `transform`.
    ///
    /// An empty path has zero-sized bounds at the origin.
    pub fn bounds(&self, transform: Affine) -> Rect {
        if self.inner.path.elements().is_empty() {
            return Rect::ZERO;
        }
        (transform * &self.inner.path).bounding_box()
    }

    /// Conservative bounds of the stroked outline under `transform`.
    pub fn stroked_bounds(&self, stroke: &StrokeOptions, transform: Affine) -> Rect {
        if self.inner.path.elements().is_empty() {
            return Rect::ZERO;
        }
        let outline = transform * &stroke_outline(&self.inner.path, stroke);
        if outline.elements().is_empty() {
            return self.bounds(transform);
        }
        let slop = TOLERANCE * transform.as_coeffs()[0..4].iter().map(|c| c.abs()).sum::<f64>();
        outline.bounding_box().inflate(slop, slop)
    }

    /// Total arc length of every segment.
    pub fn compute_length(&self) -> f64 {
        self.inner
            .path
            .segments()
            .map(|seg| seg.arclen(ARCLEN_ACCURACY))
            .sum()
    }

    /// Point and unit tangent at `length` along the path.
    ///
    /// Lengths outside the path clamp to its ends. An empty path yields the
    /// origin with a zero tangent.
    pub fn compute_point_at_length(&self, length: f64) -> (Point, Vec2) {
        let mut remaining = length.max(0.0);
        let mut last = None;
        for seg in self.inner.path.segments() {
            let seg_len = seg.arclen(ARCLEN_ACCURACY);
            if remaining <= seg_len {
                let t = if seg_len > 0.0 {
                    seg.inv_arclen(remaining, ARCLEN_ACCURACY)
                } else {
                    0.0
                };
                return (seg.eval(t), unit_tangent(seg, t));
            }
            remaining -= seg_len;
            last = Some(seg);
        }
        match last {
            Some(seg) => (seg.eval(1.0), unit_tangent(seg, 1.0)),
            None => (Point::ZERO, Vec2::ZERO),
        }
    }
}

fn inverse_point(transform: Affine, point: Point) -> Option<Point> {
    let det = transform.determinant();
    if det == 0.0 || !det.is_finite() {
        return None;
    }
    Some(transform.inverse() * point)
}

fn fill_rule_includes(rule: FillRule, winding: i32) -> bool {
    match rule {
        FillRule::NonZero => winding != 0,
        FillRule::EvenOdd => winding % 2 != 0,
    }
}

/// Copy of `path` with every open subpath explicitly closed.
///
/// Filling treats open subpaths as closed; winding queries need the closing
/// edge spelled out.
pub fn closed_subpaths(path: &BezPath) -> BezPath {
    let mut out = BezPath::new();
    let mut open = false;
    for el in path.elements() {
        match el {
            PathEl::MoveTo(_) => {
                if open {
                    out.close_path();
                }
                open = true;
            }
            PathEl::ClosePath => open = false,
            _ => {}
        }
        out.push(*el);
    }
    if open {
        out.close_path();
    }
    out
}

/// Outline of `path` stroked with `stroke`, in the path's space.
pub fn stroke_outline(path: &BezPath, stroke: &StrokeOptions) -> BezPath {
    kurbo::stroke(
        path.iter(),
        &stroke.to_kurbo(),
        &StrokeOpts::default(),
        TOLERANCE,
    )
}

fn unit_tangent(seg: PathSeg, t: f64) -> Vec2 {
    let d = match seg {
        PathSeg::Line(l) => l.p1 - l.p0,
        PathSeg::Quad(q) => q.deriv().eval(t).to_vec2(),
        PathSeg::Cubic(c) => c.deriv().eval(t).to_vec2(),
    };
    let len = d.hypot();
    if len > 0.0 { d / len } else { Vec2::ZERO }
}

// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Scan conversion of device-space paths into per-pixel coverage.
//!
//! Coverage is estimated by point sampling on a regular `n` by `n` grid per
//! pixel. Edges on whole pixel boundaries therefore produce exact 0 or 1
//! coverage, which keeps axis-aligned fills and clips crisp.

use kurbo::{BezPath, PathEl, Point};
use understory_draw::{FillRule, IntRect};

/// Coverage in `0..=1` for every pixel of `bounds`; zero elsewhere.
#[derive(Clone, Debug, Default)]
pub(crate) struct Mask {
    pub(crate) bounds: IntRect,
    pub(crate) data: Vec<f32>,
}

impl Mask {
    /// Uniform coverage over `bounds`.
    pub(crate) fn filled(bounds: IntRect, value: f32) -> Self {
        if bounds.is_empty() {
            return Self::default();
        }
        let len = bounds.width as usize * bounds.height as usize;
        Self {
            bounds,
            data: vec![value; len],
        }
    }

    #[inline]
    fn index(&self, x: i32, y: i32) -> usize {
        (y - self.bounds.y) as usize * self.bounds.width as usize + (x - self.bounds.x) as usize
    }

    /// Coverage at pixel `(x, y)`.
    #[inline]
    pub(crate) fn get(&self, x: i32, y: i32) -> f32 {
        if self.bounds.contains(x, y) {
            self.data[self.index(x, y)]
        } else {
            0.0
        }
    }

    /// Pointwise product, restricted to the common bounds.
    pub(crate) fn intersect(&self, other: &Self) -> Self {
        let bounds = self.bounds.intersect(&other.bounds);
        let mut out = Self::filled(bounds, 0.0);
        for y in bounds.y..bounds.bottom() {
            for x in bounds.x..bounds.right() {
                let i = out.index(x, y);
                out.data[i] = self.get(x, y) * other.get(x, y);
            }
        }
        out
    }

    /// Scale coverage at each pixel by `f(x, y)`.
    pub(crate) fn modulate(&mut self, mut f: impl FnMut(i32, i32) -> f32) {
        let b = self.bounds;
        for y in b.y..b.bottom() {
            for x in b.x..b.right() {
                let i = self.index(x, y);
                if self.data[i] > 0.0 {
                    self.data[i] *= f(x, y);
                }
            }
        }
    }
}

#[derive(Copy, Clone, Debug)]
struct Edge {
    x0: f64,
    y0: f64,
    x1: f64,
    y1: f64,
}

fn edges(path: &BezPath, tolerance: f64) -> Vec<Edge> {
    let mut out = Vec::new();
    let mut start = Point::ZERO;
    let mut last = Point::ZERO;
    let mut open = false;
    let mut push = |out: &mut Vec<Edge>, a: Point, b: Point| {
        if a.y != b.y {
            out.push(Edge {
                x0: a.x,
                y0: a.y,
                x1: b.x,
                y1: b.y,
            });
        }
    };
    kurbo::flatten(path, tolerance, |el| match el {
        PathEl::MoveTo(p) => {
            if open {
                push(&mut out, last, start);
            }
            start = p;
            last = p;
            open = true;
        }
        PathEl::LineTo(p) => {
            push(&mut out, last, p);
            last = p;
        }
        PathEl::ClosePath => {
            push(&mut out, last, start);
            last = start;
            open = false;
        }
        // Flattening only emits lines.
        PathEl::QuadTo(_, p) | PathEl::CurveTo(_, _, p) => {
            push(&mut out, last, p);
            last = p;
        }
    });
    if open {
        push(&mut out, last, start);
    }
    out
}

/// Coverage of `path` (in device space) within `limit`.
///
/// `samples` is the number of sample rows and columns per pixel; `1` samples
/// only the pixel center and so disables anti-aliasing.
pub(crate) fn rasterize(
    path: &BezPath,
    fill_rule: FillRule,
    limit: IntRect,
    samples: u32,
    tolerance: f64,
) -> Mask {
    let edges = edges(path, tolerance);
    if edges.is_empty() {
        return Mask::default();
    }
    let (mut x0, mut y0, mut x1, mut y1) = (f64::MAX, f64::MAX, f64::MIN, f64::MIN);
    for e in &edges {
        x0 = x0.min(e.x0).min(e.x1);
        x1 = x1.max(e.x0).max(e.x1);
        y0 = y0.min(e.y0).min(e.y1);
        y1 = y1.max(e.y0).max(e.y1);
    }
    let bounds = IntRect::round_out(kurbo::Rect::new(x0, y0, x1, y1)).intersect(&limit);
    let mut mask = Mask::filled(bounds, 0.0);
    if bounds.is_empty() {
        return mask;
    }
    let n = samples.max(1);
    let nf = f64::from(n);
    let weight = 1.0 / (n * n) as f32;
    let columns = i64::from(bounds.width) * i64::from(n);
    let bx = f64::from(bounds.x);
    let mut crossings: Vec<(f64, i32)> = Vec::new();
    for py in bounds.y..bounds.bottom() {
        let row = (py - bounds.y) as usize * bounds.width as usize;
        for sy in 0..n {
            let ys = f64::from(py) + (f64::from(sy) + 0.5) / nf;
            crossings.clear();
            for e in &edges {
                let (lo, hi, dir) = if e.y0 < e.y1 {
                    (e.y0, e.y1, 1)
                } else {
                    (e.y1, e.y0, -1)
                };
                if ys >= lo && ys < hi {
                    let x = e.x0 + (ys - e.y0) * (e.x1 - e.x0) / (e.y1 - e.y0);
                    crossings.push((x, dir));
                }
            }
            crossings.sort_by(|a, b| a.0.total_cmp(&b.0));
            let mut winding = 0;
            for pair in 0..crossings.len() {
                winding += crossings[pair].1;
                let inside = match fill_rule {
                    FillRule::NonZero => winding != 0,
                    FillRule::EvenOdd => winding % 2 != 0,
                };
                if !inside || pair + 1 >= crossings.len() {
                    continue;
                }
                let xa = crossings[pair].0;
                let xb = crossings[pair + 1].0;
                // Sample columns k sit at bx + (k + 0.5) / n.
                let k0 = first_column((xa - bx) * nf - 0.5).max(0);
                let k1 = first_column((xb - bx) * nf - 0.5).min(columns);
                for k in k0..k1 {
                    #[allow(
                        clippy::cast_possible_truncation,
                        reason = "k is a column inside the bounds"
                    )]
                    let px = (k / i64::from(n)) as usize;
                    mask.data[row + px] += weight;
                }
            }
        }
    }
    for v in &mut mask.data {
        *v = v.min(1.0);
    }
    mask
}

#[allow(
    clippy::cast_possible_truncation,
    reason = "sample column indices are bounded by the clamped device rectangle"
)]
fn first_column(v: f64) -> i64 {
    v.ceil().clamp(-1.0e12, 1.0e12) as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use kurbo::{Rect, Shape};

    fn limit() -> IntRect {
        IntRect::new(0, 0, 16, 16)
    }

    #[test]
    fn integer_rect_has_exact_coverage() {
        let path = Rect::new(2.0, 3.0, 6.0, 7.0).to_path(0.1);
        let m = rasterize(&path, FillRule::NonZero, limit(), 4, 0.1);
        assert_eq!(m.get(2, 3), 1.0);
        assert_eq!(m.get(5, 6), 1.0);
        assert_eq!(m.get(6, 6), 0.0);
        assert_eq!(m.get(1, 3), 0.0);
    }

    #[test]
    fn half_pixel_edge_gives_half_coverage() {
        let path = Rect::new(2.5, 0.0, 4.0, 1.0).to_path(0.1);
        let m = rasterize(&path, FillRule::NonZero, limit(), 4, 0.1);
        assert_eq!(m.get(2, 0), 0.5);
        assert_eq!(m.get(3, 0), 1.0);
    }

    #[test]
    fn aliased_sampling_uses_pixel_centers() {
        let path = Rect::new(2.4, 0.0, 4.0, 1.0).to_path(0.1);
        let m = rasterize(&path, FillRule::NonZero, limit(), 1, 0.1);
        assert_eq!(m.get(2, 0), 1.0);
        let path = Rect::new(2.6, 0.0, 4.0, 1.0).to_path(0.1);
        let m = rasterize(&path, FillRule::NonZero, limit(), 1, 0.1);
        assert_eq!(m.get(2, 0), 0.0);
    }

    #[test]
    fn even_odd_punches_holes() {
        let mut path = Rect::new(0.0, 0.0, 8.0, 8.0).to_path(0.1);
        path.extend(Rect::new(2.0, 2.0, 6.0, 6.0).to_path(0.1));
        let eo = rasterize(&path, FillRule::EvenOdd, limit(), 4, 0.1);
        assert_eq!(eo.get(3, 3), 0.0);
        assert_eq!(eo.get(1, 1), 1.0);
        let nz = rasterize(&path, FillRule::NonZero, limit(), 4, 0.1);
        assert_eq!(nz.get(3, 3), 1.0);
    }

    #[test]
    fn open_subpaths_are_closed_and_clipped_to_limit() {
        let mut path = BezPath::new();
        path.move_to((-4.0, -4.0));
        path.line_to((30.0, -4.0));
        path.line_to((30.0, 30.0));
        path.line_to((-4.0, 30.0));
        let m = rasterize(&path, FillRule::NonZero, limit(), 4, 0.1);
        assert_eq!(m.bounds, limit());
        assert!(m.data.iter().all(|v| *v == 1.0));
    }

    #[test]
    fn intersection_multiplies() {
        let a = Mask::filled(IntRect::new(0, 0, 4, 4), 0.5);
        let b = Mask::filled(IntRect::new(2, 2, 4, 4), 0.5);
        let c = a.intersect(&b);
        assert_eq!(c.bounds, IntRect::new(2, 2, 2, 2));
        assert_eq!(c.get(3, 3), 0.25);
        assert_eq!(c.get(1, 1), 0.0);
    }
}

// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A backend that forwards every primitive to two targets of the same kind.

use core::any::Any;
use std::sync::Arc;

use kurbo::{Affine, BezPath, Point, Rect, Vec2};
use peniko::Color;

use crate::backend::{BitsAccess, FillGeometry};
use crate::{
    BackendCaps, BackendType, Clip, CompositionOp, DrawBackend, DrawError, DrawOptions,
    DrawSurfaceOptions, DrawTarget, ExtendMode, GradientStop, IntPoint, IntRect, IntSize, Pattern,
    SharedDrawTarget, SourceSurfaceRef, StrokeOptions, SurfaceFormat,
};

const BORROWED: DrawError = DrawError::Unsupported("draw target is mutably borrowed");

/// Forwards to the backends of `a` and `b`, which stay usable by their other
/// holders. Reads (size, snapshot, gradient preparation) come from `a`.
#[derive(Debug)]
pub(crate) struct DualBackend {
    a: SharedDrawTarget,
    b: SharedDrawTarget,
    kind: BackendType,
    size: IntSize,
    format: SurfaceFormat,
    caps: BackendCaps,
    // Clips pushed through the dual target and not yet popped.
    clip_depth: usize,
}

impl DualBackend {
    pub(crate) fn new(a: SharedDrawTarget, b: SharedDrawTarget) -> Result<Self, DrawError> {
        let (kind, size, format, caps) = {
            let (Ok(ta), Ok(tb)) = (a.try_borrow(), b.try_borrow()) else {
                return Err(BORROWED);
            };
            if ta.backend_type() != tb.backend_type() {
                return Err(DrawError::BackendMismatch {
                    expected: ta.backend_type(),
                    found: tb.backend_type(),
                });
            }
            if ta.size() != tb.size() {
                return Err(DrawError::SizeMismatch(ta.size(), tb.size()));
            }
            let shared = ta.capabilities() & tb.capabilities();
            (
                ta.backend_type(),
                ta.size(),
                ta.format(),
                BackendCaps::DUAL | (shared & BackendCaps::PREPARED_GRADIENTS),
            )
        };
        Ok(Self {
            a,
            b,
            kind,
            size,
            format,
            caps,
            clip_depth: 0,
        })
    }

    /// Run `f` on both halves, in order.
    fn each(&self, f: impl Fn(&mut DrawTarget)) {
        for half in [&self.a, &self.b] {
            match half.try_borrow_mut() {
                Ok(mut target) => f(&mut target),
                Err(_) => log::warn!("dual target: half is borrowed elsewhere; call skipped"),
            }
        }
    }

    /// Run a paint primitive on both halves' backends.
    fn paint(&self, what: &'static str, f: impl Fn(&mut dyn DrawBackend)) {
        self.each(|target| target.forward(what, &f));
    }

    fn first<R>(&self, f: impl FnOnce(&DrawTarget) -> R) -> Option<R> {
        self.a.try_borrow().ok().map(|target| f(&target))
    }
}

impl Drop for DualBackend {
    fn drop(&mut self) {
        for _ in 0..self.clip_depth {
            self.each(|target| target.backend_mut().pop_clip());
        }
    }
}

impl DrawBackend for DualBackend {
    fn backend_type(&self) -> BackendType {
        self.kind
    }

    fn size(&self) -> IntSize {
        self.size
    }

    fn format(&self) -> SurfaceFormat {
        self.format
    }

    fn capabilities(&self) -> BackendCaps {
        self.caps
    }

    fn fill(
        &mut self,
        geometry: &FillGeometry<'_>,
        pattern: &Pattern,
        options: &DrawOptions,
        transform: Affine,
    ) {
        self.paint("fill", |b| b.fill(geometry, pattern, options, transform));
    }

    fn stroke(
        &mut self,
        path: &BezPath,
        stroke: &StrokeOptions,
        pattern: &Pattern,
        options: &DrawOptions,
        transform: Affine,
    ) {
        self.paint("stroke", |b| {
            b.stroke(path, stroke, pattern, options, transform);
        });
    }

    fn draw_surface(
        &mut self,
        surface: &SourceSurfaceRef,
        dest: Rect,
        source: Rect,
        surface_options: &DrawSurfaceOptions,
        options: &DrawOptions,
        transform: Affine,
    ) {
        self.paint("draw_surface", |b| {
            b.draw_surface(surface, dest, source, surface_options, options, transform);
        });
    }

    fn draw_surface_with_shadow(
        &mut self,
        surface: &SourceSurfaceRef,
        dest: Point,
        color: Color,
        offset: Vec2,
        sigma: f32,
        op: CompositionOp,
    ) {
        self.paint("draw_surface_with_shadow", |b| {
            b.draw_surface_with_shadow(surface, dest, color, offset, sigma, op);
        });
    }

    fn copy_surface(&mut self, surface: &SourceSurfaceRef, source: IntRect, dest: IntPoint) {
        self.paint("copy_surface", |b| b.copy_surface(surface, source, dest));
    }

    fn copy_rect(&mut self, source: IntRect, dest: IntPoint) {
        self.paint("copy_rect", |b| b.copy_rect(source, dest));
    }

    fn mask(&mut self, source: &Pattern, mask: &Pattern, options: &DrawOptions, transform: Affine) {
        self.paint("mask", |b| b.mask(source, mask, options, transform));
    }

    fn mask_surface(
        &mut self,
        source: &Pattern,
        mask: &SourceSurfaceRef,
        offset: Point,
        options: &DrawOptions,
        transform: Affine,
    ) {
        self.paint("mask_surface", |b| {
            b.mask_surface(source, mask, offset, options, transform);
        });
    }

    fn push_clip(&mut self, clip: &Clip) {
        self.each(|target| target.backend_mut().push_clip(clip));
        self.clip_depth += 1;
    }

    fn pop_clip(&mut self) {
        if self.clip_depth > 0 {
            self.each(|target| target.backend_mut().pop_clip());
            self.clip_depth -= 1;
        }
    }

    fn snapshot(&mut self) -> Option<SourceSurfaceRef> {
        self.a.try_borrow_mut().ok()?.snapshot()
    }

    fn flush(&mut self) {
        self.each(DrawTarget::flush);
    }

    fn lock_bits(&mut self) -> Option<BitsAccess> {
        None
    }

    fn create_similar(
        &self,
        size: IntSize,
        format: SurfaceFormat,
    ) -> Result<Box<dyn DrawBackend>, DrawError> {
        let similar = |half: &SharedDrawTarget| {
            half.try_borrow()
                .map_err(|_| BORROWED)?
                .create_similar_draw_target(size, format)
                .map(DrawTarget::into_shared)
        };
        Ok(Box::new(Self::new(similar(&self.a)?, similar(&self.b)?)?))
    }

    fn prepare_gradient_stops(
        &self,
        stops: &[GradientStop],
        extend: ExtendMode,
    ) -> Option<Arc<dyn Any + Send + Sync>> {
        self.first(|a| a.backend().prepare_gradient_stops(stops, extend))?
    }

    fn optimize_source_surface(&self, surface: &SourceSurfaceRef) -> SourceSurfaceRef {
        self.first(|a| a.optimize_source_surface(surface))
            .unwrap_or_else(|| Arc::clone(surface))
    }

    fn set_opaque_rect(&mut self, rect: IntRect) {
        self.each(|target| target.set_opaque_rect(rect));
    }
}

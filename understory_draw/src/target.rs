// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The draw target state machine.
//!
//! [`DrawTarget`] owns the state every backend shares (transform, clip
//! stack, lock, snapshot cache, user data) and validates each call before
//! handing it to its [`DrawBackend`]. Invalid paint calls are dropped with a
//! warning; they never partially execute and never change target state.

use core::cell::RefCell;
use core::fmt;
use std::rc::Rc;
use std::sync::Arc;

use kurbo::{Affine, BezPath, Point, Rect, Shape, Vec2};
use peniko::{Color, Compose};

use crate::backend::{ClipGeometry, FillGeometry, NativeSurfaceType};
use crate::path::TOLERANCE;
use crate::pattern::sorted_stops;
use crate::recording::{DrawEvent, DrawEventRecorder};
use crate::surface::check_size;
use crate::{
    AntialiasMode, BackendCaps, BackendType, Clip, CompositionOp, DrawBackend, DrawError,
    DrawOptions, DrawSurfaceOptions, ExtendMode, FillRule, GlyphBuffer, GradientStop,
    GradientStops, IntPoint, IntRect, IntSize, NativeSurface, Path, PathBuilder, Pattern,
    ScaledFontRef, SharedPixels, Snapping, SourceSurfaceRef, StrokeOptions, SurfaceFormat,
    UserData, UserDataKey,
};

/// Proof of an outstanding [`DrawTarget::lock_bits`].
///
/// Must be handed back to [`DrawTarget::release_bits`] on the same target.
#[derive(Debug)]
pub struct LockedBits {
    /// Backing store of the target. Changes are visible to later draws.
    pub pixels: SharedPixels,
    /// Pixel dimensions.
    pub size: IntSize,
    /// Signed distance between rows in bytes.
    pub stride: i32,
    /// Pixel format.
    pub format: SurfaceFormat,
    token: u64,
}

/// Target handle shared between several holders, such as the caller and a
/// dual target built over it.
pub type SharedDrawTarget = Rc<RefCell<DrawTarget>>;

/// An immediate-mode drawing surface.
///
/// Targets are single-threaded. Every method takes the target by reference
/// and paint calls return nothing; see the crate docs for the failure model.
pub struct DrawTarget {
    backend: Box<dyn DrawBackend>,
    transform: Affine,
    // `None` marks a push that was dropped; popping it must not reach the
    // backend.
    clips: Vec<Option<Clip>>,
    opaque_rect: IntRect,
    permit_subpixel_aa: bool,
    user_data: UserData,
    snapshot: Option<SourceSurfaceRef>,
    lock: Option<u64>,
    next_lock: u64,
    recorder: Option<Arc<dyn DrawEventRecorder>>,
}

impl fmt::Debug for DrawTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DrawTarget")
            .field("backend", &self.backend)
            .field("transform", &self.transform)
            .field("clip_depth", &self.clips.len())
            .field("locked", &self.lock.is_some())
            .field("recording", &self.recorder.is_some())
            .finish_non_exhaustive()
    }
}

impl DrawTarget {
    /// Wrap a backend. Backend providers call this; applications normally go
    /// through [`Factory`](crate::Factory).
    pub fn new(backend: Box<dyn DrawBackend>) -> Self {
        Self {
            backend,
            transform: Affine::IDENTITY,
            clips: Vec::new(),
            opaque_rect: IntRect::default(),
            permit_subpixel_aa: false,
            user_data: UserData::default(),
            snapshot: None,
            lock: None,
            next_lock: 0,
            recorder: None,
        }
    }

    pub(crate) fn set_recorder(&mut self, recorder: Arc<dyn DrawEventRecorder>) {
        self.recorder = Some(recorder);
    }

    /// Wrap the target for shared ownership.
    pub fn into_shared(self) -> SharedDrawTarget {
        Rc::new(RefCell::new(self))
    }

    pub(crate) fn backend(&self) -> &dyn DrawBackend {
        &*self.backend
    }

    pub(crate) fn backend_mut(&mut self) -> &mut dyn DrawBackend {
        &mut *self.backend
    }

    /// Run a primitive issued through another target against this backend.
    ///
    /// Dropped while locked; otherwise invalidates the snapshot.
    pub(crate) fn forward(&mut self, what: &'static str, f: impl FnOnce(&mut dyn DrawBackend)) {
        if self.lock.is_some() {
            log::warn!("{what}: draw target is locked; call dropped");
            return;
        }
        self.snapshot = None;
        f(&mut *self.backend);
    }

    /// Backend tag. Paths and gradient stops must carry the same tag.
    pub fn backend_type(&self) -> BackendType {
        self.backend.backend_type()
    }

    /// Pixel dimensions.
    pub fn size(&self) -> IntSize {
        self.backend.size()
    }

    /// Pixel format.
    pub fn format(&self) -> SurfaceFormat {
        self.backend.format()
    }

    /// Optional backend features.
    pub fn capabilities(&self) -> BackendCaps {
        self.backend.capabilities()
    }

    /// Returns `true` for targets created by
    /// [`Factory::create_dual_draw_target`](crate::Factory::create_dual_draw_target).
    pub fn is_dual_draw_target(&self) -> bool {
        self.capabilities().contains(BackendCaps::DUAL)
    }

    // --- State -------------------------------------------------------------

    /// Current user-to-device transform.
    pub fn transform(&self) -> Affine {
        self.transform
    }

    /// Replace the user-to-device transform. Clips already pushed keep the
    /// transform they were pushed with.
    pub fn set_transform(&mut self, transform: Affine) {
        self.record(|| DrawEvent::SetTransform(transform));
        self.transform = transform;
    }

    /// Region the caller promised to cover opaquely.
    pub fn opaque_rect(&self) -> IntRect {
        self.opaque_rect
    }

    /// Promise that `rect` will be covered with opaque pixels.
    pub fn set_opaque_rect(&mut self, rect: IntRect) {
        self.record(|| DrawEvent::SetOpaqueRect(rect));
        self.opaque_rect = rect;
        self.backend.set_opaque_rect(rect);
    }

    /// Whether subpixel anti-aliasing may be used.
    pub fn permit_subpixel_aa(&self) -> bool {
        self.permit_subpixel_aa
    }

    /// Allow or forbid subpixel anti-aliasing. When forbidden, calls that
    /// ask for it get grayscale anti-aliasing instead.
    pub fn set_permit_subpixel_aa(&mut self, permit: bool) {
        self.record(|| DrawEvent::SetPermitSubpixelAa(permit));
        self.permit_subpixel_aa = permit;
    }

    /// Values attached to this target.
    pub fn user_data(&self) -> &UserData {
        &self.user_data
    }

    /// Attach `value` under `key`. It is dropped with the target.
    pub fn add_user_data<T: core::any::Any + Send + Sync>(
        &self,
        key: &'static UserDataKey,
        value: T,
    ) {
        self.user_data.add(key, value);
    }

    /// Value attached under `key`.
    pub fn get_user_data<T: core::any::Any + Send + Sync>(
        &self,
        key: &'static UserDataKey,
    ) -> Option<Arc<T>> {
        self.user_data.get(key)
    }

    // --- Resource creation --------------------------------------------------

    /// Builder whose paths this target accepts.
    pub fn create_path_builder(&self, fill_rule: FillRule) -> PathBuilder {
        PathBuilder::new(self.backend_type(), fill_rule)
    }

    /// Stops bound to this target's backend, sorted by offset.
    pub fn create_gradient_stops(
        &self,
        stops: &[GradientStop],
        extend: ExtendMode,
    ) -> GradientStops {
        let sorted = sorted_stops(stops);
        let ramp = self.backend.prepare_gradient_stops(&sorted, extend);
        GradientStops::with_ramp(sorted, extend, self.backend_type(), ramp)
    }

    /// New target of the same backend.
    pub fn create_similar_draw_target(
        &self,
        size: IntSize,
        format: SurfaceFormat,
    ) -> Result<Self, DrawError> {
        check_size(size)?;
        Ok(Self::new(self.backend.create_similar(size, format)?))
    }

    /// New target suited to drawing shadows blurred by `sigma`.
    pub fn create_shadow_draw_target(
        &self,
        size: IntSize,
        format: SurfaceFormat,
        sigma: f32,
    ) -> Result<Self, DrawError> {
        check_size(size)?;
        Ok(Self::new(self.backend.create_shadow(size, format, sigma)?))
    }

    /// Surface holding a copy of `data`; the caller keeps its buffer.
    pub fn create_source_surface_from_data(
        &self,
        data: &[u8],
        size: IntSize,
        stride: i32,
        format: SurfaceFormat,
    ) -> Result<SourceSurfaceRef, DrawError> {
        check_size(size)?;
        self.backend
            .create_source_surface_from_data(data, size, stride, format)
    }

    /// Equivalent surface in the form this target draws fastest.
    pub fn optimize_source_surface(&self, surface: &SourceSurfaceRef) -> SourceSurfaceRef {
        self.backend.optimize_source_surface(surface)
    }

    /// Surface over a native object.
    pub fn create_source_surface_from_native_surface(
        &self,
        native: &NativeSurface,
    ) -> Result<SourceSurfaceRef, DrawError> {
        self.backend.create_source_surface_from_native_surface(native)
    }

    /// Backing store as a native object, if the backend exposes one.
    pub fn native_surface(&mut self, kind: NativeSurfaceType) -> Option<NativeSurface> {
        self.backend.native_surface(kind)
    }

    // --- Clipping -----------------------------------------------------------

    /// Intersect the clip with `path` under the current transform.
    pub fn push_clip(&mut self, path: &Path) {
        self.record(|| DrawEvent::PushClip(path.clone()));
        if path.backend_type() != self.backend_type() {
            log::warn!(
                "push_clip: path belongs to {:?}, target is {:?}; clip ignored",
                path.backend_type(),
                self.backend_type()
            );
            self.clips.push(None);
            return;
        }
        self.push_clip_entry(ClipGeometry::Path(path.clone()));
    }

    /// Intersect the clip with `rect` under the current transform.
    pub fn push_clip_rect(&mut self, rect: Rect) {
        self.record(|| DrawEvent::PushClipRect(rect));
        self.push_clip_entry(ClipGeometry::Rect(rect));
    }

    fn push_clip_entry(&mut self, geometry: ClipGeometry) {
        let clip = Clip {
            geometry,
            transform: self.transform,
        };
        self.backend.push_clip(&clip);
        self.clips.push(Some(clip));
    }

    /// Remove the most recent clip. Without a matching push this does nothing.
    pub fn pop_clip(&mut self) {
        self.record(|| DrawEvent::PopClip);
        match self.clips.pop() {
            Some(Some(_)) => self.backend.pop_clip(),
            Some(None) => {}
            None => log::debug!("pop_clip: no clip to pop; ignored"),
        }
    }

    /// Number of pushed clips.
    pub fn clip_depth(&self) -> usize {
        self.clips.len()
    }

    // --- Painting -----------------------------------------------------------

    /// Make every pixel of `rect` transparent, within the clip.
    pub fn clear_rect(&mut self, rect: Rect) {
        self.record(|| DrawEvent::ClearRect(rect));
        if !self.admit("clear_rect", &[], None) {
            return;
        }
        let options = DrawOptions::with_op(Compose::Clear);
        self.backend.fill(
            &FillGeometry::Rect(rect),
            &Pattern::Color(Color::TRANSPARENT),
            &options,
            self.transform,
        );
    }

    /// Fill `rect` with `pattern`.
    pub fn fill_rect(&mut self, rect: Rect, pattern: &Pattern, options: &DrawOptions) {
        self.record(|| DrawEvent::FillRect {
            rect,
            pattern: pattern.clone(),
            options: *options,
        });
        if !self.admit("fill_rect", &[pattern], None) {
            return;
        }
        let options = self.resolve_options(options);
        let rect = self.snap_rect(rect, &options);
        self.backend.fill(
            &FillGeometry::Rect(rect),
            &pattern.resolved(),
            &options,
            self.transform,
        );
    }

    /// Stroke the outline of `rect`.
    pub fn stroke_rect(
        &mut self,
        rect: Rect,
        pattern: &Pattern,
        stroke: &StrokeOptions,
        options: &DrawOptions,
    ) {
        self.record(|| DrawEvent::StrokeRect {
            rect,
            pattern: pattern.clone(),
            stroke: stroke.clone(),
            options: *options,
        });
        if !self.admit("stroke_rect", &[pattern], None) {
            return;
        }
        let options = self.resolve_options(options);
        self.backend.stroke(
            &rect.to_path(TOLERANCE),
            stroke,
            &pattern.resolved(),
            &options,
            self.transform,
        );
    }

    /// Stroke the segment from `start` to `end`.
    pub fn stroke_line(
        &mut self,
        start: Point,
        end: Point,
        pattern: &Pattern,
        stroke: &StrokeOptions,
        options: &DrawOptions,
    ) {
        self.record(|| DrawEvent::StrokeLine {
            start,
            end,
            pattern: pattern.clone(),
            stroke: stroke.clone(),
            options: *options,
        });
        if !self.admit("stroke_line", &[pattern], None) {
            return;
        }
        let options = self.resolve_options(options);
        let mut line = BezPath::new();
        line.move_to(start);
        line.line_to(end);
        self.backend
            .stroke(&line, stroke, &pattern.resolved(), &options, self.transform);
    }

    /// Stroke `path`.
    pub fn stroke(
        &mut self,
        path: &Path,
        pattern: &Pattern,
        stroke: &StrokeOptions,
        options: &DrawOptions,
    ) {
        self.record(|| DrawEvent::Stroke {
            path: path.clone(),
            pattern: pattern.clone(),
            stroke: stroke.clone(),
            options: *options,
        });
        if !self.admit("stroke", &[pattern], Some(path)) {
            return;
        }
        let options = self.resolve_options(options);
        self.backend.stroke(
            path.as_bez_path(),
            stroke,
            &pattern.resolved(),
            &options,
            self.transform,
        );
    }

    /// Fill `path` using its fill rule.
    pub fn fill(&mut self, path: &Path, pattern: &Pattern, options: &DrawOptions) {
        self.record(|| DrawEvent::Fill {
            path: path.clone(),
            pattern: pattern.clone(),
            options: *options,
        });
        self.fill_path("fill", path, pattern, options);
    }

    fn fill_path(
        &mut self,
        what: &'static str,
        path: &Path,
        pattern: &Pattern,
        options: &DrawOptions,
    ) {
        if !self.admit(what, &[pattern], Some(path)) {
            return;
        }
        let options = self.resolve_options(options);
        self.backend.fill(
            &FillGeometry::Path {
                path: path.as_bez_path(),
                fill_rule: path.fill_rule(),
            },
            &pattern.resolved(),
            &options,
            self.transform,
        );
    }

    /// Fill the outlines of a glyph run.
    pub fn fill_glyphs(
        &mut self,
        font: &ScaledFontRef,
        buffer: &GlyphBuffer<'_>,
        pattern: &Pattern,
        options: &DrawOptions,
    ) {
        self.record(|| DrawEvent::FillGlyphs {
            font: Arc::clone(font),
            glyphs: buffer.glyphs.to_vec(),
            pattern: pattern.clone(),
            options: *options,
        });
        if buffer.glyphs.is_empty() {
            return;
        }
        let path = font.path_for_glyphs(buffer, self);
        self.fill_path("fill_glyphs", &path, pattern, options);
    }

    /// Draw the `source` rectangle of `surface` (in surface pixels) into
    /// `dest` (in user space).
    pub fn draw_surface(
        &mut self,
        surface: &SourceSurfaceRef,
        dest: Rect,
        source: Rect,
        surface_options: &DrawSurfaceOptions,
        options: &DrawOptions,
    ) {
        self.record(|| DrawEvent::DrawSurface {
            surface: Arc::clone(surface),
            dest,
            source,
            surface_options: *surface_options,
            options: *options,
        });
        if dest.area() == 0.0 || source.area() == 0.0 {
            return;
        }
        if !self.admit_surface("draw_surface", surface) {
            return;
        }
        let options = self.resolve_options(options);
        self.backend.draw_surface(
            surface,
            dest.abs(),
            source.abs(),
            surface_options,
            &options,
            self.transform,
        );
    }

    /// Draw `surface` at device position `dest` over a blurred shadow of
    /// itself. The transform is ignored; the clip applies.
    pub fn draw_surface_with_shadow(
        &mut self,
        surface: &SourceSurfaceRef,
        dest: Point,
        color: Color,
        offset: Vec2,
        sigma: f32,
        op: CompositionOp,
    ) {
        self.record(|| DrawEvent::DrawSurfaceWithShadow {
            surface: Arc::clone(surface),
            dest,
            color,
            offset,
            sigma,
            op,
        });
        if !self.admit_surface("draw_surface_with_shadow", surface) {
            return;
        }
        self.backend
            .draw_surface_with_shadow(surface, dest, color, offset, sigma.max(0.0), op);
    }

    /// Copy pixels of `surface` to device position `dest`, ignoring
    /// transform, clip and compositing.
    pub fn copy_surface(&mut self, surface: &SourceSurfaceRef, source: IntRect, dest: IntPoint) {
        self.record(|| DrawEvent::CopySurface {
            surface: Arc::clone(surface),
            source,
            dest,
        });
        if source.is_empty() || !self.admit_surface("copy_surface", surface) {
            return;
        }
        self.backend.copy_surface(surface, source, dest);
    }

    /// Copy a device rectangle of this target to `dest`, ignoring transform
    /// and clip.
    pub fn copy_rect(&mut self, source: IntRect, dest: IntPoint) {
        self.record(|| DrawEvent::CopyRect { source, dest });
        if source.is_empty() || !self.admit("copy_rect", &[], None) {
            return;
        }
        self.backend.copy_rect(source, dest);
    }

    /// Paint `source` through the alpha of `mask`.
    pub fn mask(&mut self, source: &Pattern, mask: &Pattern, options: &DrawOptions) {
        self.record(|| DrawEvent::Mask {
            source: source.clone(),
            mask: mask.clone(),
            options: *options,
        });
        if !self.admit("mask", &[source, mask], None) {
            return;
        }
        let options = self.resolve_options(options);
        self.backend.mask(
            &source.resolved(),
            &mask.resolved(),
            &options,
            self.transform,
        );
    }

    /// Paint `source` through the alpha of `mask` placed at `offset`.
    pub fn mask_surface(
        &mut self,
        source: &Pattern,
        mask: &SourceSurfaceRef,
        offset: Point,
        options: &DrawOptions,
    ) {
        self.record(|| DrawEvent::MaskSurface {
            source: source.clone(),
            mask: Arc::clone(mask),
            offset,
            options: *options,
        });
        if !mask.is_valid() {
            log::warn!("mask_surface: mask surface is invalid; call dropped");
            return;
        }
        if !self.admit("mask_surface", &[source], None) {
            return;
        }
        let options = self.resolve_options(options);
        self.backend
            .mask_surface(&source.resolved(), mask, offset, &options, self.transform);
    }

    // --- Output -------------------------------------------------------------

    /// Immutable copy of the current contents.
    ///
    /// Repeated calls without an intervening draw return the same surface.
    /// Returns `None` while the target is locked.
    pub fn snapshot(&mut self) -> Option<SourceSurfaceRef> {
        if self.lock.is_some() {
            log::warn!("snapshot: draw target is locked");
            return None;
        }
        if let Some(s) = &self.snapshot {
            return Some(Arc::clone(s));
        }
        let snapshot = self.backend.snapshot()?;
        self.snapshot = Some(Arc::clone(&snapshot));
        Some(snapshot)
    }

    /// Complete pending work.
    pub fn flush(&mut self) {
        self.record(|| DrawEvent::Flush);
        self.backend.flush();
    }

    /// Borrow the live pixel buffer. While locked, paint calls are dropped.
    ///
    /// Returns `None` if the backend has no CPU buffer or the target is
    /// already locked.
    pub fn lock_bits(&mut self) -> Option<LockedBits> {
        if self.lock.is_some() {
            log::debug!("lock_bits: already locked");
            return None;
        }
        let access = self.backend.lock_bits()?;
        self.next_lock += 1;
        self.lock = Some(self.next_lock);
        self.snapshot = None;
        Some(LockedBits {
            pixels: access.pixels,
            size: access.size,
            stride: access.stride,
            format: access.format,
            token: self.next_lock,
        })
    }

    /// End the lock started by [`lock_bits`](Self::lock_bits).
    ///
    /// # Panics
    ///
    /// Panics if `bits` did not come from the outstanding lock of this target.
    pub fn release_bits(&mut self, bits: LockedBits) {
        assert_eq!(
            self.lock,
            Some(bits.token),
            "release_bits: bits do not belong to the outstanding lock"
        );
        self.lock = None;
        self.snapshot = None;
        self.backend.release_bits();
    }

    /// Returns `true` between `lock_bits` and `release_bits`.
    pub fn is_locked(&self) -> bool {
        self.lock.is_some()
    }

    // --- Helpers ------------------------------------------------------------

    fn record(&self, event: impl FnOnce() -> DrawEvent) {
        if let Some(recorder) = &self.recorder {
            recorder.record_event(event());
        }
    }

    /// Validate a paint call and, if it may proceed, invalidate the snapshot.
    fn admit(&mut self, what: &'static str, patterns: &[&Pattern], path: Option<&Path>) -> bool {
        if self.lock.is_some() {
            log::warn!("{what}: draw target is locked; call dropped");
            return false;
        }
        let backend = self.backend_type();
        if let Some(path) = path {
            if path.backend_type() != backend {
                log::warn!(
                    "{what}: path belongs to {:?}, target is {backend:?}; call dropped",
                    path.backend_type()
                );
                return false;
            }
        }
        for pattern in patterns {
            if let Some(stops) = pattern.stops() {
                if stops.backend_type() != backend {
                    log::warn!(
                        "{what}: stops belong to {:?}, target is {backend:?}; call dropped",
                        stops.backend_type()
                    );
                    return false;
                }
            }
            if let Some(surface) = pattern.surface() {
                if !surface.is_valid() {
                    log::warn!("{what}: pattern surface is no longer valid; call dropped");
                    return false;
                }
            }
        }
        self.snapshot = None;
        true
    }

    fn admit_surface(&mut self, what: &'static str, surface: &SourceSurfaceRef) -> bool {
        if !surface.is_valid() {
            log::warn!("{what}: surface is no longer valid; call dropped");
            return false;
        }
        self.admit(what, &[], None)
    }

    fn resolve_options(&self, options: &DrawOptions) -> DrawOptions {
        let mut options = *options;
        options.alpha = if options.alpha.is_nan() {
            0.0
        } else {
            options.alpha.clamp(0.0, 1.0)
        };
        if options.antialias_mode == AntialiasMode::Subpixel && !self.permit_subpixel_aa {
            options.antialias_mode = AntialiasMode::Gray;
        }
        options
    }

    /// Under pixel snapping and an axis-aligned transform, move the edges of
    /// `rect` onto whole device pixels.
    fn snap_rect(&self, rect: Rect, options: &DrawOptions) -> Rect {
        if options.snapping != Snapping::Pixel {
            return rect;
        }
        let [a, b, c, d, ..] = self.transform.as_coeffs();
        if b != 0.0 || c != 0.0 || a == 0.0 || d == 0.0 {
            return rect;
        }
        let device = self.transform.transform_rect_bbox(rect).round();
        self.transform.inverse().transform_rect_bbox(device)
    }
}

// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Understory Draw Reference Backend.
//!
//! This crate provides [`RefBackend`], a [`DrawBackend`] that records every
//! primitive call it receives together with the backend state at that moment.
//!
//! It is intentionally *not* a renderer:
//! - It does **not** rasterize; snapshots return whatever bytes the backing
//!   store holds, which only changes through `lock_bits` or caller memory.
//! - It is intended for tests that want to assert on what a
//!   [`DrawTarget`](understory_draw::DrawTarget) forwards to its backend, and
//!   on the transform and clip depth each call saw.
//!
//! Events go to a shared [`EventLog`], so they stay observable after the
//! backend has been moved into a target.
//!
//! ```
//! use understory_draw::{BackendType, DrawOptions, Factory, IntSize, Pattern, SurfaceFormat};
//! use understory_draw_ref::{Call, EventLog, RefProvider};
//!
//! let log = EventLog::default();
//! let factory = Factory::new().with_backend(RefProvider::with_log(log.clone()));
//! let mut target = factory
//!     .create_draw_target(BackendType::Reference, IntSize::new(8, 8), SurfaceFormat::B8G8R8A8)
//!     .unwrap();
//! target.fill_rect(
//!     kurbo::Rect::new(0.0, 0.0, 4.0, 4.0),
//!     &Pattern::Color(peniko::Color::WHITE),
//!     &DrawOptions::default(),
//! );
//! assert!(matches!(log.events()[0].call, Call::Fill { .. }));
//! ```

use std::sync::{Arc, Mutex, MutexGuard};

use kurbo::{Affine, BezPath, Point, Rect, Vec2};
use peniko::Color;
use understory_draw::{
    BackendCaps, BackendProvider, BackendType, BitsAccess, Clip, CompositionOp,
    DataSourceSurface, DeviceHandle, DrawBackend, DrawError, DrawOptions, DrawSurfaceOptions,
    FillGeometry, FillRule, IntPoint, IntRect, IntSize, Pattern, PixelLayout, SharedPixels,
    SourceSurfaceRef, StrokeOptions, SurfaceFormat, SurfaceType,
};

/// Backend state at the time a call was applied.
#[derive(Clone, Debug)]
pub struct StateSnapshot {
    /// User-to-device transform the call was issued under. Calls that
    /// ignore the transform record identity.
    pub transform: Affine,
    /// Number of clips in effect after the call.
    pub clip_depth: u32,
}

impl Default for StateSnapshot {
    fn default() -> Self {
        Self {
            transform: Affine::IDENTITY,
            clip_depth: 0,
        }
    }
}

/// Shape passed to a fill.
#[derive(Clone, Debug, PartialEq)]
pub enum FillShape {
    /// Axis-aligned rectangle in user space.
    Rect(Rect),
    /// Path in user space with its fill rule.
    Path(BezPath, FillRule),
}

/// A primitive call received by the backend.
#[derive(Clone, Debug)]
pub enum Call {
    /// [`DrawBackend::fill`].
    Fill {
        /// Geometry that was filled.
        shape: FillShape,
        /// Paint source.
        pattern: Pattern,
        /// Resolved draw options.
        options: DrawOptions,
    },
    /// [`DrawBackend::stroke`].
    Stroke {
        /// Stroked path.
        path: BezPath,
        /// Stroke style.
        stroke: StrokeOptions,
        /// Paint source.
        pattern: Pattern,
        /// Resolved draw options.
        options: DrawOptions,
    },
    /// [`DrawBackend::draw_surface`].
    DrawSurface {
        /// Drawn surface.
        surface: SourceSurfaceRef,
        /// Destination in user space.
        dest: Rect,
        /// Source in surface pixels.
        source: Rect,
        /// Sampling options.
        surface_options: DrawSurfaceOptions,
        /// Resolved draw options.
        options: DrawOptions,
    },
    /// [`DrawBackend::draw_surface_with_shadow`].
    DrawSurfaceWithShadow {
        /// Drawn surface.
        surface: SourceSurfaceRef,
        /// Device position.
        dest: Point,
        /// Shadow tint.
        color: Color,
        /// Shadow offset.
        offset: Vec2,
        /// Blur standard deviation.
        sigma: f32,
        /// Composition operator.
        op: CompositionOp,
    },
    /// [`DrawBackend::copy_surface`].
    CopySurface {
        /// Copied surface.
        surface: SourceSurfaceRef,
        /// Source rectangle in surface pixels.
        source: IntRect,
        /// Device destination.
        dest: IntPoint,
    },
    /// [`DrawBackend::copy_rect`].
    CopyRect {
        /// Source rectangle in device pixels.
        source: IntRect,
        /// Device destination.
        dest: IntPoint,
    },
    /// [`DrawBackend::mask`].
    Mask {
        /// Paint source.
        source: Pattern,
        /// Mask source.
        mask: Pattern,
        /// Resolved draw options.
        options: DrawOptions,
    },
    /// [`DrawBackend::mask_surface`].
    MaskSurface {
        /// Paint source.
        source: Pattern,
        /// Mask surface.
        mask: SourceSurfaceRef,
        /// Mask placement in user space.
        offset: Point,
        /// Resolved draw options.
        options: DrawOptions,
    },
    /// [`DrawBackend::push_clip`].
    PushClip(Clip),
    /// [`DrawBackend::pop_clip`].
    PopClip,
    /// [`DrawBackend::snapshot`].
    Snapshot,
    /// [`DrawBackend::flush`].
    Flush,
    /// [`DrawBackend::lock_bits`].
    LockBits,
    /// [`DrawBackend::release_bits`].
    ReleaseBits,
    /// [`DrawBackend::set_opaque_rect`].
    SetOpaqueRect(IntRect),
}

/// Event recorded by the reference backend.
#[derive(Clone, Debug)]
pub struct Event {
    /// Call that was applied.
    pub call: Call,
    /// State at the time of the call.
    pub state: StateSnapshot,
}

/// Shared, append-only list of [`Event`]s.
///
/// Clones refer to the same list.
#[derive(Clone, Debug, Default)]
pub struct EventLog(Arc<Mutex<Vec<Event>>>);

impl EventLog {
    fn lock(&self) -> MutexGuard<'_, Vec<Event>> {
        self.0.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn push(&self, event: Event) {
        self.lock().push(event);
    }

    /// Copy of the recorded events, oldest first.
    pub fn events(&self) -> Vec<Event> {
        self.lock().clone()
    }

    /// Only the calls, oldest first.
    pub fn calls(&self) -> Vec<Call> {
        self.lock().iter().map(|e| e.call.clone()).collect()
    }

    /// Number of recorded events.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Forget all recorded events.
    pub fn clear(&self) {
        self.lock().clear();
    }
}

/// Reference implementation of the draw backend.
///
/// This backend:
/// - Records a [`Call`] with a [`StateSnapshot`] for every primitive,
/// - Tracks the clip depth,
/// - Owns (or wraps) a pixel buffer so that `lock_bits` and snapshots work.
#[derive(Debug)]
pub struct RefBackend {
    pixels: SharedPixels,
    layout: PixelLayout,
    log: EventLog,
    clip_depth: u32,
    device: Option<DeviceHandle>,
}

impl RefBackend {
    /// Backend over zeroed storage, recording into a fresh log.
    pub fn new(size: IntSize, format: SurfaceFormat) -> Result<Self, DrawError> {
        let layout = PixelLayout::packed(size, format)?;
        Ok(Self {
            pixels: SharedPixels::zeroed(layout.required_len())?,
            layout,
            log: EventLog::default(),
            clip_depth: 0,
            device: None,
        })
    }

    /// Backend over caller memory described by `stride`.
    pub fn for_data(
        pixels: SharedPixels,
        size: IntSize,
        stride: i32,
        format: SurfaceFormat,
    ) -> Result<Self, DrawError> {
        let layout = PixelLayout::new(size, format, stride, pixels.len())?;
        Ok(Self {
            pixels,
            layout,
            log: EventLog::default(),
            clip_depth: 0,
            device: None,
        })
    }

    /// Record into `log` instead.
    pub fn with_log(mut self, log: EventLog) -> Self {
        self.log = log;
        self
    }

    /// Bind snapshots to `device`.
    pub fn with_device(mut self, device: DeviceHandle) -> Self {
        self.device = Some(device);
        self
    }

    /// The log this backend records into.
    pub fn log(&self) -> &EventLog {
        &self.log
    }

    fn record(&self, call: Call, transform: Affine) {
        self.log.push(Event {
            call,
            state: StateSnapshot {
                transform,
                clip_depth: self.clip_depth,
            },
        });
    }
}

impl DrawBackend for RefBackend {
    fn backend_type(&self) -> BackendType {
        BackendType::Reference
    }

    fn size(&self) -> IntSize {
        self.layout.size()
    }

    fn format(&self) -> SurfaceFormat {
        self.layout.format()
    }

    fn capabilities(&self) -> BackendCaps {
        BackendCaps::LOCK_BITS | BackendCaps::DATA_TARGETS
    }

    fn fill(
        &mut self,
        geometry: &FillGeometry<'_>,
        pattern: &Pattern,
        options: &DrawOptions,
        transform: Affine,
    ) {
        let shape = match geometry {
            FillGeometry::Rect(r) => FillShape::Rect(*r),
            FillGeometry::Path { path, fill_rule } => FillShape::Path((*path).clone(), *fill_rule),
        };
        self.record(
            Call::Fill {
                shape,
                pattern: pattern.clone(),
                options: *options,
            },
            transform,
        );
    }

    fn stroke(
        &mut self,
        path: &BezPath,
        stroke: &StrokeOptions,
        pattern: &Pattern,
        options: &DrawOptions,
        transform: Affine,
    ) {
        self.record(
            Call::Stroke {
                path: path.clone(),
                stroke: stroke.clone(),
                pattern: pattern.clone(),
                options: *options,
            },
            transform,
        );
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
        self.record(
            Call::DrawSurface {
                surface: Arc::clone(surface),
                dest,
                source,
                surface_options: *surface_options,
                options: *options,
            },
            transform,
        );
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
        self.record(
            Call::DrawSurfaceWithShadow {
                surface: Arc::clone(surface),
                dest,
                color,
                offset,
                sigma,
                op,
            },
            Affine::IDENTITY,
        );
    }

    fn copy_surface(&mut self, surface: &SourceSurfaceRef, source: IntRect, dest: IntPoint) {
        self.record(
            Call::CopySurface {
                surface: Arc::clone(surface),
                source,
                dest,
            },
            Affine::IDENTITY,
        );
    }

    fn copy_rect(&mut self, source: IntRect, dest: IntPoint) {
        self.record(Call::CopyRect { source, dest }, Affine::IDENTITY);
    }

    fn mask(&mut self, source: &Pattern, mask: &Pattern, options: &DrawOptions, transform: Affine) {
        self.record(
            Call::Mask {
                source: source.clone(),
                mask: mask.clone(),
                options: *options,
            },
            transform,
        );
    }

    fn mask_surface(
        &mut self,
        source: &Pattern,
        mask: &SourceSurfaceRef,
        offset: Point,
        options: &DrawOptions,
        transform: Affine,
    ) {
        self.record(
            Call::MaskSurface {
                source: source.clone(),
                mask: Arc::clone(mask),
                offset,
                options: *options,
            },
            transform,
        );
    }

    fn push_clip(&mut self, clip: &Clip) {
        self.clip_depth += 1;
        self.record(Call::PushClip(clip.clone()), clip.transform);
    }

    fn pop_clip(&mut self) {
        self.clip_depth = self.clip_depth.saturating_sub(1);
        self.record(Call::PopClip, Affine::IDENTITY);
    }

    fn snapshot(&mut self) -> Option<SourceSurfaceRef> {
        self.record(Call::Snapshot, Affine::IDENTITY);
        let size = self.layout.size();
        let bytes = self.pixels.read();
        let mut out = Vec::with_capacity(self.layout.row_bytes() * size.height as usize);
        for y in 0..size.height {
            let start = self.layout.row_offset(y);
            out.extend_from_slice(&bytes[start..start + self.layout.row_bytes()]);
        }
        let stride = i32::try_from(self.layout.row_bytes()).ok()?;
        DataSourceSurface::from_backend(
            out,
            size,
            stride,
            self.layout.format(),
            SurfaceType::Reference,
            self.device.clone(),
        )
        .ok()
        .map(DataSourceSurface::into_source)
    }

    fn flush(&mut self) {
        self.record(Call::Flush, Affine::IDENTITY);
    }

    fn lock_bits(&mut self) -> Option<BitsAccess> {
        self.record(Call::LockBits, Affine::IDENTITY);
        Some(BitsAccess {
            pixels: self.pixels.clone(),
            size: self.layout.size(),
            stride: self.layout.stride(),
            format: self.layout.format(),
        })
    }

    fn release_bits(&mut self) {
        self.record(Call::ReleaseBits, Affine::IDENTITY);
    }

    /// Similar backends record into the same log.
    fn create_similar(
        &self,
        size: IntSize,
        format: SurfaceFormat,
    ) -> Result<Box<dyn DrawBackend>, DrawError> {
        let mut backend = Self::new(size, format)?.with_log(self.log.clone());
        backend.device = self.device.clone();
        Ok(Box::new(backend))
    }

    fn set_opaque_rect(&mut self, rect: IntRect) {
        self.record(Call::SetOpaqueRect(rect), Affine::IDENTITY);
    }
}

/// Creates [`RefBackend`]s that all record into one [`EventLog`].
#[derive(Clone, Debug, Default)]
pub struct RefProvider {
    log: EventLog,
}

impl RefProvider {
    /// Provider whose backends record into `log`.
    pub fn with_log(log: EventLog) -> Self {
        Self { log }
    }

    /// The shared log.
    pub fn log(&self) -> &EventLog {
        &self.log
    }
}

impl BackendProvider for RefProvider {
    fn backend_type(&self) -> BackendType {
        BackendType::Reference
    }

    fn create_backend(
        &self,
        size: IntSize,
        format: SurfaceFormat,
        device: Option<&DeviceHandle>,
    ) -> Result<Box<dyn DrawBackend>, DrawError> {
        let mut backend = RefBackend::new(size, format)?.with_log(self.log.clone());
        if let Some(device) = device {
            backend = backend.with_device(device.clone());
        }
        Ok(Box::new(backend))
    }

    fn create_backend_for_data(
        &self,
        pixels: SharedPixels,
        size: IntSize,
        stride: i32,
        format: SurfaceFormat,
    ) -> Result<Box<dyn DrawBackend>, DrawError> {
        Ok(Box::new(
            RefBackend::for_data(pixels, size, stride, format)?.with_log(self.log.clone()),
        ))
    }
}

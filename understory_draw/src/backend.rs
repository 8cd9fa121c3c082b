// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The seam between [`DrawTarget`](crate::DrawTarget) and rendering technologies.
//!
//! A [`DrawBackend`] receives primitive calls that the target has already
//! validated: backend tags match, patterns are resolved, the target is not
//! locked and clip pops are balanced. Backends only have to produce pixels.
//!
//! Provided methods cover behavior that every backend shares unless it can do
//! better, such as [`DrawBackend::copy_rect`] going through a snapshot and
//! [`DrawBackend::draw_surface_with_shadow`] going through a blurred tint.

use core::any::Any;
use core::fmt;
use std::borrow::Cow;
use std::sync::Arc;

use kurbo::{Affine, BezPath, Point, Rect, Shape, Vec2};
use peniko::Color;

use crate::path::TOLERANCE;
use crate::{
    CompositionOp, DataSourceSurface, DrawError, DrawOptions, DrawSurfaceOptions, ExtendMode,
    FillRule, GradientStop, IntPoint, IntRect, IntSize, Path, Pattern, SharedPixels,
    SourceSurfaceRef, StrokeOptions, SurfaceFormat, filter,
};
use crate::{BackendType, SamplingBounds};

bitflags::bitflags! {
    /// Optional features a backend implements.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct BackendCaps: u32 {
        /// `lock_bits` hands out the live pixel buffer.
        const LOCK_BITS          = 0b0000_0001;
        /// `native_surface` exposes the backing store.
        const NATIVE_SURFACE     = 0b0000_0010;
        /// Targets can render into caller memory.
        const DATA_TARGETS       = 0b0000_0100;
        /// Gradient stops are preprocessed at creation.
        const PREPARED_GRADIENTS = 0b0000_1000;
        /// Every call is forwarded to two backends.
        const DUAL               = 0b0001_0000;
    }
}

/// Geometry of a fill call.
#[derive(Copy, Clone, Debug)]
pub enum FillGeometry<'a> {
    /// Axis-aligned rectangle in user space.
    Rect(Rect),
    /// Arbitrary path in user space.
    Path {
        /// Path elements.
        path: &'a BezPath,
        /// Fill rule.
        fill_rule: FillRule,
    },
}

impl FillGeometry<'_> {
    /// Geometry as a path.
    pub fn to_bez_path(&self) -> Cow<'_, BezPath> {
        match self {
            Self::Rect(r) => Cow::Owned(r.to_path(TOLERANCE)),
            Self::Path { path, .. } => Cow::Borrowed(*path),
        }
    }

    /// Fill rule; rectangles fill non-zero.
    pub fn fill_rule(&self) -> FillRule {
        match self {
            Self::Rect(_) => FillRule::NonZero,
            Self::Path { fill_rule, .. } => *fill_rule,
        }
    }
}

/// Shape of a clip entry.
#[derive(Clone, Debug)]
pub enum ClipGeometry {
    /// Rectangle in user space.
    Rect(Rect),
    /// Path in user space, filled with its own fill rule.
    Path(Path),
}

/// A clip region together with the transform that was current when it was
/// pushed.
#[derive(Clone, Debug)]
pub struct Clip {
    /// Shape of the clip.
    pub geometry: ClipGeometry,
    /// User space to device space at push time.
    pub transform: Affine,
}

impl Clip {
    /// Fill rule used to decide coverage.
    pub fn fill_rule(&self) -> FillRule {
        match &self.geometry {
            ClipGeometry::Rect(_) => FillRule::NonZero,
            ClipGeometry::Path(p) => p.fill_rule(),
        }
    }

    /// Clip shape in user space.
    pub fn user_path(&self) -> BezPath {
        match &self.geometry {
            ClipGeometry::Rect(r) => r.to_path(TOLERANCE),
            ClipGeometry::Path(p) => p.as_bez_path().clone(),
        }
    }

    /// Clip shape in device space.
    pub fn device_path(&self) -> BezPath {
        self.transform * &self.user_path()
    }

    /// Device rectangle, when the clip is a rectangle under an axis-aligned
    /// transform.
    pub fn device_rect(&self) -> Option<Rect> {
        let ClipGeometry::Rect(r) = &self.geometry else {
            return None;
        };
        let [_, b, c, ..] = self.transform.as_coeffs();
        (b == 0.0 && c == 0.0).then(|| self.transform.transform_rect_bbox(*r))
    }
}

/// Live pixel buffer handed out by [`DrawBackend::lock_bits`].
#[derive(Clone, Debug)]
pub struct BitsAccess {
    /// Backing store of the target.
    pub pixels: SharedPixels,
    /// Pixel dimensions.
    pub size: IntSize,
    /// Signed distance between rows in bytes.
    pub stride: i32,
    /// Pixel format.
    pub format: SurfaceFormat,
}

/// Kind of a [`NativeSurface`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum NativeSurfaceType {
    /// A [`SharedPixels`] buffer with the described layout.
    CpuPixels,
    /// A backend-private object.
    Backend(BackendType),
}

/// Platform or backend surface object exchanged with foreign code.
#[derive(Clone)]
pub struct NativeSurface {
    /// Kind of object in `handle`.
    pub surface_type: NativeSurfaceType,
    /// Pixel format.
    pub format: SurfaceFormat,
    /// Pixel dimensions.
    pub size: IntSize,
    /// Row stride in bytes, for CPU pixels.
    pub stride: i32,
    /// The object itself.
    pub handle: Arc<dyn Any + Send + Sync>,
}

impl fmt::Debug for NativeSurface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeSurface")
            .field("surface_type", &self.surface_type)
            .field("format", &self.format)
            .field("size", &self.size)
            .field("stride", &self.stride)
            .finish_non_exhaustive()
    }
}

impl NativeSurface {
    /// Describe a CPU pixel buffer.
    pub fn cpu_pixels(
        pixels: SharedPixels,
        size: IntSize,
        stride: i32,
        format: SurfaceFormat,
    ) -> Self {
        Self {
            surface_type: NativeSurfaceType::CpuPixels,
            format,
            size,
            stride,
            handle: Arc::new(pixels),
        }
    }

    /// The pixel buffer, for CPU pixel surfaces.
    pub fn as_cpu_pixels(&self) -> Option<&SharedPixels> {
        match self.surface_type {
            NativeSurfaceType::CpuPixels => self.handle.downcast_ref(),
            NativeSurfaceType::Backend(_) => None,
        }
    }
}

/// A rendering technology behind a [`DrawTarget`](crate::DrawTarget).
///
/// Paint methods receive the current user-to-device transform explicitly; the
/// clip stack is managed through [`push_clip`](Self::push_clip) and
/// [`pop_clip`](Self::pop_clip), which are always balanced.
pub trait DrawBackend: fmt::Debug {
    /// Backend tag.
    fn backend_type(&self) -> BackendType;

    /// Pixel dimensions.
    fn size(&self) -> IntSize;

    /// Pixel format.
    fn format(&self) -> SurfaceFormat;

    /// Optional features.
    fn capabilities(&self) -> BackendCaps {
        BackendCaps::empty()
    }

    /// Fill `geometry` with `pattern`.
    fn fill(
        &mut self,
        geometry: &FillGeometry<'_>,
        pattern: &Pattern,
        options: &DrawOptions,
        transform: Affine,
    );

    /// Stroke `path` with `pattern`.
    fn stroke(
        &mut self,
        path: &BezPath,
        stroke: &StrokeOptions,
        pattern: &Pattern,
        options: &DrawOptions,
        transform: Affine,
    );

    /// Draw the `source` part of `surface` into `dest`, both in user space.
    fn draw_surface(
        &mut self,
        surface: &SourceSurfaceRef,
        dest: Rect,
        source: Rect,
        surface_options: &DrawSurfaceOptions,
        options: &DrawOptions,
        transform: Affine,
    );

    /// Draw `surface` at device position `dest` with a blurred shadow.
    ///
    /// The shadow is the surface's alpha tinted with `color`, blurred by
    /// `sigma` and drawn first at `dest + offset`; it is clipped to the
    /// surface's size. Both draws ignore the transform and honor the clip.
    fn draw_surface_with_shadow(
        &mut self,
        surface: &SourceSurfaceRef,
        dest: Point,
        color: Color,
        offset: Vec2,
        sigma: f32,
        op: CompositionOp,
    ) {
        let Some(data) = surface.data_surface() else {
            log::warn!("draw_surface_with_shadow: surface has no pixel data");
            return;
        };
        let shadow = match filter::shadow_surface(&data, color, sigma) {
            Ok(s) => s.into_source(),
            Err(e) => {
                log::warn!("draw_surface_with_shadow: {e}");
                return;
            }
        };
        let size = data.layout().size();
        let source = Rect::new(0.0, 0.0, f64::from(size.width), f64::from(size.height));
        let options = DrawOptions {
            composition_op: op,
            ..DrawOptions::default()
        };
        let surface_options = DrawSurfaceOptions {
            sampling_bounds: SamplingBounds::Bounded,
            ..DrawSurfaceOptions::default()
        };
        let (sampling, device) = (&surface_options, Affine::IDENTITY);
        let shadow_at = source + (dest + offset).to_vec2();
        self.draw_surface(&shadow, shadow_at, source, sampling, &options, device);
        let surface_at = source + dest.to_vec2();
        self.draw_surface(surface, surface_at, source, sampling, &options, device);
    }

    /// Copy device pixels of `surface` into this target, ignoring transform,
    /// clip and compositing.
    fn copy_surface(&mut self, surface: &SourceSurfaceRef, source: IntRect, dest: IntPoint);

    /// Copy a device rectangle of this target to `dest`, ignoring transform
    /// and clip. Overlapping source and destination behave as if the source
    /// were copied out first.
    fn copy_rect(&mut self, source: IntRect, dest: IntPoint) {
        if let Some(snapshot) = self.snapshot() {
            self.copy_surface(&snapshot, source, dest);
        }
    }

    /// Paint `source` with coverage taken from the alpha of `mask`.
    fn mask(&mut self, source: &Pattern, mask: &Pattern, options: &DrawOptions, transform: Affine);

    /// Paint `source` with coverage from the alpha of `mask` placed at
    /// `offset` in user space. Nothing is painted outside the mask surface.
    fn mask_surface(
        &mut self,
        source: &Pattern,
        mask: &SourceSurfaceRef,
        offset: Point,
        options: &DrawOptions,
        transform: Affine,
    );

    /// Intersect the clip with `clip`.
    fn push_clip(&mut self, clip: &Clip);

    /// Undo the matching [`push_clip`](Self::push_clip).
    fn pop_clip(&mut self);

    /// Immutable copy of the current contents.
    fn snapshot(&mut self) -> Option<SourceSurfaceRef>;

    /// Complete pending work.
    fn flush(&mut self);

    /// Hand out the live pixel buffer, if the backend has one.
    fn lock_bits(&mut self) -> Option<BitsAccess> {
        None
    }

    /// The caller is done with the buffer from [`lock_bits`](Self::lock_bits).
    fn release_bits(&mut self) {}

    /// New backend of the same kind.
    fn create_similar(
        &self,
        size: IntSize,
        format: SurfaceFormat,
    ) -> Result<Box<dyn DrawBackend>, DrawError>;

    /// New backend suited to rendering shadows blurred by `sigma`.
    fn create_shadow(
        &self,
        size: IntSize,
        format: SurfaceFormat,
        sigma: f32,
    ) -> Result<Box<dyn DrawBackend>, DrawError> {
        let _ = sigma;
        self.create_similar(size, format)
    }

    /// Preprocess sorted gradient stops. The result is stored with the stops
    /// and can be retrieved with [`GradientStops::ramp`](crate::GradientStops::ramp).
    fn prepare_gradient_stops(
        &self,
        stops: &[GradientStop],
        extend: ExtendMode,
    ) -> Option<Arc<dyn Any + Send + Sync>> {
        let _ = (stops, extend);
        None
    }

    /// Surface holding a copy of caller pixels.
    fn create_source_surface_from_data(
        &self,
        data: &[u8],
        size: IntSize,
        stride: i32,
        format: SurfaceFormat,
    ) -> Result<SourceSurfaceRef, DrawError> {
        Ok(DataSourceSurface::copy_from_slice(data, size, stride, format)?.into_source())
    }

    /// Equivalent surface in the form this backend draws fastest.
    fn optimize_source_surface(&self, surface: &SourceSurfaceRef) -> SourceSurfaceRef {
        Arc::clone(surface)
    }

    /// Surface over a native object.
    fn create_source_surface_from_native_surface(
        &self,
        native: &NativeSurface,
    ) -> Result<SourceSurfaceRef, DrawError> {
        let Some(pixels) = native.as_cpu_pixels() else {
            return Err(DrawError::Unsupported("native surface kind"));
        };
        Ok(
            DataSourceSurface::wrapping(pixels.clone(), native.size, native.stride, native.format)?
                .into_source(),
        )
    }

    /// Backing store as a native object of the requested kind.
    fn native_surface(&mut self, kind: NativeSurfaceType) -> Option<NativeSurface> {
        let _ = kind;
        None
    }

    /// Region the caller promises to cover with opaque pixels.
    fn set_opaque_rect(&mut self, rect: IntRect) {
        let _ = rect;
    }
}

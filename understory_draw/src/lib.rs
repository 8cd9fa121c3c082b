// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Understory Draw: backend-agnostic immediate-mode 2D drawing.
//!
//! Callers issue fills, strokes, image draws, glyph runs, masks and clips
//! against a [`DrawTarget`], and interchangeable backends turn those calls
//! into pixels.
//!
//! # Position in the stack
//!
//! - **Callers**: layout, text shaping and compositing code that knows what
//!   to draw but not how pixels are produced.
//! - **This crate**: the drawing vocabulary ([`Path`], [`Pattern`],
//!   [`GradientStops`], [`SourceSurface`], [`ScaledFont`]), the
//!   [`DrawTarget`] state machine and the [`DrawBackend`] seam.
//! - **Backends**: separate crates implementing [`DrawBackend`] and
//!   registered with a [`Factory`] through a [`BackendProvider`], such as
//!   `understory_draw_raster` or `understory_draw_vello_cpu`.
//!
//! # Core concepts
//!
//! - **Targets** hold the transform, a stack of clips captured with the
//!   transform current at push time, a lock for direct pixel access and a
//!   cached snapshot that any mutating call invalidates.
//! - **Backend binding**: paths and gradient stops carry the [`BackendType`]
//!   of the target that created their builder. Using them with a target of
//!   another backend drops the call.
//! - **Failure model**: creation returns [`DrawError`]. Paint calls return
//!   nothing; an invalid paint call is dropped whole with a `log::warn!` and
//!   the target is left exactly as it was. Writing to a finished
//!   [`PathBuilder`] and releasing foreign [`LockedBits`] are programming
//!   errors and panic.
//! - **Recording**: [`Factory::create_recording_draw_target`] reports every
//!   call to a [`DrawEventRecorder`]; [`replay`] issues the events again.
//!
//! # Example
//!
//! ```ignore
//! use kurbo::Rect;
//! use peniko::Color;
//! use understory_draw::*;
//!
//! let factory = Factory::new().with_backend(understory_draw_raster::RasterProvider::default());
//! let mut dt = factory
//!     .create_draw_target(BackendType::Raster, IntSize::new(64, 64), SurfaceFormat::B8G8R8A8)
//!     .unwrap();
//! dt.push_clip_rect(Rect::new(8.0, 8.0, 56.0, 56.0));
//! dt.fill_rect(
//!     Rect::new(0.0, 0.0, 64.0, 64.0),
//!     &Pattern::Color(Color::from_rgba8(255, 0, 0, 255)),
//!     &DrawOptions::default(),
//! );
//! dt.pop_clip();
//! let snapshot = dt.snapshot().unwrap();
//! ```

mod backend;
mod dual;
mod error;
mod factory;
pub mod filter;
mod font;
mod options;
mod path;
mod pattern;
pub mod pixel;
mod recording;
mod surface;
mod target;
mod types;
mod user_data;

pub use peniko::{BlendMode, Compose, Fill as FillRule, Mix};

pub use backend::{
    BackendCaps, BitsAccess, Clip, ClipGeometry, DrawBackend, FillGeometry, NativeSurface,
    NativeSurfaceType,
};
pub use error::DrawError;
pub use factory::{BackendProvider, Factory, FontProvider};
pub use font::{FontType, Glyph, GlyphBuffer, NativeFont, ScaledFont, ScaledFontRef};
pub use options::{
    AntialiasMode, CapStyle, CompositionOp, DrawOptions, DrawSurfaceOptions, Filter, JoinStyle,
    SamplingBounds, Snapping, StrokeOptions,
};
pub use path::{
    Path, PathBuilder, PathSink, TOLERANCE, closed_subpaths, normalize_arc_angles, stroke_outline,
};
pub use pattern::{
    ExtendMode, GradientStop, GradientStops, LinearGradientPattern, Pattern, PatternType,
    RadialGradientPattern, SurfacePattern, apply_extend,
};
pub use recording::{DrawEvent, DrawEventRecorder, MemoryRecorder, replay};
pub use surface::{
    DataSourceSurface, DataSurfaceMap, DataSurfaceMapMut, DeviceHandle, MAX_SURFACE_DIMENSION,
    PixelLayout, PixelsRead, PixelsWrite, SharedPixels, SourceSurface, SourceSurfaceRef,
};
pub use target::{DrawTarget, LockedBits, SharedDrawTarget};
pub use types::{BackendType, IntPoint, IntRect, IntSize, SurfaceFormat, SurfaceType};
pub use user_data::{UserData, UserDataKey};

// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Capture of the command stream issued to a draw target.
//!
//! A recording target forwards every call to its inner target and also
//! reports it to a [`DrawEventRecorder`]. Events hold the call arguments by
//! value, so a recording can be replayed later with [`replay`].
//!
//! Like any other call, replayed paths and gradient stops must belong to the
//! replay target's backend; calls that reference another backend are dropped.

use core::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use kurbo::{Affine, Point, Rect, Vec2};
use peniko::Color;

use crate::{
    CompositionOp, DrawOptions, DrawSurfaceOptions, DrawTarget, Glyph, GlyphBuffer, IntPoint,
    IntRect, Path, Pattern, ScaledFontRef, SourceSurfaceRef, StrokeOptions,
};

/// One call issued to a draw target.
#[derive(Clone, Debug)]
pub enum DrawEvent {
    /// `set_transform`.
    SetTransform(Affine),
    /// `push_clip`.
    PushClip(Path),
    /// `push_clip_rect`.
    PushClipRect(Rect),
    /// `pop_clip`.
    PopClip,
    /// `set_opaque_rect`.
    SetOpaqueRect(IntRect),
    /// `set_permit_subpixel_aa`.
    SetPermitSubpixelAa(bool),
    /// `clear_rect`.
    ClearRect(Rect),
    /// `fill_rect`.
    FillRect {
        /// Rectangle in user space.
        rect: Rect,
        /// Paint source.
        pattern: Pattern,
        /// Draw options.
        options: DrawOptions,
    },
    /// `stroke_rect`.
    StrokeRect {
        /// Rectangle in user space.
        rect: Rect,
        /// Paint source.
        pattern: Pattern,
        /// Stroke style.
        stroke: StrokeOptions,
        /// Draw options.
        options: DrawOptions,
    },
    /// `stroke_line`.
    StrokeLine {
        /// Start point.
        start: Point,
        /// End point.
        end: Point,
        /// Paint source.
        pattern: Pattern,
        /// Stroke style.
        stroke: StrokeOptions,
        /// Draw options.
        options: DrawOptions,
    },
    /// `fill`.
    Fill {
        /// Path to fill.
        path: Path,
        /// Paint source.
        pattern: Pattern,
        /// Draw options.
        options: DrawOptions,
    },
    /// `stroke`.
    Stroke {
        /// Path to stroke.
        path: Path,
        /// Paint source.
        pattern: Pattern,
        /// Stroke style.
        stroke: StrokeOptions,
        /// Draw options.
        options: DrawOptions,
    },
    /// `fill_glyphs`.
    FillGlyphs {
        /// Font.
        font: ScaledFontRef,
        /// Glyph run.
        glyphs: Vec<Glyph>,
        /// Paint source.
        pattern: Pattern,
        /// Draw options.
        options: DrawOptions,
    },
    /// `draw_surface`.
    DrawSurface {
        /// Surface.
        surface: SourceSurfaceRef,
        /// Destination in user space.
        dest: Rect,
        /// Source rectangle in surface pixels.
        source: Rect,
        /// Sampling options.
        surface_options: DrawSurfaceOptions,
        /// Draw options.
        options: DrawOptions,
    },
    /// `draw_surface_with_shadow`.
    DrawSurfaceWithShadow {
        /// Surface.
        surface: SourceSurfaceRef,
        /// Device position.
        dest: Point,
        /// Shadow color.
        color: Color,
        /// Shadow offset.
        offset: Vec2,
        /// Blur standard deviation.
        sigma: f32,
        /// Compositing operator.
        op: CompositionOp,
    },
    /// `copy_surface`.
    CopySurface {
        /// Surface.
        surface: SourceSurfaceRef,
        /// Source rectangle in surface pixels.
        source: IntRect,
        /// Device destination.
        dest: IntPoint,
    },
    /// `copy_rect`.
    CopyRect {
        /// Source rectangle in device pixels.
        source: IntRect,
        /// Device destination.
        dest: IntPoint,
    },
    /// `mask`.
    Mask {
        /// Paint source.
        source: Pattern,
        /// Coverage source.
        mask: Pattern,
        /// Draw options.
        options: DrawOptions,
    },
    /// `mask_surface`.
    MaskSurface {
        /// Paint source.
        source: Pattern,
        /// Coverage surface.
        mask: SourceSurfaceRef,
        /// Mask position in user space.
        offset: Point,
        /// Draw options.
        options: DrawOptions,
    },
    /// `flush`.
    Flush,
}

/// Receiver of captured events.
pub trait DrawEventRecorder: fmt::Debug {
    /// Called once per issued call, before it is executed.
    fn record_event(&self, event: DrawEvent);
}

/// Recorder that keeps events in memory.
#[derive(Debug, Default)]
pub struct MemoryRecorder {
    events: Mutex<Vec<DrawEvent>>,
}

impl MemoryRecorder {
    /// Create an empty recorder.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Copy of the captured events.
    pub fn events(&self) -> Vec<DrawEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Remove and return the captured events.
    pub fn take_events(&self) -> Vec<DrawEvent> {
        core::mem::take(&mut *self.events.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Number of captured events.
    pub fn len(&self) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` if nothing was captured.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DrawEventRecorder for MemoryRecorder {
    fn record_event(&self, event: DrawEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

/// Issue `events` against `target` in order.
pub fn replay(events: &[DrawEvent], target: &mut DrawTarget) {
    for event in events {
        match event {
            DrawEvent::SetTransform(t) => target.set_transform(*t),
            DrawEvent::PushClip(path) => target.push_clip(path),
            DrawEvent::PushClipRect(rect) => target.push_clip_rect(*rect),
            DrawEvent::PopClip => target.pop_clip(),
            DrawEvent::SetOpaqueRect(rect) => target.set_opaque_rect(*rect),
            DrawEvent::SetPermitSubpixelAa(permit) => target.set_permit_subpixel_aa(*permit),
            DrawEvent::ClearRect(rect) => target.clear_rect(*rect),
            DrawEvent::FillRect {
                rect,
                pattern,
                options,
            } => target.fill_rect(*rect, pattern, options),
            DrawEvent::StrokeRect {
                rect,
                pattern,
                stroke,
                options,
            } => target.stroke_rect(*rect, pattern, stroke, options),
            DrawEvent::StrokeLine {
                start,
                end,
                pattern,
                stroke,
                options,
            } => target.stroke_line(*start, *end, pattern, stroke, options),
            DrawEvent::Fill {
                path,
                pattern,
                options,
            } => target.fill(path, pattern, options),
            DrawEvent::Stroke {
                path,
                pattern,
                stroke,
                options,
            } => target.stroke(path, pattern, stroke, options),
            DrawEvent::FillGlyphs {
                font,
                glyphs,
                pattern,
                options,
            } => target.fill_glyphs(font, &GlyphBuffer::new(glyphs), pattern, options),
            DrawEvent::DrawSurface {
                surface,
                dest,
                source,
                surface_options,
                options,
            } => target.draw_surface(surface, *dest, *source, surface_options, options),
            DrawEvent::DrawSurfaceWithShadow {
                surface,
                dest,
                color,
                offset,
                sigma,
                op,
            } => target.draw_surface_with_shadow(surface, *dest, *color, *offset, *sigma, *op),
            DrawEvent::CopySurface {
                surface,
                source,
                dest,
            } => target.copy_surface(surface, *source, *dest),
            DrawEvent::CopyRect { source, dest } => target.copy_rect(*source, *dest),
            DrawEvent::Mask {
                source,
                mask,
                options,
            } => target.mask(source, mask, options),
            DrawEvent::MaskSurface {
                source,
                mask,
                offset,
                options,
            } => target.mask_surface(source, mask, *offset, options),
            DrawEvent::Flush => target.flush(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::tests::{TestBackend, fill_unit};
    use crate::{BackendType, Factory};

    #[test]
    fn replay_reissues_calls_in_order() {
        let recorder = MemoryRecorder::new();
        let (inner, _) = TestBackend::new(BackendType::Raster);
        let inner = DrawTarget::new(Box::new(inner));
        let mut dt = Factory::create_recording_draw_target(recorder.clone(), inner);
        dt.set_transform(Affine::translate((1.0, 0.0)));
        dt.push_clip_rect(Rect::new(0.0, 0.0, 2.0, 2.0));
        fill_unit(&mut dt);
        dt.pop_clip();
        dt.flush();

        let events = recorder.take_events();
        assert_eq!(events.len(), 5);
        assert!(recorder.is_empty());

        let (backend, log) = TestBackend::new(BackendType::Raster);
        let mut target = DrawTarget::new(Box::new(backend));
        replay(&events, &mut target);
        assert_eq!(target.transform(), Affine::translate((1.0, 0.0)));
        let calls = log.borrow().calls.clone();
        assert_eq!(calls, ["push_clip", "fill", "pop_clip", "flush"]);
    }
}

// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Portable software backend for Understory Draw.
//!
//! [`RasterBackend`] scan-converts paths with supersampled coverage and
//! composites premultiplied colors straight into a CPU pixel buffer in any
//! [`SurfaceFormat`]. It has no dependencies beyond the drawing vocabulary
//! itself, which makes it the reference for pixel output and the backend of
//! choice for drawing into caller memory.
//!
//! Register it with a [`Factory`](understory_draw::Factory):
//!
//! ```
//! use understory_draw::{BackendType, Factory, IntSize, SurfaceFormat};
//! use understory_draw_raster::RasterProvider;
//!
//! let factory = Factory::new().with_backend(RasterProvider::default());
//! let target = factory
//!     .create_draw_target(BackendType::Raster, IntSize::new(64, 64), SurfaceFormat::B8G8R8A8)
//!     .unwrap();
//! assert_eq!(target.backend_type(), BackendType::Raster);
//! ```
//!
//! Gradient stops created on a raster target carry a [`GradientRamp`], a
//! lookup table that replaces per-pixel stop interpolation.

mod backend;
mod blend;
mod coverage;
mod paint;

pub use backend::RasterBackend;
pub use paint::{GradientRamp, RAMP_SIZE};

use understory_draw::{
    BackendProvider, BackendType, DeviceHandle, DrawBackend, DrawError, IntSize, SharedPixels,
    SurfaceFormat,
};

/// Quality knobs for [`RasterBackend`].
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RasterSettings {
    /// Coverage samples per pixel along each axis when anti-aliasing.
    pub samples_per_axis: u32,
    /// Curve flattening tolerance in device pixels.
    pub tolerance: f64,
}

impl Default for RasterSettings {
    fn default() -> Self {
        Self {
            samples_per_axis: 4,
            tolerance: 0.1,
        }
    }
}

/// Creates [`RasterBackend`]s for a [`Factory`](understory_draw::Factory).
#[derive(Copy, Clone, Debug, Default)]
pub struct RasterProvider {
    settings: RasterSettings,
}

impl RasterProvider {
    /// Provider whose backends use `settings`.
    pub fn new(settings: RasterSettings) -> Self {
        Self { settings }
    }
}

impl BackendProvider for RasterProvider {
    fn backend_type(&self) -> BackendType {
        BackendType::Raster
    }

    fn create_backend(
        &self,
        size: IntSize,
        format: SurfaceFormat,
        device: Option<&DeviceHandle>,
    ) -> Result<Box<dyn DrawBackend>, DrawError> {
        if device.is_some_and(DeviceHandle::is_lost) {
            return Err(DrawError::Unsupported("device has been lost"));
        }
        Ok(Box::new(RasterBackend::new(
            size,
            format,
            self.settings,
            device.cloned(),
        )?))
    }

    fn create_backend_for_data(
        &self,
        pixels: SharedPixels,
        size: IntSize,
        stride: i32,
        format: SurfaceFormat,
    ) -> Result<Box<dyn DrawBackend>, DrawError> {
        Ok(Box::new(RasterBackend::for_data(
            pixels,
            size,
            stride,
            format,
            self.settings,
        )?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kurbo::{Affine, Point, Rect, Vec2};
    use peniko::Color;
    use peniko::color::palette::css::{BLUE, LIME, RED};
    use understory_draw::pixel::{self, Premul};
    use understory_draw::{
        AntialiasMode, BackendCaps, BlendMode, Compose, DataSourceSurface, DrawOptions,
        DrawSurfaceOptions, DrawTarget, ExtendMode, Factory, Filter, FillRule, GradientStop,
        IntPoint, IntRect, LinearGradientPattern, Mix, NativeSurfaceType, PathSink, Pattern,
        SamplingBounds, SourceSurfaceRef, StrokeOptions,
    };

    fn factory() -> Factory {
        Factory::new().with_backend(RasterProvider::default())
    }

    fn target(w: u32, h: u32) -> DrawTarget {
        let size = IntSize::new(w, h);
        factory()
            .create_draw_target(BackendType::Raster, size, SurfaceFormat::B8G8R8A8)
            .unwrap()
    }

    fn px(target: &mut DrawTarget, x: u32, y: u32) -> [u8; 4] {
        let snap = target.snapshot().unwrap();
        let data = snap.data_surface().unwrap();
        pixel::to_rgba8(data.premul_pixel(x, y).unwrap())
    }

    fn fill(dt: &mut DrawTarget, rect: Rect, c: Color) {
        dt.fill_rect(rect, &solid(c), &DrawOptions::default());
    }

    fn solid(c: Color) -> Pattern {
        Pattern::Color(c)
    }

    #[test]
    fn fill_rect_paints_exact_pixels() {
        let mut dt = target(8, 8);
        fill(&mut dt, Rect::new(2.0, 2.0, 4.0, 4.0), RED);
        assert_eq!(px(&mut dt, 2, 2), [255, 0, 0, 255]);
        assert_eq!(px(&mut dt, 3, 3), [255, 0, 0, 255]);
        assert_eq!(px(&mut dt, 4, 4), [0, 0, 0, 0]);
        assert_eq!(px(&mut dt, 1, 2), [0, 0, 0, 0]);
    }

    #[test]
    fn bytes_follow_target_format() {
        let mut dt = target(1, 1);
        fill(&mut dt, Rect::new(0.0, 0.0, 1.0, 1.0), RED);
        let bits = dt.lock_bits().unwrap();
        assert_eq!(&bits.pixels.read()[..4], &[0, 0, 255, 255]);
        dt.release_bits(bits);
    }

    #[test]
    fn transform_applies_to_geometry() {
        let mut dt = target(8, 8);
        dt.set_transform(Affine::translate((4.0, 0.0)) * Affine::scale(2.0));
        fill(&mut dt, Rect::new(0.0, 0.0, 1.0, 1.0), BLUE);
        assert_eq!(px(&mut dt, 5, 1), [0, 0, 255, 255]);
        assert_eq!(px(&mut dt, 1, 1), [0, 0, 0, 0]);
        assert_eq!(px(&mut dt, 6, 0), [0, 0, 0, 0]);
    }

    #[test]
    fn half_covered_edges_blend() {
        let mut dt = target(4, 1);
        fill(&mut dt, Rect::new(0.5, 0.0, 2.0, 1.0), RED);
        let [r, _, _, a] = px(&mut dt, 0, 0);
        assert!((127..=128).contains(&a));
        assert_eq!(r, a);
        let options = DrawOptions {
            antialias_mode: AntialiasMode::None,
            ..DrawOptions::default()
        };
        let mut dt = target(4, 1);
        dt.fill_rect(Rect::new(0.6, 0.0, 2.0, 1.0), &solid(RED), &options);
        assert_eq!(px(&mut dt, 0, 0), [0, 0, 0, 0]);
    }

    #[test]
    fn global_alpha_scales_source() {
        let mut dt = target(1, 1);
        dt.fill_rect(
            Rect::new(0.0, 0.0, 1.0, 1.0),
            &solid(RED),
            &DrawOptions::with_alpha(0.5),
        );
        assert_eq!(px(&mut dt, 0, 0), [128, 0, 0, 128]);
    }

    #[test]
    fn composition_ops_apply() {
        let mut dt = target(2, 1);
        let all = Rect::new(0.0, 0.0, 2.0, 1.0);
        dt.fill_rect(all, &solid(RED), &DrawOptions::default());
        dt.fill_rect(
            Rect::new(0.0, 0.0, 1.0, 1.0),
            &solid(BLUE),
            &DrawOptions::with_op(Compose::DestOver),
        );
        assert_eq!(px(&mut dt, 0, 0), [255, 0, 0, 255]);
        dt.fill_rect(
            Rect::new(1.0, 0.0, 2.0, 1.0),
            &solid(BLUE),
            &DrawOptions::with_op(BlendMode::new(Mix::Multiply, Compose::SrcOver)),
        );
        assert_eq!(px(&mut dt, 1, 0), [0, 0, 0, 255]);
    }

    #[test]
    fn clear_rect_respects_clip() {
        let mut dt = target(4, 4);
        fill(&mut dt, Rect::new(0.0, 0.0, 4.0, 4.0), RED);
        dt.push_clip_rect(Rect::new(0.0, 0.0, 2.0, 4.0));
        dt.clear_rect(Rect::new(0.0, 0.0, 4.0, 4.0));
        dt.pop_clip();
        assert_eq!(px(&mut dt, 0, 0), [0, 0, 0, 0]);
        assert_eq!(px(&mut dt, 3, 0), [255, 0, 0, 255]);
    }

    #[test]
    fn nested_clips_intersect() {
        let mut dt = target(8, 8);
        dt.push_clip_rect(Rect::new(0.0, 0.0, 4.0, 8.0));
        let mut pb = dt.create_path_builder(FillRule::NonZero);
        pb.move_to(Point::new(2.0, 0.0));
        pb.line_to(Point::new(8.0, 0.0));
        pb.line_to(Point::new(8.0, 8.0));
        pb.line_to(Point::new(2.0, 8.0));
        pb.close();
        let clip = pb.finish();
        dt.push_clip(&clip);
        fill(&mut dt, Rect::new(0.0, 0.0, 8.0, 8.0), LIME);
        dt.pop_clip();
        dt.pop_clip();
        assert_eq!(px(&mut dt, 3, 3), [0, 255, 0, 255]);
        assert_eq!(px(&mut dt, 1, 3), [0, 0, 0, 0]);
        assert_eq!(px(&mut dt, 5, 3), [0, 0, 0, 0]);
        fill(&mut dt, Rect::new(0.0, 0.0, 8.0, 8.0), RED);
        assert_eq!(px(&mut dt, 5, 3), [255, 0, 0, 255]);
    }

    #[test]
    fn even_odd_path_fill() {
        let mut dt = target(8, 8);
        let mut pb = dt.create_path_builder(FillRule::EvenOdd);
        for r in [Rect::new(0.0, 0.0, 8.0, 8.0), Rect::new(2.0, 2.0, 6.0, 6.0)] {
            pb.move_to(Point::new(r.x0, r.y0));
            pb.line_to(Point::new(r.x1, r.y0));
            pb.line_to(Point::new(r.x1, r.y1));
            pb.line_to(Point::new(r.x0, r.y1));
            pb.close();
        }
        let path = pb.finish();
        dt.fill(&path, &solid(RED), &DrawOptions::default());
        assert_eq!(px(&mut dt, 1, 1), [255, 0, 0, 255]);
        assert_eq!(px(&mut dt, 4, 4), [0, 0, 0, 0]);
    }

    #[test]
    fn stroke_line_covers_its_width() {
        let mut dt = target(8, 8);
        dt.stroke_line(
            Point::new(0.0, 4.0),
            Point::new(8.0, 4.0),
            &solid(RED),
            &StrokeOptions::with_width(2.0),
            &DrawOptions::default(),
        );
        assert_eq!(px(&mut dt, 4, 3), [255, 0, 0, 255]);
        assert_eq!(px(&mut dt, 4, 4), [255, 0, 0, 255]);
        assert_eq!(px(&mut dt, 4, 2), [0, 0, 0, 0]);
        assert_eq!(px(&mut dt, 4, 5), [0, 0, 0, 0]);
    }

    #[test]
    fn dashed_stroke_leaves_gaps() {
        let mut dt = target(8, 2);
        let stroke = StrokeOptions {
            line_width: 2.0,
            dash_pattern: vec![2.0, 2.0],
            ..StrokeOptions::default()
        };
        dt.stroke_line(
            Point::new(0.0, 1.0),
            Point::new(8.0, 1.0),
            &solid(RED),
            &stroke,
            &DrawOptions::default(),
        );
        assert_eq!(px(&mut dt, 0, 0), [255, 0, 0, 255]);
        assert_eq!(px(&mut dt, 2, 0), [0, 0, 0, 0]);
        assert_eq!(px(&mut dt, 5, 1), [255, 0, 0, 255]);
    }

    #[test]
    fn gradient_stops_are_prepared() {
        let dt = target(4, 4);
        assert!(dt.capabilities().contains(BackendCaps::PREPARED_GRADIENTS));
        let stops = dt.create_gradient_stops(
            &[GradientStop::new(0.0, RED), GradientStop::new(1.0, BLUE)],
            ExtendMode::Pad,
        );
        assert!(stops.ramp::<GradientRamp>().is_some());
    }

    #[test]
    fn linear_gradient_fill() {
        let mut dt = target(10, 1);
        let stops = dt.create_gradient_stops(
            &[GradientStop::new(0.0, RED), GradientStop::new(1.0, BLUE)],
            ExtendMode::Pad,
        );
        let g = LinearGradientPattern::new(Point::new(0.0, 0.0), Point::new(10.0, 0.0), stops);
        let row = Rect::new(0.0, 0.0, 10.0, 1.0);
        dt.fill_rect(row, &g.into(), &DrawOptions::default());
        let [r0, _, b0, _] = px(&mut dt, 0, 0);
        let [r9, _, b9, _] = px(&mut dt, 9, 0);
        assert!(r0 > 230 && b0 < 25);
        assert!(r9 < 25 && b9 > 230);
    }

    #[test]
    fn foreign_gradient_stops_are_dropped() {
        let size = IntSize::new(2, 2);
        let other = Factory::new()
            .with_backend(understory_draw_ref::RefProvider::default())
            .create_draw_target(BackendType::Reference, size, SurfaceFormat::A8)
            .unwrap();
        let stops = other.create_gradient_stops(
            &[GradientStop::new(0.0, RED), GradientStop::new(1.0, RED)],
            ExtendMode::Pad,
        );
        let g = LinearGradientPattern::new(Point::new(0.0, 0.0), Point::new(2.0, 0.0), stops);
        let mut dt = target(2, 2);
        let all = Rect::new(0.0, 0.0, 2.0, 2.0);
        dt.fill_rect(all, &g.into(), &DrawOptions::default());
        assert_eq!(px(&mut dt, 0, 0), [0, 0, 0, 0]);
    }

    fn checker() -> SourceSurfaceRef {
        let s = DataSourceSurface::new(IntSize::new(2, 2), SurfaceFormat::B8G8R8A8).unwrap();
        {
            let mut map = s.map_mut();
            map.set_premul(0, 0, [1.0, 0.0, 0.0, 1.0]);
            map.set_premul(1, 0, [0.0, 1.0, 0.0, 1.0]);
            map.set_premul(0, 1, [0.0, 0.0, 1.0, 1.0]);
            map.set_premul(1, 1, [1.0, 1.0, 1.0, 1.0]);
        }
        s.into_source()
    }

    #[test]
    fn draw_surface_scales_source_rect() {
        let mut dt = target(4, 4);
        let options = DrawSurfaceOptions {
            filter: Filter::Point,
            ..DrawSurfaceOptions::default()
        };
        dt.draw_surface(
            &checker(),
            Rect::new(0.0, 0.0, 4.0, 4.0),
            Rect::new(0.0, 0.0, 2.0, 2.0),
            &options,
            &DrawOptions::default(),
        );
        assert_eq!(px(&mut dt, 0, 0), [255, 0, 0, 255]);
        assert_eq!(px(&mut dt, 1, 1), [255, 0, 0, 255]);
        assert_eq!(px(&mut dt, 3, 0), [0, 255, 0, 255]);
        assert_eq!(px(&mut dt, 0, 3), [0, 0, 255, 255]);
    }

    #[test]
    fn bounded_sampling_stays_in_source() {
        let mut dt = target(4, 4);
        let options = DrawSurfaceOptions {
            filter: Filter::Linear,
            sampling_bounds: SamplingBounds::Bounded,
        };
        // Upscale the top-left texel only; bilinear taps never see its
        // neighbors.
        dt.draw_surface(
            &checker(),
            Rect::new(0.0, 0.0, 4.0, 4.0),
            Rect::new(0.0, 0.0, 1.0, 1.0),
            &options,
            &DrawOptions::default(),
        );
        assert_eq!(px(&mut dt, 3, 3), [255, 0, 0, 255]);
    }

    #[test]
    fn copy_surface_ignores_transform_and_clip() {
        let mut dt = target(4, 4);
        dt.set_transform(Affine::scale(3.0));
        dt.push_clip_rect(Rect::new(0.0, 0.0, 0.1, 0.1));
        dt.copy_surface(&checker(), IntRect::new(0, 0, 2, 2), IntPoint::new(2, 2));
        dt.pop_clip();
        assert_eq!(px(&mut dt, 2, 2), [255, 0, 0, 255]);
        assert_eq!(px(&mut dt, 3, 3), [255, 255, 255, 255]);
        assert_eq!(px(&mut dt, 1, 1), [0, 0, 0, 0]);
    }

    #[test]
    fn copy_rect_handles_overlap() {
        let mut dt = target(4, 1);
        fill(&mut dt, Rect::new(0.0, 0.0, 1.0, 1.0), RED);
        fill(&mut dt, Rect::new(1.0, 0.0, 2.0, 1.0), BLUE);
        dt.copy_rect(IntRect::new(0, 0, 2, 1), IntPoint::new(1, 0));
        assert_eq!(px(&mut dt, 0, 0), [255, 0, 0, 255]);
        assert_eq!(px(&mut dt, 1, 0), [255, 0, 0, 255]);
        assert_eq!(px(&mut dt, 2, 0), [0, 0, 255, 255]);
    }

    #[test]
    fn copy_rect_far_destination_is_dropped() {
        let mut dt = target(4, 4);
        fill(&mut dt, Rect::new(0.0, 0.0, 4.0, 4.0), RED);
        let far = IntPoint::new(i32::MAX - 2, 0);
        dt.copy_rect(IntRect::new(-5, 0, 8, 4), far);
        dt.copy_surface(&checker(), IntRect::new(-5, -5, 8, 8), far);
        assert_eq!(px(&mut dt, 0, 0), [255, 0, 0, 255]);
        assert_eq!(px(&mut dt, 3, 3), [255, 0, 0, 255]);
    }

    #[test]
    fn caller_writes_keep_wrapped_length() {
        let caller = SharedPixels::new(vec![255; 64]);
        let surface = DataSourceSurface::wrapping(
            caller.clone(),
            IntSize::new(4, 4),
            16,
            SurfaceFormat::B8G8R8A8,
        )
        .unwrap()
        .into_source();
        {
            let mut bytes = caller.write();
            bytes[..8].fill(0);
            assert_eq!(bytes.len(), 64);
        }
        let mut dt = target(4, 4);
        dt.draw_surface(
            &surface,
            Rect::new(0.0, 0.0, 4.0, 4.0),
            Rect::new(0.0, 0.0, 4.0, 4.0),
            &DrawSurfaceOptions::default(),
            &DrawOptions::default(),
        );
        assert_eq!(px(&mut dt, 0, 0), [0, 0, 0, 0]);
        assert_eq!(px(&mut dt, 3, 3), [255, 255, 255, 255]);
        assert_eq!(caller.len(), 64);
    }

    #[test]
    fn dual_target_halves_hold_the_same_pixels() {
        let a = target(2, 2).into_shared();
        let b = target(2, 2).into_shared();
        let mut dual = Factory::create_dual_draw_target(&a, &b).unwrap();
        dual.push_clip_rect(Rect::new(0.0, 0.0, 1.0, 2.0));
        fill(&mut dual, Rect::new(0.0, 0.0, 2.0, 2.0), RED);
        dual.pop_clip();
        assert_eq!(px(&mut a.borrow_mut(), 0, 0), [255, 0, 0, 255]);
        assert_eq!(px(&mut b.borrow_mut(), 0, 1), [255, 0, 0, 255]);
        assert_eq!(px(&mut b.borrow_mut(), 1, 1), [0, 0, 0, 0]);

        fill(&mut b.borrow_mut(), Rect::new(1.0, 0.0, 2.0, 2.0), BLUE);
        assert_eq!(px(&mut b.borrow_mut(), 1, 0), [0, 0, 255, 255]);
        assert_eq!(px(&mut a.borrow_mut(), 1, 0), [0, 0, 0, 0]);
        drop(dual);
        assert_eq!(px(&mut a.borrow_mut(), 0, 0), [255, 0, 0, 255]);
    }

    #[test]
    fn mask_surface_uses_alpha() {
        let mut dt = target(4, 1);
        let mask = DataSourceSurface::new(IntSize::new(2, 1), SurfaceFormat::A8).unwrap();
        {
            let mut map = mask.map_mut();
            map.set_premul(0, 0, [0.0, 0.0, 0.0, 1.0]);
            map.set_premul(1, 0, [0.0, 0.0, 0.0, 0.0]);
        }
        dt.mask_surface(
            &solid(RED),
            &mask.into_source(),
            Point::new(1.0, 0.0),
            &DrawOptions::default(),
        );
        assert_eq!(px(&mut dt, 0, 0), [0, 0, 0, 0]);
        assert_eq!(px(&mut dt, 1, 0), [255, 0, 0, 255]);
        assert_eq!(px(&mut dt, 2, 0), [0, 0, 0, 0]);
        assert_eq!(px(&mut dt, 3, 0), [0, 0, 0, 0]);
    }

    #[test]
    fn mask_pattern_modulates_everywhere() {
        let mut dt = target(2, 1);
        let half = Color::new([0.0, 0.0, 0.0, 0.5]);
        dt.mask(&solid(RED), &solid(half), &DrawOptions::default());
        assert_eq!(px(&mut dt, 1, 0), [128, 0, 0, 128]);
    }

    #[test]
    fn shadow_is_drawn_beneath() {
        let mut dt = target(8, 8);
        let s = DataSourceSurface::new(IntSize::new(2, 2), SurfaceFormat::B8G8R8A8).unwrap();
        s.map_mut().fill([0.0, 0.0, 1.0, 1.0]);
        dt.draw_surface_with_shadow(
            &s.into_source(),
            Point::new(1.0, 1.0),
            RED,
            Vec2::new(3.0, 3.0),
            0.0,
            BlendMode::default(),
        );
        assert_eq!(px(&mut dt, 1, 1), [0, 0, 255, 255]);
        assert_eq!(px(&mut dt, 4, 4), [255, 0, 0, 255]);
        assert_eq!(px(&mut dt, 6, 6), [0, 0, 0, 0]);
    }

    #[test]
    fn drawing_into_caller_memory() {
        let pixels = SharedPixels::new(vec![0; 3 * 8]);
        let mut dt = factory()
            .create_draw_target_for_data(
                BackendType::Raster,
                pixels.clone(),
                IntSize::new(2, 3),
                8,
                SurfaceFormat::R8G8B8A8,
            )
            .unwrap();
        fill(&mut dt, Rect::new(0.0, 1.0, 1.0, 2.0), RED);
        dt.flush();
        assert_eq!(&pixels.read()[8..12], &[255, 0, 0, 255]);
        drop(dt);
        assert_eq!(pixels.handle_count(), 1);
    }

    #[test]
    fn native_surface_shares_pixels() {
        let mut dt = target(2, 2);
        let native = dt.native_surface(NativeSurfaceType::CpuPixels).unwrap();
        let surface = dt.create_source_surface_from_native_surface(&native).unwrap();
        fill(&mut dt, Rect::new(0.0, 0.0, 2.0, 2.0), RED);
        let data = surface.data_surface().unwrap();
        let first = data.premul_pixel(0, 0).unwrap();
        assert_eq!(pixel::to_rgba8(first), [255, 0, 0, 255]);
        assert!(dt.native_surface(NativeSurfaceType::Backend(BackendType::Raster)).is_none());
    }

    #[test]
    fn snapshots_die_with_their_device() {
        let device = DeviceHandle::new();
        let mut dt = factory()
            .create_draw_target_with_device(
                BackendType::Raster,
                &device,
                IntSize::new(2, 2),
                SurfaceFormat::B8G8R8A8,
            )
            .unwrap();
        let snap = dt.snapshot().unwrap();
        assert!(snap.is_valid());
        device.mark_lost();
        assert!(!snap.is_valid());
        assert!(
            factory()
                .create_draw_target_with_device(
                    BackendType::Raster,
                    &device,
                    IntSize::new(2, 2),
                    SurfaceFormat::B8G8R8A8,
                )
                .is_err()
        );
    }

    #[test]
    fn snapshot_is_a_copy() {
        let mut dt = target(1, 1);
        let before = dt.snapshot().unwrap();
        fill(&mut dt, Rect::new(0.0, 0.0, 1.0, 1.0), RED);
        let data = before.data_surface().unwrap();
        let p: Premul = data.premul_pixel(0, 0).unwrap();
        assert_eq!(p, pixel::TRANSPARENT);
    }
}

// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::any::Any;
use std::sync::Arc;

use kurbo::{Affine, BezPath, Point, Rect, Shape};
use understory_draw::pixel::{self, Premul};
use understory_draw::{
    BackendCaps, BackendType, BitsAccess, Clip, DataSourceSurface, DeviceHandle, DrawBackend,
    DrawError, DrawOptions, DrawSurfaceOptions, ExtendMode, FillGeometry, FillRule, GradientStop,
    IntPoint, IntRect, IntSize, NativeSurface, NativeSurfaceType, PixelLayout, SamplingBounds,
    SharedPixels, SourceSurfaceRef, StrokeOptions, SurfaceFormat, SurfacePattern, SurfaceType,
    TOLERANCE, stroke_outline,
};
use understory_draw::{AntialiasMode, Filter, Pattern};

use crate::RasterSettings;
use crate::blend::composite;
use crate::coverage::{Mask, rasterize};
use crate::paint::{GradientRamp, Shader};

/// Software backend that rasterizes into a CPU pixel buffer.
#[derive(Debug)]
pub struct RasterBackend {
    pixels: SharedPixels,
    layout: PixelLayout,
    clips: Vec<Mask>,
    settings: RasterSettings,
    device: Option<DeviceHandle>,
}

impl RasterBackend {
    /// Backend over zeroed, tightly packed storage.
    pub fn new(
        size: IntSize,
        format: SurfaceFormat,
        settings: RasterSettings,
        device: Option<DeviceHandle>,
    ) -> Result<Self, DrawError> {
        let layout = PixelLayout::packed(size, format)?;
        let pixels = SharedPixels::zeroed(layout.required_len())?;
        Ok(Self {
            pixels,
            layout,
            clips: Vec::new(),
            settings,
            device,
        })
    }

    /// Backend drawing into caller memory described by `stride`.
    pub fn for_data(
        pixels: SharedPixels,
        size: IntSize,
        stride: i32,
        format: SurfaceFormat,
        settings: RasterSettings,
    ) -> Result<Self, DrawError> {
        let layout = PixelLayout::new(size, format, stride, pixels.len())?;
        Ok(Self {
            pixels,
            layout,
            clips: Vec::new(),
            settings,
            device: None,
        })
    }

    fn bounds(&self) -> IntRect {
        self.layout.size().to_int_rect()
    }

    fn samples(&self, options: &DrawOptions) -> u32 {
        match options.antialias_mode {
            AntialiasMode::None => 1,
            _ => self.settings.samples_per_axis,
        }
    }

    fn coverage(&self, path: &BezPath, fill_rule: FillRule, options: &DrawOptions) -> Mask {
        rasterize(
            path,
            fill_rule,
            self.bounds(),
            self.samples(options),
            self.settings.tolerance,
        )
    }

    /// Blend `shader` into the pixels covered by `coverage`, honoring the
    /// clip. Pixels outside the coverage bounds are never touched.
    fn paint(&mut self, coverage: &Mask, shader: &Shader, options: &DrawOptions) {
        let clip = self.clips.last();
        let mut bounds = coverage.bounds.intersect(&self.bounds());
        if let Some(clip) = clip {
            bounds = bounds.intersect(&clip.bounds);
        }
        if bounds.is_empty() {
            return;
        }
        let format = self.layout.format();
        let mut bytes = self.pixels.write();
        for y in bounds.y..bounds.bottom() {
            for x in bounds.x..bounds.right() {
                let mut cov = coverage.get(x, y);
                if let Some(clip) = clip {
                    cov *= clip.get(x, y);
                }
                if cov <= 0.0 {
                    continue;
                }
                let at = self.layout.pixel_offset(x as u32, y as u32);
                let dst = pixel::read(format, &bytes[at..]);
                let src = pixel::scale(shader.eval(x, y), options.alpha);
                let out = pixel::lerp(dst, composite(src, dst, options.composition_op), cov);
                pixel::write(format, out, &mut bytes[at..]);
            }
        }
    }

    fn read_rect(&self, rect: IntRect) -> Vec<Premul> {
        let bytes = self.pixels.read();
        let format = self.layout.format();
        let mut out = Vec::with_capacity(rect.width as usize * rect.height as usize);
        for y in rect.y..rect.bottom() {
            for x in rect.x..rect.right() {
                let at = self.layout.pixel_offset(x as u32, y as u32);
                out.push(pixel::read(format, &bytes[at..]));
            }
        }
        out
    }

    /// Store `texels` (a `source`-sized block) with its origin at `dest`,
    /// dropping whatever falls outside the target.
    fn write_block(&mut self, texels: &[Premul], source: IntRect, dest: IntPoint) {
        let placed = IntRect::new(dest.x, dest.y, source.width, source.height);
        let visible = placed.intersect(&self.bounds());
        if visible.is_empty() {
            return;
        }
        let format = self.layout.format();
        let mut bytes = self.pixels.write();
        for y in visible.y..visible.bottom() {
            for x in visible.x..visible.right() {
                let i = (y - dest.y) as usize * source.width as usize + (x - dest.x) as usize;
                let at = self.layout.pixel_offset(x as u32, y as u32);
                pixel::write(format, texels[i], &mut bytes[at..]);
            }
        }
    }

    fn packed_copy(&self) -> Result<DataSourceSurface, DrawError> {
        let size = self.layout.size();
        let packed = PixelLayout::packed(size, self.layout.format())?;
        let bytes = self.pixels.read();
        let mut out = Vec::with_capacity(packed.required_len());
        for y in 0..size.height {
            let start = self.layout.row_offset(y);
            out.extend_from_slice(&bytes[start..start + self.layout.row_bytes()]);
        }
        DataSourceSurface::from_backend(
            out,
            size,
            packed.stride(),
            packed.format(),
            SurfaceType::Raster,
            self.device.clone(),
        )
    }
}

fn rect_path(rect: Rect) -> BezPath {
    rect.to_path(TOLERANCE)
}

impl DrawBackend for RasterBackend {
    fn backend_type(&self) -> BackendType {
        BackendType::Raster
    }

    fn size(&self) -> IntSize {
        self.layout.size()
    }

    fn format(&self) -> SurfaceFormat {
        self.layout.format()
    }

    fn capabilities(&self) -> BackendCaps {
        BackendCaps::LOCK_BITS
            | BackendCaps::NATIVE_SURFACE
            | BackendCaps::DATA_TARGETS
            | BackendCaps::PREPARED_GRADIENTS
    }

    fn fill(
        &mut self,
        geometry: &FillGeometry<'_>,
        pattern: &Pattern,
        options: &DrawOptions,
        transform: Affine,
    ) {
        let Some(shader) = Shader::new(pattern, transform) else {
            return;
        };
        let path = transform * &*geometry.to_bez_path();
        let coverage = self.coverage(&path, geometry.fill_rule(), options);
        self.paint(&coverage, &shader, options);
    }

    fn stroke(
        &mut self,
        path: &BezPath,
        stroke: &StrokeOptions,
        pattern: &Pattern,
        options: &DrawOptions,
        transform: Affine,
    ) {
        if stroke.line_width.is_nan() || stroke.line_width <= 0.0 {
            return;
        }
        let Some(shader) = Shader::new(pattern, transform) else {
            return;
        };
        let outline = transform * &stroke_outline(path, stroke);
        let coverage = self.coverage(&outline, FillRule::NonZero, options);
        self.paint(&coverage, &shader, options);
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
        let (dest, source) = (dest.abs(), source.abs());
        if dest.area() == 0.0 || source.area() == 0.0 {
            return;
        }
        let matrix = Affine::translate(dest.origin().to_vec2())
            * Affine::scale_non_uniform(
                dest.width() / source.width(),
                dest.height() / source.height(),
            )
            * Affine::translate(-source.origin().to_vec2());
        let pattern = Pattern::Surface(SurfacePattern {
            surface: Arc::clone(surface),
            extend_mode: ExtendMode::Pad,
            matrix,
            filter: surface_options.filter,
        });
        let window = match surface_options.sampling_bounds {
            SamplingBounds::Bounded => Some(source),
            SamplingBounds::Unbounded => None,
        };
        let Some(shader) = Shader::with_window(&pattern, transform, window) else {
            return;
        };
        let path = transform * &rect_path(dest);
        let coverage = self.coverage(&path, FillRule::NonZero, options);
        self.paint(&coverage, &shader, options);
    }

    fn copy_surface(&mut self, surface: &SourceSurfaceRef, source: IntRect, dest: IntPoint) {
        let Some(data) = surface.data_surface() else {
            log::warn!("copy_surface: surface has no pixel data");
            return;
        };
        let clipped = source.intersect(&data.layout().size().to_int_rect());
        if clipped.is_empty() {
            return;
        }
        let dest = dest.shifted_for_clip(source, clipped);
        let texels = {
            let map = data.map();
            let mut out = Vec::with_capacity(clipped.width as usize * clipped.height as usize);
            for y in clipped.y..clipped.bottom() {
                for x in clipped.x..clipped.right() {
                    out.push(map.premul(x as u32, y as u32));
                }
            }
            out
        };
        self.write_block(&texels, clipped, dest);
    }

    fn copy_rect(&mut self, source: IntRect, dest: IntPoint) {
        let clipped = source.intersect(&self.bounds());
        if clipped.is_empty() {
            return;
        }
        let dest = dest.shifted_for_clip(source, clipped);
        let texels = self.read_rect(clipped);
        self.write_block(&texels, clipped, dest);
    }

    fn mask(&mut self, source: &Pattern, mask: &Pattern, options: &DrawOptions, transform: Affine) {
        let (Some(shader), Some(mask)) = (
            Shader::new(source, transform),
            Shader::new(mask, transform),
        ) else {
            return;
        };
        let mut coverage = Mask::filled(self.bounds(), 1.0);
        coverage.modulate(|x, y| mask.eval(x, y)[3]);
        self.paint(&coverage, &shader, options);
    }

    fn mask_surface(
        &mut self,
        source: &Pattern,
        mask: &SourceSurfaceRef,
        offset: Point,
        options: &DrawOptions,
        transform: Affine,
    ) {
        let size = mask.size();
        let placed = Rect::from_origin_size(
            offset,
            (f64::from(size.width), f64::from(size.height)),
        );
        let mask_pattern = Pattern::Surface(SurfacePattern {
            surface: Arc::clone(mask),
            extend_mode: ExtendMode::Pad,
            matrix: Affine::translate(offset.to_vec2()),
            filter: Filter::Linear,
        });
        let (Some(shader), Some(mask)) = (
            Shader::new(source, transform),
            Shader::new(&mask_pattern, transform),
        ) else {
            return;
        };
        let path = transform * &rect_path(placed);
        let mut coverage = self.coverage(&path, FillRule::NonZero, options);
        coverage.modulate(|x, y| mask.eval(x, y)[3]);
        self.paint(&coverage, &shader, options);
    }

    fn push_clip(&mut self, clip: &Clip) {
        let options = DrawOptions::default();
        let mut mask = self.coverage(&clip.device_path(), clip.fill_rule(), &options);
        if let Some(outer) = self.clips.last() {
            mask = mask.intersect(outer);
        }
        self.clips.push(mask);
    }

    fn pop_clip(&mut self) {
        self.clips.pop();
    }

    fn snapshot(&mut self) -> Option<SourceSurfaceRef> {
        match self.packed_copy() {
            Ok(surface) => Some(surface.into_source()),
            Err(e) => {
                log::warn!("snapshot: {e}");
                None
            }
        }
    }

    fn flush(&mut self) {}

    fn lock_bits(&mut self) -> Option<BitsAccess> {
        Some(BitsAccess {
            pixels: self.pixels.clone(),
            size: self.layout.size(),
            stride: self.layout.stride(),
            format: self.layout.format(),
        })
    }

    fn create_similar(
        &self,
        size: IntSize,
        format: SurfaceFormat,
    ) -> Result<Box<dyn DrawBackend>, DrawError> {
        Ok(Box::new(Self::new(
            size,
            format,
            self.settings,
            self.device.clone(),
        )?))
    }

    fn prepare_gradient_stops(
        &self,
        stops: &[GradientStop],
        extend: ExtendMode,
    ) -> Option<Arc<dyn Any + Send + Sync>> {
        Some(Arc::new(GradientRamp::new(stops, extend)))
    }

    fn native_surface(&mut self, kind: NativeSurfaceType) -> Option<NativeSurface> {
        match kind {
            NativeSurfaceType::CpuPixels => Some(NativeSurface::cpu_pixels(
                self.pixels.clone(),
                self.layout.size(),
                self.layout.stride(),
                self.layout.format(),
            )),
            NativeSurfaceType::Backend(_) => None,
        }
    }
}

// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Vello CPU–backed implementation of the draw backend.
//!
//! This crate implements [`DrawBackend`] on top of the sparse-strips
//! [`vello_cpu::RenderContext`]. Drawing is deferred: calls are encoded into
//! the render context and only rasterized into the backing store when pixels
//! are needed, which happens on [`flush`](DrawBackend::flush), snapshots,
//! `lock_bits` and device copies.
//!
//! Composition operators other than plain source-over, and global alpha, are
//! expressed as `vello_cpu` layers clipped to the drawn geometry. Masks are a
//! destination-in layer nested inside a group. Under an active clip such a
//! layer is rendered against the resolved store and blended back through the
//! clip coverage, so pixels outside the clip keep their contents.
//!
//! Supported target formats are the 8-bit RGBA and BGRA layouts, with or
//! without alpha. Anti-aliasing is always on.

use core::fmt;

use kurbo::{Affine, BezPath, PathEl, Point, Rect, Shape};
use peniko::{
    Blob, ColorStop, Compose, Gradient, GradientKind, ImageAlphaType, ImageData, ImageFormat,
    ImageQuality, ImageSampler, LinearGradientPosition, Mix, RadialGradientPosition,
};
use understory_draw::pixel::{self, Premul};
use understory_draw::{
    BackendCaps, BackendProvider, BackendType, BitsAccess, BlendMode, Clip, DataSourceSurface,
    DeviceHandle, DrawBackend, DrawError, DrawOptions, DrawSurfaceOptions, FillGeometry, FillRule,
    Filter, GradientStops, IntPoint, IntRect, IntSize, Pattern, PixelLayout, SamplingBounds,
    SharedPixels, SourceSurfaceRef, StrokeOptions, SurfaceFormat, SurfaceType, TOLERANCE,
    stroke_outline,
};
use vello_cpu::kurbo::{Affine as CpuAffine, BezPath as CpuBezPath, Rect as CpuRect};
use vello_cpu::{Image as CpuImage, ImageSource, Pixmap, RenderContext, RenderMode, RenderSettings};

/// CPU-backed implementation of the draw backend using `vello_cpu`.
pub struct VelloCpuBackend {
    /// Pending drawing, when any has been encoded since the last resolve.
    ctx: Option<RenderContext>,
    store: SharedPixels,
    layout: PixelLayout,
    width: u16,
    height: u16,
    clips: Vec<Clip>,
    render_mode: RenderMode,
    device: Option<DeviceHandle>,
}

impl fmt::Debug for VelloCpuBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VelloCpuBackend")
            .field("size", &self.layout.size())
            .field("format", &self.layout.format())
            .field("pending", &self.ctx.is_some())
            .field("clip_depth", &self.clips.len())
            .finish_non_exhaustive()
    }
}

fn check_format(format: SurfaceFormat) -> Result<(), DrawError> {
    match format {
        SurfaceFormat::B8G8R8A8
        | SurfaceFormat::B8G8R8X8
        | SurfaceFormat::R8G8B8A8
        | SurfaceFormat::R8G8B8X8 => Ok(()),
        SurfaceFormat::R5G6B5 | SurfaceFormat::A8 => Err(DrawError::UnsupportedFormat(format)),
    }
}

fn dimensions(size: IntSize) -> Result<(u16, u16), DrawError> {
    let w = u16::try_from(size.width).map_err(|_| DrawError::InvalidSize(size))?;
    let h = u16::try_from(size.height).map_err(|_| DrawError::InvalidSize(size))?;
    Ok((w, h))
}

impl VelloCpuBackend {
    /// Backend over zeroed, tightly packed storage.
    pub fn new(
        size: IntSize,
        format: SurfaceFormat,
        render_mode: RenderMode,
        device: Option<DeviceHandle>,
    ) -> Result<Self, DrawError> {
        check_format(format)?;
        let layout = PixelLayout::packed(size, format)?;
        let store = SharedPixels::zeroed(layout.required_len())?;
        Self::with_store(store, layout, render_mode, device)
    }

    /// Backend drawing into caller memory described by `stride`.
    ///
    /// The caller's pixels are updated whenever the backend resolves, in
    /// particular on `flush`.
    pub fn for_data(
        pixels: SharedPixels,
        size: IntSize,
        stride: i32,
        format: SurfaceFormat,
        render_mode: RenderMode,
    ) -> Result<Self, DrawError> {
        check_format(format)?;
        let layout = PixelLayout::new(size, format, stride, pixels.len())?;
        Self::with_store(pixels, layout, render_mode, None)
    }

    fn with_store(
        store: SharedPixels,
        layout: PixelLayout,
        render_mode: RenderMode,
        device: Option<DeviceHandle>,
    ) -> Result<Self, DrawError> {
        let (width, height) = dimensions(layout.size())?;
        Ok(Self {
            ctx: None,
            store,
            layout,
            width,
            height,
            clips: Vec::new(),
            render_mode,
            device,
        })
    }

    fn bounds_path(&self) -> BezPath {
        Rect::new(0.0, 0.0, f64::from(self.width), f64::from(self.height)).to_path(TOLERANCE)
    }

    /// Premultiplied contents of the store.
    fn read_store(&self) -> Vec<Premul> {
        let size = self.layout.size();
        let format = self.layout.format();
        let bytes = self.store.read();
        let mut out = Vec::with_capacity(size.width as usize * size.height as usize);
        for y in 0..size.height {
            for x in 0..size.width {
                out.push(pixel::read(format, &bytes[self.layout.pixel_offset(x, y)..]));
            }
        }
        out
    }

    fn blank_ctx(&self) -> RenderContext {
        let settings = RenderSettings {
            render_mode: self.render_mode,
            ..RenderSettings::default()
        };
        RenderContext::new_with(self.width, self.height, settings)
    }

    /// A fresh render context holding the current store, without clips.
    fn backdrop_ctx(&self) -> RenderContext {
        let mut ctx = self.blank_ctx();
        let texels = self.read_store();
        if texels.iter().any(|p| p[3] > 0.0) {
            let size = self.layout.size();
            let image = image_from_texels(&texels, size.width, size.height);
            ctx.set_transform(CpuAffine::IDENTITY);
            ctx.set_paint_transform(CpuAffine::IDENTITY);
            ctx.set_paint(CpuImage {
                image: ImageSource::from_peniko_image_data(&image),
                sampler: sampler(Filter::Point, peniko::Extend::Pad),
            });
            ctx.fill_rect(&self.cpu_bounds());
        }
        ctx
    }

    /// A fresh render context holding the current store and clip stack.
    fn seeded_ctx(&self) -> RenderContext {
        let mut ctx = self.backdrop_ctx();
        for clip in &self.clips {
            push_clip_layer(&mut ctx, clip);
        }
        ctx
    }

    fn ctx(&mut self) -> &mut RenderContext {
        let ctx = match self.ctx.take() {
            Some(ctx) => ctx,
            None => self.seeded_ctx(),
        };
        self.ctx.insert(ctx)
    }

    fn cpu_bounds(&self) -> CpuRect {
        CpuRect::new(0.0, 0.0, f64::from(self.width), f64::from(self.height))
    }

    /// Rasterize `ctx`, which must have no open layers.
    fn render(&self, ctx: &mut RenderContext) -> Vec<Premul> {
        ctx.flush();
        let mut pixmap = Pixmap::new(self.width, self.height);
        ctx.render_to_pixmap(&mut pixmap);
        pixmap
            .take_unpremultiplied()
            .into_iter()
            .map(|p| {
                let a = f32::from(p.a) / 255.0;
                [
                    f32::from(p.r) / 255.0 * a,
                    f32::from(p.g) / 255.0 * a,
                    f32::from(p.b) / 255.0 * a,
                    a,
                ]
            })
            .collect()
    }

    /// Replace the whole store with `texels`, given in row order.
    fn write_store(&mut self, texels: &[Premul]) {
        let format = self.layout.format();
        let (width, height) = (u32::from(self.width), u32::from(self.height));
        let mut bytes = self.store.write();
        for y in 0..height {
            for x in 0..width {
                let at = self.layout.pixel_offset(x, y);
                pixel::write(format, texels[(y * width + x) as usize], &mut bytes[at..]);
            }
        }
    }

    /// Rasterize pending drawing into the store.
    fn resolve(&mut self) {
        let Some(mut ctx) = self.ctx.take() else {
            return;
        };
        for _ in &self.clips {
            ctx.pop_layer();
        }
        let texels = self.render(&mut ctx);
        self.write_store(&texels);
    }

    /// Coverage of the clip stack for every pixel, in row order.
    fn clip_coverage(&self) -> Vec<f32> {
        let mut ctx = self.blank_ctx();
        for clip in &self.clips {
            push_clip_layer(&mut ctx, clip);
        }
        ctx.set_transform(CpuAffine::IDENTITY);
        ctx.set_paint_transform(CpuAffine::IDENTITY);
        ctx.set_paint(peniko::Color::WHITE);
        ctx.fill_rect(&self.cpu_bounds());
        for _ in &self.clips {
            ctx.pop_layer();
        }
        self.render(&mut ctx).into_iter().map(|p| p[3]).collect()
    }

    /// Run `encode` against the pending drawing.
    ///
    /// Source-over work nests inside the clip layers. Any other operator
    /// would only combine with the empty clip group there, so that work is
    /// rendered over the unclipped backdrop and then blended back into the
    /// store through the clip coverage.
    fn encode(&mut self, source_over: bool, encode: impl FnOnce(&mut RenderContext)) {
        if source_over || self.clips.is_empty() {
            encode(self.ctx());
            return;
        }
        self.resolve();
        let backdrop = self.read_store();
        let mut ctx = self.backdrop_ctx();
        encode(&mut ctx);
        let drawn = self.render(&mut ctx);
        let coverage = self.clip_coverage();
        let out: Vec<Premul> = backdrop
            .iter()
            .zip(&drawn)
            .zip(&coverage)
            .map(|((b, d), c)| pixel::lerp(*b, *d, *c))
            .collect();
        self.write_store(&out);
    }

    /// Encode `draw` so that it composites with `options`, limited to the
    /// device-space `extent`.
    fn draw_with(
        &mut self,
        options: &DrawOptions,
        extent: &BezPath,
        fill_rule: FillRule,
        draw: impl FnOnce(&mut RenderContext),
    ) {
        let plain = is_plain(options);
        let extent = to_cpu_path(extent);
        self.encode(plain, |ctx| {
            if plain {
                draw(ctx);
                return;
            }
            ctx.set_transform(CpuAffine::IDENTITY);
            ctx.set_fill_rule(fill_rule);
            ctx.push_layer(
                Some(&extent),
                Some(options.composition_op),
                Some(options.alpha),
                None,
                None,
            );
            draw(ctx);
            ctx.pop_layer();
        });
    }

    fn fill_device_path(
        &mut self,
        path: &BezPath,
        fill_rule: FillRule,
        paint: Paint,
        options: &DrawOptions,
    ) {
        let cpu = to_cpu_path(path);
        self.draw_with(options, path, fill_rule, |ctx| {
            paint.apply(ctx);
            ctx.set_transform(CpuAffine::IDENTITY);
            ctx.set_fill_rule(fill_rule);
            ctx.fill_path(&cpu);
        });
    }

    /// Store `texels` (a `source`-sized block) at `dest`, dropping whatever
    /// falls outside the target.
    fn write_block(&mut self, texels: &[Premul], source: IntRect, dest: IntPoint) {
        self.resolve();
        let placed = IntRect::new(dest.x, dest.y, source.width, source.height);
        let visible = placed.intersect(&self.layout.size().to_int_rect());
        let format = self.layout.format();
        let mut bytes = self.store.write();
        for y in visible.y..visible.bottom() {
            for x in visible.x..visible.right() {
                let i = (y - dest.y) as usize * source.width as usize + (x - dest.x) as usize;
                let at = self.layout.pixel_offset(x as u32, y as u32);
                pixel::write(format, texels[i], &mut bytes[at..]);
            }
        }
    }
}

fn to_cpu_path(path: &BezPath) -> CpuBezPath {
    let mut out = CpuBezPath::new();
    for el in path.elements() {
        match *el {
            PathEl::MoveTo(p) => out.move_to((p.x, p.y)),
            PathEl::LineTo(p) => out.line_to((p.x, p.y)),
            PathEl::QuadTo(a, b) => out.quad_to((a.x, a.y), (b.x, b.y)),
            PathEl::CurveTo(a, b, c) => out.curve_to((a.x, a.y), (b.x, b.y), (c.x, c.y)),
            PathEl::ClosePath => out.close_path(),
        }
    }
    out
}

fn affine_to_cpu(xf: Affine) -> CpuAffine {
    CpuAffine::new(xf.as_coeffs())
}

fn is_plain(options: &DrawOptions) -> bool {
    options.composition_op == BlendMode::default() && options.alpha >= 1.0
}

fn push_clip_layer(ctx: &mut RenderContext, clip: &Clip) {
    ctx.set_transform(CpuAffine::IDENTITY);
    ctx.set_fill_rule(clip.fill_rule());
    ctx.push_clip_layer(&to_cpu_path(&clip.device_path()));
}

fn push_dest_in_layer(ctx: &mut RenderContext) {
    let dest_in = BlendMode::new(Mix::Normal, Compose::DestIn);
    ctx.push_layer(None, Some(dest_in), None, None, None);
}

fn sampler(filter: Filter, extend: peniko::Extend) -> ImageSampler {
    let quality = match filter {
        Filter::Point => ImageQuality::Low,
        Filter::Linear => ImageQuality::Medium,
        Filter::Good => ImageQuality::High,
    };
    ImageSampler {
        quality,
        x_extend: extend,
        y_extend: extend,
        ..ImageSampler::default()
    }
}

fn image_from_texels(texels: &[Premul], width: u32, height: u32) -> ImageData {
    let mut bytes = Vec::with_capacity(texels.len() * 4);
    for p in texels {
        let c = pixel::unpremultiply(*p).to_rgba8();
        bytes.extend_from_slice(&[c.r, c.g, c.b, c.a]);
    }
    ImageData {
        data: Blob::from(bytes),
        format: ImageFormat::Rgba8,
        alpha_type: ImageAlphaType::Alpha,
        width,
        height,
    }
}

/// Image of `window` within `surface`, or of the whole surface.
fn surface_image(
    surface: &SourceSurfaceRef,
    window: Option<Rect>,
) -> Option<(ImageData, IntRect)> {
    let data: DataSourceSurface = surface.data_surface()?;
    let full = data.layout().size().to_int_rect();
    let window = window.map_or(full, |r| IntRect::round_out(r).intersect(&full));
    if window.is_empty() {
        return None;
    }
    let map = data.map();
    let mut texels = Vec::with_capacity(window.width as usize * window.height as usize);
    for y in window.y..window.bottom() {
        for x in window.x..window.right() {
            texels.push(map.premul(x as u32, y as u32));
        }
    }
    let image = image_from_texels(&texels, window.width as u32, window.height as u32);
    Some((image, window))
}

fn color_stops(stops: &GradientStops) -> Vec<ColorStop> {
    stops
        .stops()
        .iter()
        .map(|s| ColorStop::from((s.offset, s.color)))
        .collect()
}

/// A pattern translated into a `vello_cpu` paint and paint transform.
enum Paint {
    Solid(peniko::Color),
    Gradient(Gradient, Affine),
    Image(CpuImage, Affine),
}

impl Paint {
    /// Paint for `pattern` in device space, given the user-to-device
    /// `transform`.
    fn new(pattern: &Pattern, transform: Affine) -> Option<Self> {
        match pattern {
            Pattern::Color(c) => Some(Self::Solid(*c)),
            Pattern::LinearGradient(g) => {
                let stops = color_stops(&g.stops);
                let gradient = Gradient {
                    kind: GradientKind::Linear(LinearGradientPosition::new(
                        (g.begin.x, g.begin.y),
                        (g.end.x, g.end.y),
                    )),
                    extend: g.stops.extend_mode(),
                    stops: stops.as_slice().into(),
                    ..Gradient::default()
                };
                Some(Self::Gradient(gradient, transform * g.matrix))
            }
            Pattern::RadialGradient(g) => {
                let stops = color_stops(&g.stops);
                #[allow(
                    clippy::cast_possible_truncation,
                    reason = "gradient radii only need f32 precision"
                )]
                let (r1, r2) = (g.radius1 as f32, g.radius2 as f32);
                let gradient = Gradient {
                    kind: GradientKind::Radial(RadialGradientPosition::new_two_point(
                        (g.center1.x, g.center1.y),
                        r1,
                        (g.center2.x, g.center2.y),
                        r2,
                    )),
                    extend: g.stops.extend_mode(),
                    stops: stops.as_slice().into(),
                    ..Gradient::default()
                };
                Some(Self::Gradient(gradient, transform * g.matrix))
            }
            Pattern::Surface(s) => {
                let (image, _) = surface_image(&s.surface, None)?;
                let image = CpuImage {
                    image: ImageSource::from_peniko_image_data(&image),
                    sampler: sampler(s.filter, s.extend_mode),
                };
                Some(Self::Image(image, transform * s.matrix))
            }
        }
    }

    fn apply(self, ctx: &mut RenderContext) {
        match self {
            Self::Solid(color) => {
                ctx.set_paint_transform(CpuAffine::IDENTITY);
                ctx.set_paint(color);
            }
            Self::Gradient(gradient, xf) => {
                ctx.set_paint_transform(affine_to_cpu(xf));
                ctx.set_paint(gradient);
            }
            Self::Image(image, xf) => {
                ctx.set_paint_transform(affine_to_cpu(xf));
                ctx.set_paint(image);
            }
        }
    }
}

impl DrawBackend for VelloCpuBackend {
    fn backend_type(&self) -> BackendType {
        BackendType::VelloCpu
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
        let Some(paint) = Paint::new(pattern, transform) else {
            return;
        };
        let path = transform * &*geometry.to_bez_path();
        self.fill_device_path(&path, geometry.fill_rule(), paint, options);
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
        let Some(paint) = Paint::new(pattern, transform) else {
            return;
        };
        let outline = transform * &stroke_outline(path, stroke);
        self.fill_device_path(&outline, FillRule::NonZero, paint, options);
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
        let window = match surface_options.sampling_bounds {
            SamplingBounds::Bounded => Some(source),
            SamplingBounds::Unbounded => None,
        };
        let Some((image, window)) = surface_image(surface, window) else {
            return;
        };
        let matrix = Affine::translate(dest.origin().to_vec2())
            * Affine::scale_non_uniform(
                dest.width() / source.width(),
                dest.height() / source.height(),
            )
            * Affine::translate(-source.origin().to_vec2())
            * Affine::translate((f64::from(window.x), f64::from(window.y)));
        let paint = Paint::Image(
            CpuImage {
                image: ImageSource::from_peniko_image_data(&image),
                sampler: sampler(surface_options.filter, peniko::Extend::Pad),
            },
            transform * matrix,
        );
        let path = transform * &dest.to_path(TOLERANCE);
        self.fill_device_path(&path, FillRule::NonZero, paint, options);
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
        self.resolve();
        let full = self.layout.size().to_int_rect();
        let clipped = source.intersect(&full);
        if clipped.is_empty() {
            return;
        }
        let dest = dest.shifted_for_clip(source, clipped);
        let all = self.read_store();
        let mut texels = Vec::with_capacity(clipped.width as usize * clipped.height as usize);
        for y in clipped.y..clipped.bottom() {
            for x in clipped.x..clipped.right() {
                texels.push(all[y as usize * full.width as usize + x as usize]);
            }
        }
        self.write_block(&texels, clipped, dest);
    }

    fn mask(&mut self, source: &Pattern, mask: &Pattern, options: &DrawOptions, transform: Affine) {
        let (Some(source), Some(mask)) =
            (Paint::new(source, transform), Paint::new(mask, transform))
        else {
            return;
        };
        let everything = to_cpu_path(&self.bounds_path());
        self.encode(is_plain(options), |ctx| {
            ctx.set_transform(CpuAffine::IDENTITY);
            ctx.set_fill_rule(FillRule::NonZero);
            ctx.push_layer(
                None,
                Some(options.composition_op),
                Some(options.alpha),
                None,
                None,
            );
            source.apply(ctx);
            ctx.fill_path(&everything);
            push_dest_in_layer(ctx);
            mask.apply(ctx);
            ctx.fill_path(&everything);
            ctx.pop_layer();
            ctx.pop_layer();
        });
    }

    fn mask_surface(
        &mut self,
        source: &Pattern,
        mask: &SourceSurfaceRef,
        offset: Point,
        options: &DrawOptions,
        transform: Affine,
    ) {
        let Some((image, _)) = surface_image(mask, None) else {
            return;
        };
        let Some(source) = Paint::new(source, transform) else {
            return;
        };
        let size = mask.size();
        let placed =
            Rect::from_origin_size(offset, (f64::from(size.width), f64::from(size.height)));
        let extent = to_cpu_path(&(transform * &placed.to_path(TOLERANCE)));
        let mask = Paint::Image(
            CpuImage {
                image: ImageSource::from_peniko_image_data(&image),
                sampler: sampler(Filter::Linear, peniko::Extend::Pad),
            },
            transform * Affine::translate(offset.to_vec2()),
        );
        self.encode(is_plain(options), |ctx| {
            ctx.set_transform(CpuAffine::IDENTITY);
            ctx.set_fill_rule(FillRule::NonZero);
            ctx.push_layer(
                Some(&extent),
                Some(options.composition_op),
                Some(options.alpha),
                None,
                None,
            );
            source.apply(ctx);
            ctx.fill_path(&extent);
            push_dest_in_layer(ctx);
            mask.apply(ctx);
            ctx.fill_path(&extent);
            ctx.pop_layer();
            ctx.pop_layer();
        });
    }

    fn push_clip(&mut self, clip: &Clip) {
        if let Some(ctx) = self.ctx.as_mut() {
            push_clip_layer(ctx, clip);
        }
        self.clips.push(clip.clone());
    }

    fn pop_clip(&mut self) {
        if self.clips.pop().is_some() {
            if let Some(ctx) = self.ctx.as_mut() {
                ctx.pop_layer();
            }
        }
    }

    fn snapshot(&mut self) -> Option<SourceSurfaceRef> {
        self.resolve();
        let size = self.layout.size();
        let bytes = self.store.read();
        let row = self.layout.row_bytes();
        let mut out = Vec::with_capacity(row * size.height as usize);
        for y in 0..size.height {
            let start = self.layout.row_offset(y);
            out.extend_from_slice(&bytes[start..start + row]);
        }
        let surface = DataSourceSurface::from_backend(
            out,
            size,
            i32::try_from(row).ok()?,
            self.layout.format(),
            SurfaceType::VelloCpu,
            self.device.clone(),
        );
        match surface {
            Ok(s) => Some(s.into_source()),
            Err(e) => {
                log::warn!("snapshot: {e}");
                None
            }
        }
    }

    fn flush(&mut self) {
        self.resolve();
    }

    fn lock_bits(&mut self) -> Option<BitsAccess> {
        self.resolve();
        Some(BitsAccess {
            pixels: self.store.clone(),
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
            self.render_mode,
            self.device.clone(),
        )?))
    }
}

/// Creates [`VelloCpuBackend`]s for a [`Factory`](understory_draw::Factory).
#[derive(Copy, Clone, Debug)]
pub struct VelloCpuProvider {
    render_mode: RenderMode,
}

impl Default for VelloCpuProvider {
    fn default() -> Self {
        Self {
            render_mode: RenderMode::OptimizeSpeed,
        }
    }
}

impl VelloCpuProvider {
    /// Provider whose backends render with `render_mode`.
    pub fn new(render_mode: RenderMode) -> Self {
        Self { render_mode }
    }
}

impl BackendProvider for VelloCpuProvider {
    fn backend_type(&self) -> BackendType {
        BackendType::VelloCpu
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
        Ok(Box::new(VelloCpuBackend::new(
            size,
            format,
            self.render_mode,
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
        Ok(Box::new(VelloCpuBackend::for_data(
            pixels,
            size,
            stride,
            format,
            self.render_mode,
        )?))
    }
}

impl Drop for VelloCpuBackend {
    fn drop(&mut self) {
        // Targets over caller memory must not lose encoded work.
        self.resolve();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use peniko::color::palette::css::{BLUE, RED};
    use understory_draw::{DrawTarget, ExtendMode, Factory, GradientStop, LinearGradientPattern};

    fn target(w: u32, h: u32) -> DrawTarget {
        let size = IntSize::new(w, h);
        Factory::new()
            .with_backend(VelloCpuProvider::default())
            .create_draw_target(BackendType::VelloCpu, size, SurfaceFormat::B8G8R8A8)
            .unwrap()
    }

    fn fill(dt: &mut DrawTarget, rect: Rect, color: peniko::Color) {
        dt.fill_rect(rect, &color.into(), &DrawOptions::default());
    }

    fn px(target: &mut DrawTarget, x: u32, y: u32) -> [u8; 4] {
        let snap = target.snapshot().unwrap();
        pixel::to_rgba8(snap.data_surface().unwrap().premul_pixel(x, y).unwrap())
    }

    #[test]
    fn fill_rect_interior_is_solid() {
        let mut dt = target(16, 16);
        fill(&mut dt, Rect::new(4.0, 4.0, 12.0, 12.0), RED);
        assert_eq!(px(&mut dt, 8, 8), [255, 0, 0, 255]);
        assert_eq!(px(&mut dt, 1, 1), [0, 0, 0, 0]);
    }

    #[test]
    fn drawing_continues_after_snapshot() {
        let mut dt = target(8, 8);
        fill(&mut dt, Rect::new(0.0, 0.0, 4.0, 8.0), RED);
        let first = dt.snapshot().unwrap();
        fill(&mut dt, Rect::new(4.0, 0.0, 8.0, 8.0), BLUE);
        assert_eq!(px(&mut dt, 1, 1), [255, 0, 0, 255]);
        assert_eq!(px(&mut dt, 6, 1), [0, 0, 255, 255]);
        let old = first.data_surface().unwrap();
        let stale = old.premul_pixel(6, 1).unwrap();
        assert_eq!(pixel::to_rgba8(stale), [0, 0, 0, 0]);
    }

    #[test]
    fn clips_survive_resolves() {
        let mut dt = target(8, 8);
        dt.push_clip_rect(Rect::new(0.0, 0.0, 4.0, 8.0));
        fill(&mut dt, Rect::new(0.0, 0.0, 8.0, 8.0), RED);
        let _ = dt.snapshot();
        fill(&mut dt, Rect::new(0.0, 0.0, 8.0, 8.0), BLUE);
        dt.pop_clip();
        assert_eq!(px(&mut dt, 1, 1), [0, 0, 255, 255]);
        assert_eq!(px(&mut dt, 6, 1), [0, 0, 0, 0]);
    }

    #[test]
    fn copy_composition_replaces_only_inside_geometry() {
        let mut dt = target(8, 8);
        fill(&mut dt, Rect::new(0.0, 0.0, 8.0, 8.0), RED);
        dt.fill_rect(
            Rect::new(0.0, 0.0, 4.0, 8.0),
            &peniko::Color::TRANSPARENT.into(),
            &DrawOptions::with_op(Compose::Copy),
        );
        assert_eq!(px(&mut dt, 1, 1), [0, 0, 0, 0]);
        assert_eq!(px(&mut dt, 6, 1), [255, 0, 0, 255]);
    }

    #[test]
    fn copy_under_clip_replaces_pixels() {
        let mut dt = target(8, 8);
        fill(&mut dt, Rect::new(0.0, 0.0, 8.0, 8.0), RED);
        dt.push_clip_rect(Rect::new(0.0, 0.0, 8.0, 8.0));
        let options = DrawOptions {
            alpha: 0.5,
            ..DrawOptions::with_op(Compose::Copy)
        };
        dt.fill_rect(Rect::new(0.0, 0.0, 8.0, 8.0), &BLUE.into(), &options);
        dt.pop_clip();
        let [r, g, b, a] = px(&mut dt, 4, 4);
        assert_eq!([r, g], [0, 0]);
        let half = |v: u8| v.abs_diff(128) <= 1;
        assert!(half(b) && half(a), "{:?}", [r, g, b, a]);
    }

    #[test]
    fn clear_rect_stays_inside_clip() {
        let mut dt = target(8, 8);
        fill(&mut dt, Rect::new(0.0, 0.0, 8.0, 8.0), RED);
        dt.push_clip_rect(Rect::new(0.0, 0.0, 4.0, 8.0));
        dt.clear_rect(Rect::new(0.0, 0.0, 8.0, 8.0));
        fill(&mut dt, Rect::new(0.0, 0.0, 8.0, 2.0), BLUE);
        dt.pop_clip();
        assert_eq!(px(&mut dt, 1, 4), [0, 0, 0, 0]);
        assert_eq!(px(&mut dt, 6, 4), [255, 0, 0, 255]);
        assert_eq!(px(&mut dt, 1, 1), [0, 0, 255, 255]);
        assert_eq!(px(&mut dt, 6, 1), [255, 0, 0, 255]);
    }

    #[test]
    fn masked_copy_under_clip_keeps_outside() {
        let mut dt = target(4, 1);
        fill(&mut dt, Rect::new(0.0, 0.0, 4.0, 1.0), RED);
        dt.push_clip_rect(Rect::new(0.0, 0.0, 2.0, 1.0));
        dt.mask(
            &BLUE.into(),
            &peniko::Color::BLACK.into(),
            &DrawOptions::with_op(Compose::Copy),
        );
        dt.pop_clip();
        assert_eq!(px(&mut dt, 0, 0), [0, 0, 255, 255]);
        assert_eq!(px(&mut dt, 3, 0), [255, 0, 0, 255]);
    }

    #[test]
    fn copy_rect_far_destination_is_dropped() {
        let mut dt = target(4, 4);
        fill(&mut dt, Rect::new(0.0, 0.0, 4.0, 4.0), RED);
        dt.copy_rect(IntRect::new(-5, 0, 8, 4), IntPoint::new(i32::MAX - 2, 0));
        assert_eq!(px(&mut dt, 0, 0), [255, 0, 0, 255]);
    }

    #[test]
    fn gradient_paint_runs_along_axis() {
        let mut dt = target(32, 4);
        let stops = dt.create_gradient_stops(
            &[GradientStop::new(0.0, RED), GradientStop::new(1.0, BLUE)],
            ExtendMode::Pad,
        );
        let g = LinearGradientPattern::new(Point::new(0.0, 0.0), Point::new(32.0, 0.0), stops);
        let row = Rect::new(0.0, 0.0, 32.0, 4.0);
        dt.fill_rect(row, &g.into(), &DrawOptions::default());
        let [r0, _, b0, _] = px(&mut dt, 0, 2);
        let [r1, _, b1, _] = px(&mut dt, 31, 2);
        assert!(r0 > 200 && b0 < 55);
        assert!(r1 < 55 && b1 > 200);
    }

    #[test]
    fn flush_writes_caller_memory() {
        let pixels = SharedPixels::new(vec![0; 4 * 4 * 4]);
        let mut dt = Factory::new()
            .with_backend(VelloCpuProvider::default())
            .create_draw_target_for_data(
                BackendType::VelloCpu,
                pixels.clone(),
                IntSize::new(4, 4),
                16,
                SurfaceFormat::R8G8B8A8,
            )
            .unwrap();
        fill(&mut dt, Rect::new(0.0, 0.0, 4.0, 4.0), RED);
        assert_eq!(&pixels.read()[..4], &[0, 0, 0, 0]);
        dt.flush();
        assert_eq!(&pixels.read()[..4], &[255, 0, 0, 255]);
    }

    #[test]
    fn alpha_only_formats_are_rejected() {
        let err = Factory::new()
            .with_backend(VelloCpuProvider::default())
            .create_draw_target(BackendType::VelloCpu, IntSize::new(4, 4), SurfaceFormat::A8)
            .unwrap_err();
        assert!(matches!(err, DrawError::UnsupportedFormat(SurfaceFormat::A8)));
    }

    #[test]
    fn locked_writes_are_drawn_over() {
        let mut dt = target(2, 1);
        let bits = dt.lock_bits().unwrap();
        bits.pixels.write()[..4].copy_from_slice(&[255, 0, 0, 255]);
        dt.release_bits(bits);
        fill(&mut dt, Rect::new(1.0, 0.0, 2.0, 1.0), RED);
        assert_eq!(px(&mut dt, 0, 0), [0, 0, 255, 255]);
        assert_eq!(px(&mut dt, 1, 0), [255, 0, 0, 255]);
    }
}

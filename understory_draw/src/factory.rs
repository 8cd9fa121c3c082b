// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Creation entry points.
//!
//! A [`Factory`] holds the backend and font providers an application links
//! in. Backends register through [`BackendProvider`]; font implementations
//! through [`FontProvider`].

use core::fmt;
use std::rc::Rc;
use std::sync::Arc;

use peniko::Blob;

use crate::dual::DualBackend;
use crate::recording::DrawEventRecorder;
use crate::surface::check_size;
use crate::{
    BackendType, DataSourceSurface, DeviceHandle, DrawBackend, DrawError, DrawTarget, FontType,
    IntSize, NativeFont, ScaledFontRef, SharedDrawTarget, SharedPixels, SurfaceFormat,
};

/// Creates backends of one kind.
pub trait BackendProvider: fmt::Debug {
    /// Kind of backend produced.
    fn backend_type(&self) -> BackendType;

    /// Backend with its own zeroed storage, optionally bound to `device`.
    fn create_backend(
        &self,
        size: IntSize,
        format: SurfaceFormat,
        device: Option<&DeviceHandle>,
    ) -> Result<Box<dyn DrawBackend>, DrawError>;

    /// Backend that renders into caller memory.
    fn create_backend_for_data(
        &self,
        pixels: SharedPixels,
        size: IntSize,
        stride: i32,
        format: SurfaceFormat,
    ) -> Result<Box<dyn DrawBackend>, DrawError> {
        let _ = (pixels, size, stride, format);
        Err(DrawError::Unsupported("drawing into caller memory"))
    }
}

/// Creates scaled fonts of one family.
pub trait FontProvider: fmt::Debug {
    /// Family produced.
    fn font_type(&self) -> FontType;

    /// Font from a provider-specific handle.
    fn create_scaled_font_for_native_font(
        &self,
        font: &NativeFont,
        size: f32,
    ) -> Result<ScaledFontRef, DrawError>;

    /// Font from raw font file data.
    fn create_scaled_font_for_truetype_data(
        &self,
        data: Blob<u8>,
        face_index: u32,
        glyph_size: f32,
    ) -> Result<ScaledFontRef, DrawError>;
}

/// Registry of providers and the entry point for creating targets,
/// surfaces and fonts.
#[derive(Debug, Default)]
pub struct Factory {
    backends: Vec<Box<dyn BackendProvider>>,
    fonts: Vec<Box<dyn FontProvider>>,
}

impl Factory {
    /// Factory with no providers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a backend provider, replacing any provider of the same kind.
    pub fn register_backend(&mut self, provider: impl BackendProvider + 'static) {
        let kind = provider.backend_type();
        self.backends.retain(|p| p.backend_type() != kind);
        self.backends.push(Box::new(provider));
    }

    /// Builder form of [`register_backend`](Self::register_backend).
    pub fn with_backend(mut self, provider: impl BackendProvider + 'static) -> Self {
        self.register_backend(provider);
        self
    }

    /// Register a font provider, replacing any provider of the same family.
    pub fn register_font_provider(&mut self, provider: impl FontProvider + 'static) {
        let kind = provider.font_type();
        self.fonts.retain(|p| p.font_type() != kind);
        self.fonts.push(Box::new(provider));
    }

    /// Builder form of [`register_font_provider`](Self::register_font_provider).
    pub fn with_font_provider(mut self, provider: impl FontProvider + 'static) -> Self {
        self.register_font_provider(provider);
        self
    }

    /// Returns `true` if `backend` can be created.
    pub fn supports_backend(&self, backend: BackendType) -> bool {
        self.provider(backend).is_ok()
    }

    fn provider(&self, backend: BackendType) -> Result<&dyn BackendProvider, DrawError> {
        self.backends
            .iter()
            .find(|p| p.backend_type() == backend)
            .map(|p| &**p)
            .ok_or(DrawError::UnsupportedBackend(backend))
    }

    fn font_provider(&self, font_type: FontType) -> Result<&dyn FontProvider, DrawError> {
        self.fonts
            .iter()
            .find(|p| p.font_type() == font_type)
            .map(|p| &**p)
            .ok_or(DrawError::Unsupported("no provider for this font type"))
    }

    /// Target with zeroed storage.
    pub fn create_draw_target(
        &self,
        backend: BackendType,
        size: IntSize,
        format: SurfaceFormat,
    ) -> Result<DrawTarget, DrawError> {
        check_size(size)?;
        let created = self.provider(backend)?.create_backend(size, format, None);
        log_failure("create_draw_target", backend, &created);
        Ok(DrawTarget::new(created?))
    }

    /// Target bound to an external device. Its snapshots become invalid when
    /// the device is lost.
    pub fn create_draw_target_with_device(
        &self,
        backend: BackendType,
        device: &DeviceHandle,
        size: IntSize,
        format: SurfaceFormat,
    ) -> Result<DrawTarget, DrawError> {
        check_size(size)?;
        let created = self
            .provider(backend)?
            .create_backend(size, format, Some(device));
        log_failure("create_draw_target_with_device", backend, &created);
        Ok(DrawTarget::new(created?))
    }

    /// Target that draws directly into caller memory. The caller keeps
    /// ownership of `pixels`.
    pub fn create_draw_target_for_data(
        &self,
        backend: BackendType,
        pixels: SharedPixels,
        size: IntSize,
        stride: i32,
        format: SurfaceFormat,
    ) -> Result<DrawTarget, DrawError> {
        check_size(size)?;
        let created = self
            .provider(backend)?
            .create_backend_for_data(pixels, size, stride, format);
        log_failure("create_draw_target_for_data", backend, &created);
        Ok(DrawTarget::new(created?))
    }

    /// New target of the same backend as `target`.
    pub fn create_similar_draw_target(
        target: &DrawTarget,
        size: IntSize,
        format: SurfaceFormat,
    ) -> Result<DrawTarget, DrawError> {
        target.create_similar_draw_target(size, format)
    }

    /// Target that forwards every call to both `a` and `b`.
    ///
    /// Both must share a backend and size. The dual target reports `a`'s
    /// backend type and snapshots `a`. The halves stay usable through their
    /// own handles; clips pushed on a half also apply to drawing through the
    /// dual target.
    pub fn create_dual_draw_target(
        a: &SharedDrawTarget,
        b: &SharedDrawTarget,
    ) -> Result<DrawTarget, DrawError> {
        let backend = DualBackend::new(Rc::clone(a), Rc::clone(b))?;
        Ok(DrawTarget::new(Box::new(backend)))
    }

    /// `target`, with every call also reported to `recorder`.
    pub fn create_recording_draw_target(
        recorder: Arc<dyn DrawEventRecorder>,
        mut target: DrawTarget,
    ) -> DrawTarget {
        target.set_recorder(recorder);
        target
    }

    /// Owned, zeroed data surface.
    pub fn create_data_source_surface(
        size: IntSize,
        format: SurfaceFormat,
    ) -> Result<DataSourceSurface, DrawError> {
        DataSourceSurface::new(size, format)
    }

    /// Data surface over caller memory. Dropping the surface never frees
    /// `pixels`.
    pub fn create_wrapping_data_source_surface(
        pixels: SharedPixels,
        stride: i32,
        size: IntSize,
        format: SurfaceFormat,
    ) -> Result<DataSourceSurface, DrawError> {
        DataSourceSurface::wrapping(pixels, size, stride, format)
    }

    /// Scaled font from a provider-specific handle.
    pub fn create_scaled_font_for_native_font(
        &self,
        font: &NativeFont,
        size: f32,
    ) -> Result<ScaledFontRef, DrawError> {
        self.font_provider(font.font_type)?
            .create_scaled_font_for_native_font(font, size)
    }

    /// Scaled font from raw font file data.
    pub fn create_scaled_font_for_truetype_data(
        &self,
        data: Blob<u8>,
        face_index: u32,
        glyph_size: f32,
        font_type: FontType,
    ) -> Result<ScaledFontRef, DrawError> {
        self.font_provider(font_type)?
            .create_scaled_font_for_truetype_data(data, face_index, glyph_size)
    }
}

fn log_failure<T>(what: &str, backend: BackendType, result: &Result<T, DrawError>) {
    if let Err(e) = result {
        log::debug!("{what}({backend:?}) failed: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryRecorder;
    use crate::target::tests::{Log, TestBackend, fill_unit};
    use core::cell::RefCell;
    use kurbo::Rect;
    use std::rc::Rc;

    #[derive(Debug)]
    struct TestProvider(BackendType);

    impl BackendProvider for TestProvider {
        fn backend_type(&self) -> BackendType {
            self.0
        }
        fn create_backend(
            &self,
            size: IntSize,
            _: SurfaceFormat,
            _: Option<&DeviceHandle>,
        ) -> Result<Box<dyn DrawBackend>, DrawError> {
            let (mut b, _) = TestBackend::new(self.0);
            b.size = size;
            Ok(Box::new(b))
        }
    }

    fn logged(kind: BackendType) -> (DrawTarget, Rc<RefCell<Log>>) {
        let (b, log) = TestBackend::new(kind);
        (DrawTarget::new(Box::new(b)), log)
    }

    #[test]
    fn unknown_backend_is_an_error() {
        let factory = Factory::new();
        let size = IntSize::new(4, 4);
        assert!(matches!(
            factory.create_draw_target(BackendType::Raster, size, SurfaceFormat::B8G8R8A8),
            Err(DrawError::UnsupportedBackend(BackendType::Raster))
        ));
    }

    #[test]
    fn invalid_size_fails_before_provider() {
        let factory = Factory::new().with_backend(TestProvider(BackendType::Reference));
        assert!(factory.supports_backend(BackendType::Reference));
        let (kind, format) = (BackendType::Reference, SurfaceFormat::B8G8R8A8);
        assert!(matches!(
            factory.create_draw_target(kind, IntSize::new(0, 4), format),
            Err(DrawError::InvalidSize(_))
        ));
        let dt = factory
            .create_draw_target(kind, IntSize::new(5, 3), format)
            .unwrap();
        assert_eq!(dt.size(), IntSize::new(5, 3));
        assert!(factory
            .create_draw_target_for_data(
                BackendType::Reference,
                SharedPixels::new(vec![0; 60]),
                IntSize::new(5, 3),
                20,
                SurfaceFormat::B8G8R8A8,
            )
            .is_err());
    }

    #[test]
    fn dual_target_forwards_to_both() {
        let (a, log_a) = logged(BackendType::Raster);
        let (b, log_b) = logged(BackendType::Raster);
        let (a, b) = (a.into_shared(), b.into_shared());
        let mut dual = Factory::create_dual_draw_target(&a, &b).unwrap();
        assert!(dual.is_dual_draw_target());
        assert_eq!(dual.backend_type(), BackendType::Raster);
        dual.push_clip_rect(Rect::new(0.0, 0.0, 2.0, 2.0));
        fill_unit(&mut dual);
        dual.pop_clip();
        let _ = dual.snapshot();
        let both = ["push_clip", "fill", "pop_clip"];
        assert_eq!(log_a.borrow().calls, [&both[..], &["snapshot"]].concat());
        assert_eq!(log_b.borrow().calls, both);
        assert!(dual.lock_bits().is_none());
    }

    #[test]
    fn dual_target_halves_stay_readable() {
        let (a, _) = logged(BackendType::Raster);
        let (b, log_b) = logged(BackendType::Raster);
        let (a, b) = (a.into_shared(), b.into_shared());
        let mut dual = Factory::create_dual_draw_target(&a, &b).unwrap();
        let before = b.borrow_mut().snapshot().unwrap();
        fill_unit(&mut dual);
        let after = b.borrow_mut().snapshot().unwrap();
        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(log_b.borrow().calls, vec!["snapshot", "fill", "snapshot"]);
        fill_unit(&mut b.borrow_mut());
        assert_eq!(log_b.borrow().calls.last(), Some(&"fill"));
    }

    #[test]
    fn dual_target_skips_locked_half() {
        let (a, log_a) = logged(BackendType::Raster);
        let (b, log_b) = logged(BackendType::Raster);
        let (a, b) = (a.into_shared(), b.into_shared());
        let mut dual = Factory::create_dual_draw_target(&a, &b).unwrap();
        let bits = b.borrow_mut().lock_bits().unwrap();
        fill_unit(&mut dual);
        b.borrow_mut().release_bits(bits);
        assert_eq!(log_a.borrow().calls, vec!["fill"]);
        assert!(!log_b.borrow().calls.contains(&"fill"));
    }

    #[test]
    fn dual_target_rejects_mismatched_backends() {
        let (a, _) = logged(BackendType::Raster);
        let (b, _) = logged(BackendType::VelloCpu);
        assert!(matches!(
            Factory::create_dual_draw_target(&a.into_shared(), &b.into_shared()),
            Err(DrawError::BackendMismatch { .. })
        ));
    }

    #[test]
    fn dropping_dual_target_pops_its_clips() {
        let (a, log_a) = logged(BackendType::Raster);
        let (b, _) = logged(BackendType::Raster);
        let (a, b) = (a.into_shared(), b.into_shared());
        let mut dual = Factory::create_dual_draw_target(&a, &b).unwrap();
        dual.push_clip_rect(Rect::new(0.0, 0.0, 1.0, 1.0));
        drop(dual);
        assert_eq!(log_a.borrow().calls, vec!["push_clip", "pop_clip"]);
        assert_eq!(a.borrow().clip_depth(), 0);
    }

    #[test]
    fn recording_target_reports_every_call() {
        let recorder = MemoryRecorder::new();
        let (inner, log) = logged(BackendType::Raster);
        let mut dt = Factory::create_recording_draw_target(recorder.clone(), inner);
        fill_unit(&mut dt);
        dt.pop_clip();
        assert_eq!(recorder.len(), 2);
        assert_eq!(log.borrow().calls, vec!["fill"]);
    }

    #[test]
    fn wrapping_surface_through_factory() {
        let pixels = SharedPixels::new(vec![0; 16]);
        let s = Factory::create_wrapping_data_source_surface(
            pixels.clone(),
            8,
            IntSize::new(2, 2),
            SurfaceFormat::B8G8R8A8,
        )
        .unwrap();
        assert!(s.pixels().ptr_eq(&pixels));
        drop(s);
        assert_eq!(pixels.handle_count(), 1);
        let empty = Factory::create_data_source_surface(IntSize::new(0, 1), SurfaceFormat::A8);
        assert!(empty.is_err());
    }

    #[test]
    fn missing_font_provider_is_an_error() {
        let factory = Factory::new();
        let font = NativeFont::new(FontType::Custom, ());
        assert!(factory.create_scaled_font_for_native_font(&font, 12.0).is_err());
    }
}

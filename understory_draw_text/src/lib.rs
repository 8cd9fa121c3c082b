// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Skrifa-backed scaled fonts for Understory Draw.
//!
//! [`SkrifaScaledFont`] reads glyph outlines from TrueType or CFF data with
//! `skrifa` and appends them to a [`PathBuilder`], so a
//! [`DrawTarget`](understory_draw::DrawTarget) can fill glyph runs like any
//! other path. [`SkrifaFontProvider`] registers the family with a
//! [`Factory`](understory_draw::Factory).
//!
//! Outlines are unhinted and scaled to the font's pixel size. Font units
//! grow upward while user space grows downward, so outlines are flipped
//! about each glyph's baseline origin.

use core::fmt;
use std::sync::Arc;

use kurbo::{Affine, Point};
use peniko::{Blob, FontData};
use skrifa::instance::Size;
use skrifa::outline::OutlinePen;
use skrifa::{FontRef, GlyphId, MetadataProvider};
use understory_draw::{
    DrawError, FontProvider, FontType, GlyphBuffer, NativeFont, PathBuilder, PathSink,
    ScaledFont, ScaledFontRef, UserData,
};

/// A font face from raw font data at a fixed pixel size.
pub struct SkrifaScaledFont {
    font: FontData,
    size: f32,
    user_data: UserData,
}

impl fmt::Debug for SkrifaScaledFont {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SkrifaScaledFont")
            .field("index", &self.font.index)
            .field("bytes", &self.font.data.len())
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

impl SkrifaScaledFont {
    /// Font over `font` at `size` pixels per em.
    ///
    /// Fails with [`DrawError::InvalidFont`] when the data does not parse as
    /// a font or the face index is out of range.
    pub fn new(font: FontData, size: f32) -> Result<Self, DrawError> {
        FontRef::from_index(font.data.as_ref(), font.index)
            .map_err(|e| DrawError::InvalidFont(e.to_string()))?;
        Ok(Self {
            font,
            size,
            user_data: UserData::default(),
        })
    }

    /// The underlying font data.
    pub fn font_data(&self) -> &FontData {
        &self.font
    }
}

/// Appends outline segments to a path builder, placing font-space `(0, 0)`
/// at `origin` and flipping y.
struct BuilderPen<'a> {
    builder: &'a mut PathBuilder,
    origin: Point,
}

impl BuilderPen<'_> {
    fn map(&self, x: f32, y: f32) -> Point {
        Point::new(self.origin.x + f64::from(x), self.origin.y - f64::from(y))
    }
}

impl OutlinePen for BuilderPen<'_> {
    fn move_to(&mut self, x: f32, y: f32) {
        let p = self.map(x, y);
        self.builder.move_to(p);
    }

    fn line_to(&mut self, x: f32, y: f32) {
        let p = self.map(x, y);
        self.builder.line_to(p);
    }

    fn quad_to(&mut self, cx0: f32, cy0: f32, x: f32, y: f32) {
        let (c, p) = (self.map(cx0, cy0), self.map(x, y));
        self.builder.quadratic_bezier_to(c, p);
    }

    fn curve_to(&mut self, cx0: f32, cy0: f32, cx1: f32, cy1: f32, x: f32, y: f32) {
        let (c0, c1, p) = (self.map(cx0, cy0), self.map(cx1, cy1), self.map(x, y));
        self.builder.bezier_to(c0, c1, p);
    }

    fn close(&mut self) {
        self.builder.close();
    }
}

impl ScaledFont for SkrifaScaledFont {
    fn font_type(&self) -> FontType {
        FontType::Skrifa
    }

    fn size(&self) -> f32 {
        self.size
    }

    /// Outlines are unhinted, so the transform hint is not consulted.
    fn copy_glyphs_to_builder(
        &self,
        buffer: &GlyphBuffer<'_>,
        builder: &mut PathBuilder,
        _transform_hint: Option<Affine>,
    ) {
        let font_ref = match FontRef::from_index(self.font.data.as_ref(), self.font.index) {
            Ok(f) => f,
            Err(e) => {
                log::warn!("copy_glyphs_to_builder: font no longer parses: {e}");
                return;
            }
        };
        let outlines = font_ref.outline_glyphs();
        let size = Size::new(self.size);
        for glyph in buffer.glyphs {
            let Some(outline) = outlines.get(GlyphId::new(glyph.index)) else {
                log::debug!("no outline for glyph {}; skipped", glyph.index);
                continue;
            };
            let mut pen = BuilderPen {
                builder: &mut *builder,
                origin: glyph.position,
            };
            if let Err(e) = outline.draw(size, &mut pen) {
                log::debug!("copy_glyphs_to_builder: glyph {}: {e}", glyph.index);
            }
        }
    }

    fn font_file_data(&self) -> Option<(Blob<u8>, u32)> {
        Some((self.font.data.clone(), self.font.index))
    }

    fn user_data(&self) -> Option<&UserData> {
        Some(&self.user_data)
    }
}

/// Creates [`SkrifaScaledFont`]s.
///
/// Native fonts for this provider carry a [`peniko::FontData`] handle.
#[derive(Copy, Clone, Debug, Default)]
pub struct SkrifaFontProvider;

impl FontProvider for SkrifaFontProvider {
    fn font_type(&self) -> FontType {
        FontType::Skrifa
    }

    fn create_scaled_font_for_native_font(
        &self,
        font: &NativeFont,
        size: f32,
    ) -> Result<ScaledFontRef, DrawError> {
        let Some(data) = font.handle.downcast_ref::<FontData>() else {
            return Err(DrawError::InvalidFont(
                "native handle is not peniko::FontData".into(),
            ));
        };
        Ok(Arc::new(SkrifaScaledFont::new(data.clone(), size)?))
    }

    fn create_scaled_font_for_truetype_data(
        &self,
        data: Blob<u8>,
        face_index: u32,
        size: f32,
    ) -> Result<ScaledFontRef, DrawError> {
        Ok(Arc::new(SkrifaScaledFont::new(
            FontData::new(data, face_index),
            size,
        )?))
    }
}

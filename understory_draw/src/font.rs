// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Scaled fonts and glyph runs.
//!
//! Text rendering goes through glyph outlines: a [`ScaledFont`] appends the
//! outlines of a [`GlyphBuffer`] to a path builder, and targets fill the
//! result. Shaping and layout happen elsewhere.

use core::any::Any;
use core::fmt;
use std::sync::Arc;

use kurbo::{Affine, Point};
use peniko::Blob;

use crate::{DrawTarget, FillRule, Path, PathBuilder, UserData};

/// A positioned glyph.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Glyph {
    /// Glyph id in the font.
    pub index: u32,
    /// Baseline origin in user space.
    pub position: Point,
}

/// Borrowed run of glyphs.
#[derive(Copy, Clone, Debug)]
pub struct GlyphBuffer<'a> {
    /// Glyphs in drawing order.
    pub glyphs: &'a [Glyph],
}

impl<'a> GlyphBuffer<'a> {
    /// Wrap a glyph slice.
    pub fn new(glyphs: &'a [Glyph]) -> Self {
        Self { glyphs }
    }
}

/// Family of font implementation.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum FontType {
    /// Outlines read with `skrifa`.
    Skrifa,
    /// Any other font provider.
    Custom,
}

/// Handle to a platform or library font object.
#[derive(Clone)]
pub struct NativeFont {
    /// Provider family that understands `handle`.
    pub font_type: FontType,
    /// Provider-specific font object.
    pub handle: Arc<dyn Any + Send + Sync>,
}

impl fmt::Debug for NativeFont {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFont")
            .field("font_type", &self.font_type)
            .finish_non_exhaustive()
    }
}

impl NativeFont {
    /// Wrap a provider-specific font object.
    pub fn new(font_type: FontType, handle: impl Any + Send + Sync) -> Self {
        Self {
            font_type,
            handle: Arc::new(handle),
        }
    }
}

/// A font at a fixed size.
pub trait ScaledFont: fmt::Debug + Send + Sync {
    /// Provider family.
    fn font_type(&self) -> FontType;

    /// Size in user units per em.
    fn size(&self) -> f32;

    /// Append the outlines of `buffer` to `builder`.
    ///
    /// `transform_hint` is the transform the glyphs will be drawn with; fonts
    /// may use it for hinting decisions but must emit geometry in user space.
    fn copy_glyphs_to_builder(
        &self,
        buffer: &GlyphBuffer<'_>,
        builder: &mut PathBuilder,
        transform_hint: Option<Affine>,
    );

    /// Outline path of `buffer`, bound to `target`'s backend.
    ///
    /// Produces the same geometry as [`copy_glyphs_to_builder`](Self::copy_glyphs_to_builder).
    fn path_for_glyphs(&self, buffer: &GlyphBuffer<'_>, target: &DrawTarget) -> Path {
        let mut builder = target.create_path_builder(FillRule::NonZero);
        self.copy_glyphs_to_builder(buffer, &mut builder, Some(target.transform()));
        builder.finish()
    }

    /// Raw font file and face index, when the font was created from data.
    fn font_file_data(&self) -> Option<(Blob<u8>, u32)> {
        None
    }

    /// Values attached to this font.
    fn user_data(&self) -> Option<&UserData> {
        None
    }
}

/// Shared handle to a scaled font.
pub type ScaledFontRef = Arc<dyn ScaledFont>;

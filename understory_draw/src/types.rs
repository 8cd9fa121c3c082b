// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Small shared vocabulary: integer geometry, backend tags and pixel formats.

use core::fmt;

use kurbo::Rect;

/// Integer size in device pixels.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct IntSize {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl fmt::Display for IntSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl IntSize {
    /// Create a new size.
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Returns `true` if either dimension is zero.
    pub const fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Number of pixels covered.
    pub const fn area(self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Rectangle at the origin with this size.
    pub fn to_int_rect(self) -> IntRect {
        IntRect::new(0, 0, clamp_i32(self.width), clamp_i32(self.height))
    }
}

/// Integer point in device pixels.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct IntPoint {
    /// Horizontal coordinate.
    pub x: i32,
    /// Vertical coordinate.
    pub y: i32,
}

impl IntPoint {
    /// Create a new point.
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Destination of the part of a copy that survives clipping.
    ///
    /// `self` is where `source` was asked to land and `clipped` is the part
    /// of `source` that can be read. The result saturates at the `i32` range.
    pub fn shifted_for_clip(self, source: IntRect, clipped: IntRect) -> Self {
        let shift = |dest: i32, clipped: i32, source: i32| {
            let v = i64::from(dest) + i64::from(clipped) - i64::from(source);
            i32::try_from(v).unwrap_or(if v < 0 { i32::MIN } else { i32::MAX })
        };
        Self::new(
            shift(self.x, clipped.x, source.x),
            shift(self.y, clipped.y, source.y),
        )
    }
}

/// Integer rectangle in device pixels, stored as origin plus size.
///
/// Rectangles with a non-positive width or height are empty.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct IntRect {
    /// Left edge.
    pub x: i32,
    /// Top edge.
    pub y: i32,
    /// Width in pixels.
    pub width: i32,
    /// Height in pixels.
    pub height: i32,
}

impl IntRect {
    /// Create a new rectangle.
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Returns `true` if the rectangle covers no pixels.
    pub const fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Exclusive right edge.
    pub const fn right(&self) -> i32 {
        self.x.saturating_add(self.width)
    }

    /// Exclusive bottom edge.
    pub const fn bottom(&self) -> i32 {
        self.y.saturating_add(self.height)
    }

    /// Intersection of two rectangles; empty (at the origin) if disjoint.
    pub fn intersect(&self, other: &Self) -> Self {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = self.right().min(other.right());
        let y1 = self.bottom().min(other.bottom());
        if x1 <= x0 || y1 <= y0 {
            return Self::default();
        }
        Self::new(x0, y0, x1 - x0, y1 - y0)
    }

    /// Returns `true` if the pixel at `(x, y)` lies inside.
    pub const fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x && y >= self.y && x < self.right() && y < self.bottom()
    }

    /// Translate by `(dx, dy)`.
    pub const fn translate(&self, dx: i32, dy: i32) -> Self {
        Self::new(
            self.x.saturating_add(dx),
            self.y.saturating_add(dy),
            self.width,
            self.height,
        )
    }

    /// Convert to a floating point rectangle.
    pub fn to_rect(&self) -> Rect {
        Rect::new(
            f64::from(self.x),
            f64::from(self.y),
            f64::from(self.right()),
            f64::from(self.bottom()),
        )
    }

    /// Smallest integer rectangle containing `rect`.
    #[allow(
        clippy::cast_possible_truncation,
        reason = "device coordinates are clamped into i32 range before the cast"
    )]
    pub fn round_out(rect: Rect) -> Self {
        let lim = f64::from(i32::MAX / 2);
        let x0 = rect.x0.floor().clamp(-lim, lim) as i32;
        let y0 = rect.y0.floor().clamp(-lim, lim) as i32;
        let x1 = rect.x1.ceil().clamp(-lim, lim) as i32;
        let y1 = rect.y1.ceil().clamp(-lim, lim) as i32;
        Self::new(x0, y0, x1 - x0, y1 - y0)
    }
}

fn clamp_i32(v: u32) -> i32 {
    i32::try_from(v).unwrap_or(i32::MAX)
}

/// Identifies which rendering technology produced an object.
///
/// Paths, gradient stop collections and draw targets carry this tag. An object
/// created for one backend is rejected by targets of another.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BackendType {
    /// Not bound to any backend.
    None,
    /// The portable scanline rasterizer.
    Raster,
    /// The Vello CPU renderer.
    VelloCpu,
    /// The recording reference backend used in tests.
    Reference,
}

/// Pixel layout of a surface.
///
/// Names list channels from the lowest byte address upward. Color channels are
/// always stored premultiplied by alpha. `X` formats ignore their fourth byte
/// and read as opaque.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum SurfaceFormat {
    /// Blue, green, red, alpha.
    #[default]
    B8G8R8A8,
    /// Blue, green, red, unused.
    B8G8R8X8,
    /// Red, green, blue, alpha.
    R8G8B8A8,
    /// Red, green, blue, unused.
    R8G8B8X8,
    /// 16-bit packed color, no alpha.
    R5G6B5,
    /// Single alpha channel.
    A8,
}

impl SurfaceFormat {
    /// Bytes used by one pixel.
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            Self::B8G8R8A8 | Self::B8G8R8X8 | Self::R8G8B8A8 | Self::R8G8B8X8 => 4,
            Self::R5G6B5 => 2,
            Self::A8 => 1,
        }
    }

    /// Returns `true` if pixels carry a meaningful alpha channel.
    pub const fn has_alpha(self) -> bool {
        matches!(self, Self::B8G8R8A8 | Self::R8G8B8A8 | Self::A8)
    }

    /// Returns `true` if pixels carry color channels.
    pub const fn has_color(self) -> bool {
        !matches!(self, Self::A8)
    }
}

/// Kind of a source surface.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SurfaceType {
    /// Plain CPU-addressable pixels.
    Data,
    /// Snapshot of a raster target.
    Raster,
    /// Snapshot of a Vello CPU target.
    VelloCpu,
    /// Snapshot of the reference backend.
    Reference,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_rect_intersection() {
        let a = IntRect::new(0, 0, 10, 10);
        let b = IntRect::new(5, 5, 10, 10);
        assert_eq!(a.intersect(&b), IntRect::new(5, 5, 5, 5));
        assert!(a.intersect(&IntRect::new(20, 20, 4, 4)).is_empty());
    }

    #[test]
    fn clipped_copy_destination_saturates() {
        let source = IntRect::new(-5, 0, 8, 4);
        let clipped = IntRect::new(0, 0, 3, 4);
        let near = IntPoint::new(10, 2).shifted_for_clip(source, clipped);
        assert_eq!(near, IntPoint::new(15, 2));
        let edge = IntPoint::new(i32::MAX - 2, 0).shifted_for_clip(source, clipped);
        assert_eq!(edge, IntPoint::new(i32::MAX, 0));
        let far = IntRect::new(i32::MIN, i32::MIN, 4, 4);
        let past = IntPoint::new(0, 0).shifted_for_clip(far, IntRect::new(0, 0, 1, 1));
        assert_eq!(past, IntPoint::new(i32::MAX, i32::MAX));
    }

    #[test]
    fn round_out_covers_fractional_edges() {
        let r = IntRect::round_out(Rect::new(0.5, 1.2, 3.1, 4.0));
        assert_eq!(r, IntRect::new(0, 1, 4, 3));
    }

    #[test]
    fn size_displays_as_dimensions() {
        assert_eq!(IntSize::new(5, 3).to_string(), "5x3");
    }

    #[test]
    fn format_sizes() {
        assert_eq!(SurfaceFormat::B8G8R8A8.bytes_per_pixel(), 4);
        assert_eq!(SurfaceFormat::R5G6B5.bytes_per_pixel(), 2);
        assert_eq!(SurfaceFormat::A8.bytes_per_pixel(), 1);
        assert!(!SurfaceFormat::R8G8B8X8.has_alpha());
        assert!(!SurfaceFormat::A8.has_color());
    }
}

// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-call option records.
//!
//! These are plain values that callers construct with `Default` and adjust
//! field by field. The defaults match what an unconfigured canvas does.

use kurbo::{Cap, Join, Stroke};
use peniko::BlendMode;

/// How a source combines with the destination. The default is source-over.
pub type CompositionOp = BlendMode;

/// Anti-aliasing request for a single call.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum AntialiasMode {
    /// No anti-aliasing; pixels are either covered or not.
    None,
    /// Grayscale coverage.
    Gray,
    /// Subpixel coverage, honored only where the target permits it.
    Subpixel,
    /// Whatever the backend prefers.
    #[default]
    Default,
}

/// Whether geometry is snapped to device pixels.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Snapping {
    /// Draw geometry exactly as given.
    #[default]
    None,
    /// Round axis-aligned rectangle edges to whole device pixels.
    Pixel,
}

/// Options shared by every paint call.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct DrawOptions {
    /// Global alpha multiplied into the source, `0..=1`.
    pub alpha: f32,
    /// Compositing operator.
    pub composition_op: CompositionOp,
    /// Anti-aliasing request.
    pub antialias_mode: AntialiasMode,
    /// Pixel snapping request.
    pub snapping: Snapping,
}

impl Default for DrawOptions {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            composition_op: BlendMode::default(),
            antialias_mode: AntialiasMode::Default,
            snapping: Snapping::None,
        }
    }
}

impl DrawOptions {
    /// Default options with the given global alpha.
    pub fn with_alpha(alpha: f32) -> Self {
        Self {
            alpha,
            ..Self::default()
        }
    }

    /// Default options with the given compositing operator.
    pub fn with_op(op: impl Into<CompositionOp>) -> Self {
        Self {
            composition_op: op.into(),
            ..Self::default()
        }
    }
}

/// Corner treatment where stroke segments meet.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum JoinStyle {
    /// Flat corner.
    Bevel,
    /// Rounded corner.
    Round,
    /// Sharp corner, limited by the miter limit.
    Miter,
    /// Sharp corner that becomes a bevel past the miter limit.
    #[default]
    MiterOrBevel,
}

/// End treatment of open stroke segments.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum CapStyle {
    /// Ends exactly at the endpoint.
    #[default]
    Butt,
    /// Half-disc past the endpoint.
    Round,
    /// Half-square past the endpoint.
    Square,
}

/// Stroke geometry parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct StrokeOptions {
    /// Line width in user units.
    pub line_width: f32,
    /// Join style.
    pub line_join: JoinStyle,
    /// Cap style.
    pub line_cap: CapStyle,
    /// Miter length limit, as a multiple of the line width.
    pub miter_limit: f32,
    /// Alternating on/off dash lengths. Empty means a solid line.
    pub dash_pattern: Vec<f32>,
    /// Distance into the dash pattern at which the stroke starts.
    pub dash_offset: f32,
}

impl Default for StrokeOptions {
    fn default() -> Self {
        Self {
            line_width: 1.0,
            line_join: JoinStyle::MiterOrBevel,
            line_cap: CapStyle::Butt,
            miter_limit: 10.0,
            dash_pattern: Vec::new(),
            dash_offset: 0.0,
        }
    }
}

impl StrokeOptions {
    /// Default options with the given width.
    pub fn with_width(line_width: f32) -> Self {
        Self {
            line_width,
            ..Self::default()
        }
    }

    /// Returns `true` if the dash pattern describes a usable dash.
    ///
    /// Patterns with negative entries or a zero total length draw solid.
    pub fn is_dashed(&self) -> bool {
        !self.dash_pattern.is_empty()
            && self.dash_pattern.iter().all(|d| d.is_finite() && *d >= 0.0)
            && self.dash_pattern.iter().sum::<f32>() > 0.0
    }

    /// Equivalent `kurbo` stroke style.
    ///
    /// `kurbo` has no clipped miter, so both miter styles map to its miter
    /// join, which falls back to a bevel past the limit.
    pub fn to_kurbo(&self) -> Stroke {
        let join = match self.line_join {
            JoinStyle::Bevel => Join::Bevel,
            JoinStyle::Round => Join::Round,
            JoinStyle::Miter | JoinStyle::MiterOrBevel => Join::Miter,
        };
        let cap = match self.line_cap {
            CapStyle::Butt => Cap::Butt,
            CapStyle::Round => Cap::Round,
            CapStyle::Square => Cap::Square,
        };
        let stroke = Stroke::new(f64::from(self.line_width.max(0.0)))
            .with_join(join)
            .with_caps(cap)
            .with_miter_limit(f64::from(self.miter_limit.max(1.0)));
        if self.is_dashed() {
            stroke.with_dashes(
                f64::from(self.dash_offset),
                self.dash_pattern.iter().map(|d| f64::from(*d)),
            )
        } else {
            stroke
        }
    }
}

/// Sampling filter for surface patterns and surface draws.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Filter {
    /// Best quality the backend offers.
    Good,
    /// Bilinear filtering.
    #[default]
    Linear,
    /// Nearest neighbor.
    Point,
}

/// Whether surface sampling may read outside the source rectangle.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum SamplingBounds {
    /// Filters may read neighboring pixels outside the source rectangle.
    #[default]
    Unbounded,
    /// Sampling is clamped to the source rectangle.
    Bounded,
}

/// Options for `DrawTarget::draw_surface`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct DrawSurfaceOptions {
    /// Sampling filter.
    pub filter: Filter,
    /// Sampling bounds.
    pub sampling_bounds: SamplingBounds,
}

// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use understory_draw::{
    ExtendMode, FillRule, GradientStop, GradientStops, LinearGradientPattern, PathSink,
};

use super::*;

/// A linear gradient whose endpoints coincide paints its last stop.
pub(super) struct ZeroLengthLinearGradient;

impl ConformanceCase for ZeroLengthLinearGradient {
    fn name(&self) -> &'static str {
        "gradient_zero_length_linear"
    }

    fn run(&self, factory: &Factory, backend: BackendType) -> Result<(), String> {
        let mut target = new_target(factory, backend)?;
        let stops = target.create_gradient_stops(
            &[
                GradientStop::new(0.0, RED),
                GradientStop::new(0.5, RED),
                GradientStop::new(1.0, BLUE),
            ],
            ExtendMode::Pad,
        );
        let at = Point::new(16.0, 16.0);
        let pattern = Pattern::from(LinearGradientPattern::new(at, at, stops));

        let mut builder = target.create_path_builder(FillRule::NonZero);
        builder.move_to(Point::new(2.0, 2.0));
        builder.line_to(Point::new(30.0, 4.0));
        builder.line_to(Point::new(16.0, 30.0));
        builder.close();
        let path = builder.finish();
        target.fill(&path, &pattern, &DrawOptions::default());

        for p in [(16, 10), (16, 20), (10, 8)] {
            expect_pixel(&mut target, p, BLUE_PX, "degenerate gradient")?;
        }
        Ok(())
    }
}

/// Pad extension holds the end colors beyond the gradient line.
pub(super) struct LinearGradientEndpoints;

impl ConformanceCase for LinearGradientEndpoints {
    fn name(&self) -> &'static str {
        "gradient_linear_endpoints"
    }

    fn run(&self, factory: &Factory, backend: BackendType) -> Result<(), String> {
        let mut target = new_target(factory, backend)?;
        let stops = target.create_gradient_stops(
            &[GradientStop::new(0.0, RED), GradientStop::new(1.0, BLUE)],
            ExtendMode::Pad,
        );
        let pattern = Pattern::from(LinearGradientPattern::new(
            Point::new(8.0, 0.0),
            Point::new(24.0, 0.0),
            stops,
        ));
        target.fill_rect(full_rect(), &pattern, &DrawOptions::default());
        expect_pixel(&mut target, (2, 16), RED_PX, "before start")?;
        expect_pixel(&mut target, (29, 16), BLUE_PX, "after end")?;
        let mid = pixel_at(&mut target, 16, 16)?;
        ensure(mid[0] > 64 && mid[2] > 64 && mid[3] == 255, || {
            format!("midpoint {mid:?} is not a blend of both stops")
        })
    }
}

/// Gradient stops created for another backend make the draw a no-op.
pub(super) struct ForeignGradientStopsDropCall;

impl ConformanceCase for ForeignGradientStopsDropCall {
    fn name(&self) -> &'static str {
        "gradient_foreign_stops_drop_call"
    }

    fn supports_backend(&self, backend: BackendType) -> bool {
        backend != BackendType::Reference
    }

    fn run(&self, factory: &Factory, backend: BackendType) -> Result<(), String> {
        let mut target = new_target(factory, backend)?;
        fill_solid(&mut target, full_rect(), blue());
        let stops = GradientStops::new(
            &[GradientStop::new(0.0, RED), GradientStop::new(1.0, RED)],
            ExtendMode::Pad,
            BackendType::Reference,
        );
        let pattern = Pattern::from(LinearGradientPattern::new(
            Point::new(0.0, 0.0),
            Point::new(32.0, 0.0),
            stops,
        ));
        target.fill_rect(full_rect(), &pattern, &DrawOptions::default());
        expect_pixel(&mut target, (16, 16), BLUE_PX, "after foreign fill")
    }
}

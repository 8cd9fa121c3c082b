// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use understory_draw::{CapStyle, StrokeOptions};

use super::*;

/// A butt-capped line covers exactly its width around the segment.
pub(super) struct StrokeLineCoversSegment;

impl ConformanceCase for StrokeLineCoversSegment {
    fn name(&self) -> &'static str {
        "stroke_line_covers_segment"
    }

    fn run(&self, factory: &Factory, backend: BackendType) -> Result<(), String> {
        let mut target = new_target(factory, backend)?;
        target.stroke_line(
            Point::new(4.0, 16.0),
            Point::new(28.0, 16.0),
            &red(),
            &StrokeOptions::with_width(4.0),
            &DrawOptions::default(),
        );
        expect_pixel(&mut target, (16, 14), RED_PX, "upper half")?;
        expect_pixel(&mut target, (16, 17), RED_PX, "lower half")?;
        expect_pixel(&mut target, (16, 12), CLEAR_PX, "above")?;
        expect_pixel(&mut target, (16, 19), CLEAR_PX, "below")?;
        expect_pixel(&mut target, (2, 16), CLEAR_PX, "before butt cap")?;
        expect_pixel(&mut target, (29, 16), CLEAR_PX, "after butt cap")
    }
}

/// Dashes alternate on and off along the line.
pub(super) struct DashedStrokeLeavesGaps;

impl ConformanceCase for DashedStrokeLeavesGaps {
    fn name(&self) -> &'static str {
        "stroke_dashes_leave_gaps"
    }

    fn run(&self, factory: &Factory, backend: BackendType) -> Result<(), String> {
        let mut target = new_target(factory, backend)?;
        let stroke = StrokeOptions {
            dash_pattern: vec![4.0, 4.0],
            ..StrokeOptions::with_width(4.0)
        };
        target.stroke_line(
            Point::new(0.0, 16.0),
            Point::new(32.0, 16.0),
            &blue(),
            &stroke,
            &DrawOptions::default(),
        );
        for x in [1, 9, 17, 25] {
            expect_pixel(&mut target, (x, 16), BLUE_PX, "dash")?;
        }
        for x in [5, 13, 21, 29] {
            expect_pixel(&mut target, (x, 16), CLEAR_PX, "gap")?;
        }

        // Shifting the phase by one dash swaps dashes and gaps.
        target.clear_rect(full_rect());
        let shifted = StrokeOptions {
            dash_offset: 4.0,
            ..stroke
        };
        target.stroke_line(
            Point::new(0.0, 16.0),
            Point::new(32.0, 16.0),
            &blue(),
            &shifted,
            &DrawOptions::default(),
        );
        expect_pixel(&mut target, (1, 16), CLEAR_PX, "shifted gap")?;
        expect_pixel(&mut target, (5, 16), BLUE_PX, "shifted dash")
    }
}

/// Square caps extend each end by half the width.
pub(super) struct SquareCapsExtendEnds;

impl ConformanceCase for SquareCapsExtendEnds {
    fn name(&self) -> &'static str {
        "stroke_square_caps_extend_ends"
    }

    fn run(&self, factory: &Factory, backend: BackendType) -> Result<(), String> {
        let mut target = new_target(factory, backend)?;
        let stroke = StrokeOptions {
            line_cap: CapStyle::Square,
            ..StrokeOptions::with_width(4.0)
        };
        target.stroke_line(
            Point::new(8.0, 16.0),
            Point::new(24.0, 16.0),
            &red(),
            &stroke,
            &DrawOptions::default(),
        );
        expect_pixel(&mut target, (6, 16), RED_PX, "start cap")?;
        expect_pixel(&mut target, (25, 16), RED_PX, "end cap")?;
        expect_pixel(&mut target, (4, 16), CLEAR_PX, "past start cap")?;
        expect_pixel(&mut target, (27, 16), CLEAR_PX, "past end cap")
    }
}

// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use super::*;

/// Nested clip rects bound a fill to their intersection.
pub(super) struct ClipRectsIntersect;

impl ConformanceCase for ClipRectsIntersect {
    fn name(&self) -> &'static str {
        "clip_rects_intersect"
    }

    fn run(&self, factory: &Factory, backend: BackendType) -> Result<(), String> {
        let mut target = new_target(factory, backend)?;
        target.push_clip_rect(Rect::new(0.0, 0.0, 20.0, 20.0));
        target.push_clip_rect(Rect::new(10.0, 10.0, 30.0, 30.0));
        fill_solid(&mut target, full_rect(), red());
        target.pop_clip();
        target.pop_clip();

        expect_pixel(&mut target, (15, 15), RED_PX, "inside both")?;
        expect_pixel(&mut target, (5, 5), CLEAR_PX, "outside inner")?;
        expect_pixel(&mut target, (25, 25), CLEAR_PX, "outside outer")?;
        expect_pixel(&mut target, (10, 19), RED_PX, "intersection corner")
    }
}

/// Popping with nothing pushed leaves the target unclipped.
pub(super) struct ClipExtraPopIsIgnored;

impl ConformanceCase for ClipExtraPopIsIgnored {
    fn name(&self) -> &'static str {
        "clip_extra_pop_is_ignored"
    }

    fn run(&self, factory: &Factory, backend: BackendType) -> Result<(), String> {
        let mut target = new_target(factory, backend)?;
        target.push_clip_rect(Rect::new(0.0, 0.0, 8.0, 8.0));
        target.pop_clip();
        target.pop_clip();
        target.pop_clip();
        ensure(target.clip_depth() == 0, || {
            format!("clip depth {} after extra pops", target.clip_depth())
        })?;
        fill_solid(&mut target, full_rect(), blue());
        expect_pixel(&mut target, (24, 24), BLUE_PX, "unclipped fill")?;

        // A clip pushed after the extra pops still works.
        target.push_clip_rect(Rect::new(0.0, 0.0, 16.0, 32.0));
        fill_solid(&mut target, full_rect(), red());
        target.pop_clip();
        expect_pixel(&mut target, (4, 16), RED_PX, "clipped fill")?;
        expect_pixel(&mut target, (24, 16), BLUE_PX, "outside clip")
    }
}

/// `clear_rect` only clears inside the current clip.
pub(super) struct ClearRectRespectsClip;

impl ConformanceCase for ClearRectRespectsClip {
    fn name(&self) -> &'static str {
        "clip_clear_rect_respects_clip"
    }

    fn run(&self, factory: &Factory, backend: BackendType) -> Result<(), String> {
        let mut target = new_target(factory, backend)?;
        fill_solid(&mut target, full_rect(), red());
        target.push_clip_rect(Rect::new(0.0, 0.0, 16.0, 32.0));
        target.clear_rect(full_rect());
        target.pop_clip();
        expect_pixel(&mut target, (8, 8), CLEAR_PX, "cleared half")?;
        expect_pixel(&mut target, (24, 8), RED_PX, "kept half")
    }
}

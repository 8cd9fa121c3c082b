// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use kurbo::Affine;
use understory_draw::{DataSourceSurface, IntPoint, IntRect};

use super::*;

/// `copy_rect` moves device pixels 1:1 whatever the transform and clip.
pub(super) struct CopyRectIgnoresTransformAndClip;

impl ConformanceCase for CopyRectIgnoresTransformAndClip {
    fn name(&self) -> &'static str {
        "copy_rect_ignores_transform_and_clip"
    }

    fn run(&self, factory: &Factory, backend: BackendType) -> Result<(), String> {
        let mut target = new_target(factory, backend)?;
        fill_solid(&mut target, Rect::new(0.0, 0.0, 4.0, 8.0), red());
        fill_solid(&mut target, Rect::new(4.0, 0.0, 8.0, 8.0), blue());

        target.set_transform(Affine::rotate(0.7).then_scale(3.0));
        target.push_clip_rect(Rect::new(0.0, 0.0, 1.0, 1.0));
        target.copy_rect(IntRect::new(0, 0, 8, 8), IntPoint::new(20, 20));
        target.pop_clip();

        expect_pixel(&mut target, (21, 21), RED_PX, "copied left half")?;
        expect_pixel(&mut target, (23, 27), RED_PX, "copied left half")?;
        expect_pixel(&mut target, (24, 20), BLUE_PX, "copied right half")?;
        expect_pixel(&mut target, (27, 27), BLUE_PX, "copied right half")?;
        expect_pixel(&mut target, (28, 28), CLEAR_PX, "past the copy")?;
        expect_pixel(&mut target, (19, 24), CLEAR_PX, "before the copy")
    }
}

/// `copy_surface` replaces destination pixels, including their alpha.
pub(super) struct CopySurfaceIsUnscaled;

impl ConformanceCase for CopySurfaceIsUnscaled {
    fn name(&self) -> &'static str {
        "copy_surface_is_unscaled"
    }

    fn run(&self, factory: &Factory, backend: BackendType) -> Result<(), String> {
        let mut target = new_target(factory, backend)?;
        fill_solid(&mut target, full_rect(), red());

        let surface = DataSourceSurface::new(IntSize::new(4, 4), TARGET_FORMAT)
            .map_err(|e| e.to_string())?;
        {
            let mut map = surface.map_mut();
            let blue: pixel::Premul = [0.0, 0.0, 1.0, 1.0];
            for y in 0..2 {
                for x in 0..4 {
                    map.set_premul(x, y, blue);
                }
            }
        }
        let surface = surface.into_source();

        target.set_transform(Affine::scale(4.0));
        target.copy_surface(&surface, IntRect::new(0, 0, 4, 4), IntPoint::new(10, 10));

        expect_pixel(&mut target, (10, 10), BLUE_PX, "opaque rows")?;
        expect_pixel(&mut target, (13, 11), BLUE_PX, "opaque rows")?;
        expect_pixel(&mut target, (11, 12), CLEAR_PX, "transparent rows")?;
        expect_pixel(&mut target, (14, 10), RED_PX, "right of the copy")?;
        expect_pixel(&mut target, (10, 14), RED_PX, "below the copy")
    }
}

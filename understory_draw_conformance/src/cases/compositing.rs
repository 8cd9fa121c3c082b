// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use kurbo::Vec2;
use peniko::color::palette::css::BLACK;
use understory_draw::{BlendMode, DataSourceSurface, SourceSurfaceRef};

use super::*;

/// Surface whose pixels in `[x0, x1) x [y0, y1)` are `color`, transparent elsewhere.
fn block_surface(
    size: IntSize,
    x0: u32,
    y0: u32,
    x1: u32,
    y1: u32,
    color: pixel::Premul,
) -> Result<SourceSurfaceRef, String> {
    let surface = DataSourceSurface::new(size, TARGET_FORMAT).map_err(|e| e.to_string())?;
    {
        let mut map = surface.map_mut();
        for y in y0..y1 {
            for x in x0..x1 {
                map.set_premul(x, y, color);
            }
        }
    }
    Ok(surface.into_source())
}

/// `mask_surface` paints through the mask's alpha and nowhere outside it.
pub(super) struct MaskSurfaceUsesAlpha;

impl ConformanceCase for MaskSurfaceUsesAlpha {
    fn name(&self) -> &'static str {
        "mask_surface_uses_alpha"
    }

    fn run(&self, factory: &Factory, backend: BackendType) -> Result<(), String> {
        let mut target = new_target(factory, backend)?;
        let mask = block_surface(IntSize::new(8, 8), 0, 0, 4, 8, [1.0; 4])?;
        let offset = Point::new(8.0, 8.0);
        target.mask_surface(&blue(), &mask, offset, &DrawOptions::default());

        expect_pixel(&mut target, (9, 10), BLUE_PX, "opaque mask")?;
        expect_pixel(&mut target, (13, 10), CLEAR_PX, "transparent mask")?;
        expect_pixel(&mut target, (4, 4), CLEAR_PX, "outside mask")?;
        expect_pixel(&mut target, (20, 20), CLEAR_PX, "outside mask")
    }
}

/// The shadow lands at the offset and the surface itself is drawn unblurred.
pub(super) struct ShadowSitsUnderSurface;

impl ConformanceCase for ShadowSitsUnderSurface {
    fn name(&self) -> &'static str {
        "shadow_sits_under_surface"
    }

    fn run(&self, factory: &Factory, backend: BackendType) -> Result<(), String> {
        let mut target = new_target(factory, backend)?;
        let surface = block_surface(IntSize::new(12, 12), 4, 4, 8, 8, [1.0, 0.0, 0.0, 1.0])?;
        target.draw_surface_with_shadow(
            &surface,
            Point::new(2.0, 2.0),
            BLACK,
            Vec2::new(14.0, 14.0),
            1.0,
            BlendMode::default(),
        );

        expect_pixel(&mut target, (8, 8), RED_PX, "surface")?;
        let shadow = pixel_at(&mut target, 22, 22)?;
        ensure(
            shadow[3] > 128 && shadow[..3].iter().all(|c| *c < 8),
            || format!("shadow center is {shadow:?}"),
        )?;
        expect_pixel(&mut target, (28, 4), CLEAR_PX, "away from both")
    }
}

/// A global alpha of one half scales a solid fill to half coverage.
pub(super) struct GroupAlphaHalvesCoverage;

impl ConformanceCase for GroupAlphaHalvesCoverage {
    fn name(&self) -> &'static str {
        "alpha_halves_coverage"
    }

    fn run(&self, factory: &Factory, backend: BackendType) -> Result<(), String> {
        let mut target = new_target(factory, backend)?;
        target.fill_rect(full_rect(), &red(), &DrawOptions::with_alpha(0.5));
        expect_pixel(&mut target, (16, 16), [128, 0, 0, 128], "half red")
    }
}

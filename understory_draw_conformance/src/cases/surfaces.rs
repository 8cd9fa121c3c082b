// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use understory_draw::{
    DataSourceSurface, DrawSurfaceOptions, Filter, SamplingBounds, SharedPixels,
    SourceSurfaceRef,
};

use super::*;

fn surface_bytes(surface: &SourceSurfaceRef) -> Result<Vec<u8>, String> {
    let data = surface
        .data_surface()
        .ok_or("surface has no data surface")?;
    let map = data.map();
    let height = map.layout().size().height;
    Ok((0..height).flat_map(|y| map.row(y).to_vec()).collect())
}

/// Wrapping surfaces borrow caller memory and never release it.
pub(super) struct WrappingSurfaceKeepsCallerMemory;

impl ConformanceCase for WrappingSurfaceKeepsCallerMemory {
    fn name(&self) -> &'static str {
        "surface_wrapping_keeps_caller_memory"
    }

    fn run(&self, factory: &Factory, backend: BackendType) -> Result<(), String> {
        // Opaque red in B8G8R8A8 byte order.
        let bytes: Vec<u8> = [0, 0, 255, 255].repeat(8 * 8);
        let pixels = SharedPixels::new(bytes);
        let mut target = new_target(factory, backend)?;

        for i in 0..8_u8 {
            let surface = Factory::create_wrapping_data_source_surface(
                pixels.clone(),
                32,
                IntSize::new(8, 8),
                TARGET_FORMAT,
            )
            .map_err(|e| format!("wrapping surface {i}: {e}"))?;
            ensure(surface.is_wrapping(), || "surface is not wrapping".into())?;
            let at = f64::from(i) * 2.0;
            target.draw_surface(
                &surface.into_source(),
                Rect::new(at, at, at + 8.0, at + 8.0),
                Rect::new(0.0, 0.0, 8.0, 8.0),
                &DrawSurfaceOptions {
                    filter: Filter::Point,
                    ..DrawSurfaceOptions::default()
                },
                &DrawOptions::default(),
            );
        }
        expect_pixel(&mut target, (4, 4), RED_PX, "first copy")?;
        expect_pixel(&mut target, (20, 20), RED_PX, "last copy")?;
        drop(target);

        ensure(pixels.handle_count() == 1, || {
            format!("{} handles still alive", pixels.handle_count())
        })?;
        let intact = pixels.read().chunks_exact(4).all(|px| px == [0, 0, 255, 255]);
        ensure(intact, || "caller memory was modified".into())
    }
}

/// Snapshots without drawing in between have identical pixels, and a
/// snapshot does not change when the target is drawn to afterwards.
pub(super) struct RepeatedSnapshotsMatch;

impl ConformanceCase for RepeatedSnapshotsMatch {
    fn name(&self) -> &'static str {
        "surface_repeated_snapshots_match"
    }

    fn run(&self, factory: &Factory, backend: BackendType) -> Result<(), String> {
        let mut target = new_target(factory, backend)?;
        fill_solid(&mut target, Rect::new(4.0, 4.0, 20.0, 12.0), red());

        let first = target.snapshot().ok_or("first snapshot")?;
        let second = target.snapshot().ok_or("second snapshot")?;
        let before = surface_bytes(&first)?;
        ensure(surface_bytes(&second)? == before, || {
            "back-to-back snapshots differ".into()
        })?;

        fill_solid(&mut target, full_rect(), blue());
        let third = target.snapshot().ok_or("third snapshot")?;
        ensure(surface_bytes(&first)? == before, || {
            "drawing changed an earlier snapshot".into()
        })?;
        ensure(surface_bytes(&third)? != before, || {
            "snapshot after drawing is unchanged".into()
        })
    }
}

/// Bounded sampling never bleeds pixels from outside the source rect.
pub(super) struct BoundedDrawSurface;

impl ConformanceCase for BoundedDrawSurface {
    fn name(&self) -> &'static str {
        "surface_bounded_draw_surface"
    }

    fn run(&self, factory: &Factory, backend: BackendType) -> Result<(), String> {
        let mut target = new_target(factory, backend)?;
        let surface = DataSourceSurface::new(IntSize::new(4, 2), TARGET_FORMAT)
            .map_err(|e| e.to_string())?;
        {
            let mut map = surface.map_mut();
            for y in 0..2 {
                for x in 0..4 {
                    let color = if x < 2 {
                        [1.0, 0.0, 0.0, 1.0]
                    } else {
                        [0.0, 0.0, 1.0, 1.0]
                    };
                    map.set_premul(x, y, color);
                }
            }
        }
        target.draw_surface(
            &surface.into_source(),
            full_rect(),
            Rect::new(0.0, 0.0, 2.0, 2.0),
            &DrawSurfaceOptions {
                filter: Filter::Linear,
                sampling_bounds: SamplingBounds::Bounded,
            },
            &DrawOptions::default(),
        );
        for p in [(0, 0), (16, 16), (31, 16), (31, 31)] {
            expect_pixel(&mut target, p, RED_PX, "bounded sample")?;
        }
        Ok(())
    }
}

/// Writes through locked bits show up once released; draws while locked
/// are dropped.
pub(super) struct LockBitsRoundTrip;

impl ConformanceCase for LockBitsRoundTrip {
    fn name(&self) -> &'static str {
        "surface_lock_bits_round_trip"
    }

    fn run(&self, factory: &Factory, backend: BackendType) -> Result<(), String> {
        let mut target = new_target(factory, backend)?;
        fill_solid(&mut target, full_rect(), red());

        let bits = target.lock_bits().ok_or("lock_bits returned nothing")?;
        ensure(target.is_locked(), || "target not locked".into())?;
        ensure(target.lock_bits().is_none(), || {
            "second lock succeeded".into()
        })?;
        ensure(target.snapshot().is_none(), || {
            "snapshot while locked".into()
        })?;
        fill_solid(&mut target, full_rect(), blue());
        {
            // Opaque blue in B8G8R8A8 byte order at (0, 0).
            let mut store = bits.pixels.write();
            store[..4].copy_from_slice(&[255, 0, 0, 255]);
        }
        target.release_bits(bits);

        ensure(!target.is_locked(), || "target still locked".into())?;
        expect_pixel(&mut target, (0, 0), BLUE_PX, "written through lock")?;
        expect_pixel(&mut target, (16, 16), RED_PX, "draw while locked")
    }
}

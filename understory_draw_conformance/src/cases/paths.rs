// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::panic::{AssertUnwindSafe, catch_unwind};

use kurbo::Affine;
use understory_draw::{FillRule, PathSink};

use super::*;

/// Writing to a finished builder is a contract violation and must panic.
pub(super) struct BuilderRejectsWritesAfterFinish;

impl ConformanceCase for BuilderRejectsWritesAfterFinish {
    fn name(&self) -> &'static str {
        "path_builder_rejects_writes_after_finish"
    }

    fn run(&self, factory: &Factory, backend: BackendType) -> Result<(), String> {
        let target = new_target(factory, backend)?;
        let mut builder = target.create_path_builder(FillRule::NonZero);
        builder.move_to(Point::new(0.0, 0.0));
        builder.line_to(Point::new(4.0, 0.0));
        let path = builder.finish();
        ensure(builder.is_finished(), || "builder not finished".into())?;
        ensure(path.backend_type() == backend, || {
            format!("path tagged {:?}", path.backend_type())
        })?;
        let wrote = catch_unwind(AssertUnwindSafe(|| {
            builder.line_to(Point::new(8.0, 8.0));
        }));
        ensure(wrote.is_err(), || "write after finish did not panic".into())
    }
}

/// Bounds contain the geometry and containment follows the fill.
pub(super) struct PathBoundsAndContainment;

impl ConformanceCase for PathBoundsAndContainment {
    fn name(&self) -> &'static str {
        "path_bounds_and_containment"
    }

    fn run(&self, factory: &Factory, backend: BackendType) -> Result<(), String> {
        let target = new_target(factory, backend)?;
        let mut builder = target.create_path_builder(FillRule::NonZero);
        builder.move_to(Point::new(0.0, 0.0));
        builder.line_to(Point::new(10.0, 0.0));
        builder.line_to(Point::new(10.0, 10.0));
        builder.close();
        let path = builder.finish();

        let bounds = path.bounds(Affine::IDENTITY);
        ensure(
            bounds.x0 <= 0.0 && bounds.y0 <= 0.0 && bounds.x1 >= 10.0 && bounds.y1 >= 10.0,
            || format!("bounds {bounds:?} do not contain the triangle"),
        )?;
        ensure(
            path.contains_point(Point::new(7.0, 3.0), Affine::IDENTITY),
            || "interior point reported outside".into(),
        )?;
        ensure(
            !path.contains_point(Point::new(20.0, 20.0), Affine::IDENTITY),
            || "far point reported inside".into(),
        )?;
        ensure(
            path.contains_point(Point::new(27.0, 3.0), Affine::translate((20.0, 0.0))),
            || "transformed containment ignored the transform".into(),
        )
    }
}

/// Copies keep the geometry and may change the fill rule.
pub(super) struct CopyToBuilderOverridesFillRule;

impl ConformanceCase for CopyToBuilderOverridesFillRule {
    fn name(&self) -> &'static str {
        "path_copy_to_builder_overrides_fill_rule"
    }

    fn run(&self, factory: &Factory, backend: BackendType) -> Result<(), String> {
        let mut target = new_target(factory, backend)?;
        // Two nested squares with the same winding.
        let mut builder = target.create_path_builder(FillRule::NonZero);
        for (lo, hi) in [(2.0, 30.0), (10.0, 22.0)] {
            builder.move_to(Point::new(lo, lo));
            builder.line_to(Point::new(hi, lo));
            builder.line_to(Point::new(hi, hi));
            builder.line_to(Point::new(lo, hi));
            builder.close();
        }
        let nonzero = builder.finish();
        let even_odd = nonzero.copy_to_builder(FillRule::EvenOdd).finish();
        ensure(even_odd.fill_rule() == FillRule::EvenOdd, || {
            "copy kept the old fill rule".into()
        })?;

        target.fill(&nonzero, &red(), &DrawOptions::default());
        expect_pixel(&mut target, (16, 16), RED_PX, "non-zero center")?;
        target.clear_rect(full_rect());
        target.fill(&even_odd, &red(), &DrawOptions::default());
        expect_pixel(&mut target, (16, 16), CLEAR_PX, "even-odd hole")?;
        expect_pixel(&mut target, (5, 16), RED_PX, "even-odd ring")
    }
}

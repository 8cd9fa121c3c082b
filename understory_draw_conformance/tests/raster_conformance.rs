// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Conformance cases for `understory_draw_raster`.

#![cfg(feature = "raster")]

use understory_draw::{BackendType, Factory};
use understory_draw_raster::{RasterProvider, RasterSettings};

mod common;

#[test]
fn conformance() {
    let factory = Factory::new().with_backend(RasterProvider::default());
    let mut errors = Vec::new();
    common::run_cases(&factory, BackendType::Raster, &mut errors);
    common::assert_no_conformance_errors(BackendType::Raster, errors);
}

#[test]
fn conformance_with_dense_sampling() {
    let factory = Factory::new().with_backend(RasterProvider::new(RasterSettings {
        samples_per_axis: 16,
        ..RasterSettings::default()
    }));
    let mut errors = Vec::new();
    common::run_cases(&factory, BackendType::Raster, &mut errors);
    common::assert_no_conformance_errors(BackendType::Raster, errors);
}

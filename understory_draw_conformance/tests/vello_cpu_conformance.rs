// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Conformance cases for `understory_draw_vello_cpu`.

#![cfg(feature = "vello_cpu")]

use understory_draw::{BackendType, Factory};
use understory_draw_vello_cpu::VelloCpuProvider;

mod common;

#[test]
fn conformance() {
    let factory = Factory::new().with_backend(VelloCpuProvider::default());
    let mut errors = Vec::new();
    common::run_cases(&factory, BackendType::VelloCpu, &mut errors);
    common::assert_no_conformance_errors(BackendType::VelloCpu, errors);
}

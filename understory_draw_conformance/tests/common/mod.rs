// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Shared helpers for conformance integration tests.

#![allow(
    missing_docs,
    reason = "Integration-test helper module; not part of the public API."
)]

use understory_draw::{BackendType, Factory};
use understory_draw_conformance::cases::selected_cases_for_backend;

/// Run every selected case against `backend`, collecting failures.
pub(crate) fn run_cases(factory: &Factory, backend: BackendType, errors: &mut Vec<String>) {
    for case in selected_cases_for_backend(backend) {
        if let Err(e) = case.run(factory, backend) {
            errors.push(format!("`{}`: {e}", case.name()));
        }
    }
}

pub(crate) fn assert_no_conformance_errors(backend: BackendType, errors: Vec<String>) {
    if errors.is_empty() {
        return;
    }

    eprintln!(
        "Conformance failures for {backend:?} (use `UNDERSTORY_DRAW_CASE=<name>` to rerun one case):"
    );
    for error in &errors {
        eprintln!("  - {error}");
    }
    panic!("conformance failures: {}", errors.len());
}

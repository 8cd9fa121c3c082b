// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Development-only conformance cases for `understory_draw` backends.
//!
//! Each case drives a [`DrawTarget`](understory_draw::DrawTarget) through the
//! public API and checks pixels of its snapshot, so the same expectations hold
//! for every backend that produces pixels.
//!
//! ## Backends
//!
//! - `raster` (default)
//! - `vello_cpu` (default)
//!
//! ## Run tests
//!
//! - Raster: `cargo test -p understory_draw_conformance --test raster_conformance`
//! - Vello CPU: `cargo test -p understory_draw_conformance --test vello_cpu_conformance`
//!
//! ## Filter cases
//!
//! To run only a subset of cases, set `UNDERSTORY_DRAW_CASE` (supports `*` globs):
//!
//! - Single case: `UNDERSTORY_DRAW_CASE=copy_rect_ignores_transform_and_clip`
//! - Prefix: `UNDERSTORY_DRAW_CASE='clip_*'`
//! - Multiple patterns (comma/whitespace-separated): `UNDERSTORY_DRAW_CASE='clip_*,path_*'`

#![allow(
    missing_docs,
    reason = "development-only crate; conformance cases are self-documenting via their names"
)]

pub mod cases;

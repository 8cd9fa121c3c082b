// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use kurbo::{Point, Rect};
use peniko::color::palette::css::{BLUE, RED};
use understory_draw::{
    BackendType, DrawOptions, DrawTarget, Factory, IntSize, Pattern, SurfaceFormat, pixel,
};

mod clips;
mod compositing;
mod copies;
mod gradients;
mod paths;
mod strokes;
mod surfaces;

pub const TARGET_SIZE: IntSize = IntSize::new(32, 32);
pub const TARGET_FORMAT: SurfaceFormat = SurfaceFormat::B8G8R8A8;

/// Largest per-channel difference accepted between a sampled pixel and its
/// expected value.
pub const CHANNEL_TOLERANCE: u8 = 3;

pub const RED_PX: [u8; 4] = [255, 0, 0, 255];
pub const BLUE_PX: [u8; 4] = [0, 0, 255, 255];
pub const CLEAR_PX: [u8; 4] = [0, 0, 0, 0];

pub trait ConformanceCase: Sync {
    fn name(&self) -> &'static str;

    fn supports_backend(&self, _backend: BackendType) -> bool {
        true
    }

    /// Run the case against a fresh target of `backend` created by `factory`.
    fn run(&self, factory: &Factory, backend: BackendType) -> Result<(), String>;
}

fn matches_glob(pattern: &str, text: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    if !pattern.contains('*') {
        return pattern == text;
    }

    let mut remainder = text;
    let mut first_part = true;
    for part in pattern.split('*') {
        if part.is_empty() {
            continue;
        }
        match remainder.find(part) {
            Some(idx) => {
                if first_part && !pattern.starts_with('*') && idx != 0 {
                    return false;
                }
                remainder = &remainder[idx + part.len()..];
            }
            None => return false,
        }
        first_part = false;
    }
    pattern.ends_with('*') || remainder.is_empty()
}

fn case_filters() -> Option<Vec<String>> {
    let raw = std::env::var("UNDERSTORY_DRAW_CASE").ok()?;
    let filters: Vec<String> = raw
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    (!filters.is_empty()).then_some(filters)
}

pub fn selected_cases() -> Vec<&'static dyn ConformanceCase> {
    let Some(filters) = case_filters() else {
        return CASES.to_vec();
    };

    let selected: Vec<&'static dyn ConformanceCase> = CASES
        .iter()
        .copied()
        .filter(|case| filters.iter().any(|f| matches_glob(f, case.name())))
        .collect();

    if selected.is_empty() {
        let available: Vec<&str> = CASES.iter().map(|c| c.name()).collect();
        panic!(
            "UNDERSTORY_DRAW_CASE matched no conformance cases.\n  filter: {filters:?}\n  available: {available:?}"
        );
    }

    selected
}

pub fn selected_cases_for_backend(backend: BackendType) -> Vec<&'static dyn ConformanceCase> {
    selected_cases()
        .into_iter()
        .filter(|case| case.supports_backend(backend))
        .collect()
}

fn ensure(condition: bool, message: impl FnOnce() -> String) -> Result<(), String> {
    if condition { Ok(()) } else { Err(message()) }
}

fn new_target(factory: &Factory, backend: BackendType) -> Result<DrawTarget, String> {
    factory
        .create_draw_target(backend, TARGET_SIZE, TARGET_FORMAT)
        .map_err(|e| format!("create_draw_target: {e}"))
}

fn full_rect() -> Rect {
    TARGET_SIZE.to_int_rect().to_rect()
}

fn fill_solid(target: &mut DrawTarget, rect: Rect, pattern: Pattern) {
    target.fill_rect(rect, &pattern, &DrawOptions::default());
}

fn red() -> Pattern {
    Pattern::Color(RED)
}

fn blue() -> Pattern {
    Pattern::Color(BLUE)
}

/// Premultiplied `[r, g, b, a]` bytes of one pixel of a fresh snapshot.
fn pixel_at(target: &mut DrawTarget, x: u32, y: u32) -> Result<[u8; 4], String> {
    let snapshot = target.snapshot().ok_or("snapshot returned nothing")?;
    let data = snapshot
        .data_surface()
        .ok_or("snapshot has no data surface")?;
    let p = data
        .premul_pixel(x, y)
        .ok_or_else(|| format!("({x}, {y}) is outside the snapshot"))?;
    Ok(pixel::to_rgba8(p))
}

fn expect_pixel(
    target: &mut DrawTarget,
    (x, y): (u32, u32),
    expected: [u8; 4],
    what: &str,
) -> Result<(), String> {
    let actual = pixel_at(target, x, y)?;
    let close = actual
        .iter()
        .zip(expected)
        .all(|(a, e)| a.abs_diff(e) <= CHANNEL_TOLERANCE);
    ensure(close, || {
        format!("{what}: ({x}, {y}) is {actual:?}, not {expected:?}")
    })
}

pub const CASES: &[&dyn ConformanceCase] = &[
    &paths::BuilderRejectsWritesAfterFinish,
    &paths::PathBoundsAndContainment,
    &paths::CopyToBuilderOverridesFillRule,
    &gradients::ZeroLengthLinearGradient,
    &gradients::LinearGradientEndpoints,
    &gradients::ForeignGradientStopsDropCall,
    &clips::ClipRectsIntersect,
    &clips::ClipExtraPopIsIgnored,
    &clips::ClearRectRespectsClip,
    &copies::CopyRectIgnoresTransformAndClip,
    &copies::CopySurfaceIsUnscaled,
    &surfaces::WrappingSurfaceKeepsCallerMemory,
    &surfaces::RepeatedSnapshotsMatch,
    &surfaces::BoundedDrawSurface,
    &surfaces::LockBitsRoundTrip,
    &strokes::StrokeLineCoversSegment,
    &strokes::DashedStrokeLeavesGaps,
    &strokes::SquareCapsExtendEnds,
    &compositing::MaskSurfaceUsesAlpha,
    &compositing::ShadowSitsUnderSurface,
    &compositing::GroupAlphaHalvesCoverage,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_matching() {
        assert!(matches_glob("*", "anything"));
        assert!(matches_glob("clip_*", "clip_rects_intersect"));
        assert!(!matches_glob("clip_*", "copy_rect"));
        assert!(matches_glob("*_rect", "copy_rect"));
        assert!(!matches_glob("*_rect", "copy_rect_ignores"));
        assert!(matches_glob("copy_*_clip", "copy_rect_ignores_transform_and_clip"));
    }

    #[test]
    fn case_names_are_unique() {
        let mut names: Vec<&str> = CASES.iter().map(|c| c.name()).collect();
        names.sort_unstable();
        let before = names.len();
        names.dedup();
        assert_eq!(names.len(), before);
    }
}

// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Errors reported by creation-time operations.
//!
//! Paint calls never return errors. Invalid paint calls are dropped with a
//! `log::warn!` and leave the target untouched.

use thiserror::Error;

use crate::{BackendType, IntSize, SurfaceFormat};

/// Failure of a factory or creation-time operation.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DrawError {
    /// No provider is registered for the requested backend.
    #[error("backend {0:?} is not available")]
    UnsupportedBackend(BackendType),
    /// Width or height is zero or exceeds the supported maximum.
    #[error("invalid surface size {0}")]
    InvalidSize(IntSize),
    /// The stride cannot address the described pixels.
    #[error("stride {stride} is invalid for {width} pixels of {format:?}")]
    InvalidStride {
        /// Offending stride in bytes.
        stride: i32,
        /// Row width in pixels.
        width: u32,
        /// Pixel format of the rows.
        format: SurfaceFormat,
    },
    /// The buffer is too short for the described surface.
    #[error("buffer holds {actual} bytes but {required} are required")]
    BufferTooSmall {
        /// Bytes needed.
        required: usize,
        /// Bytes supplied.
        actual: usize,
    },
    /// The backend cannot render into or read this format.
    #[error("format {0:?} is not supported here")]
    UnsupportedFormat(SurfaceFormat),
    /// Pixel storage could not be allocated.
    #[error("could not allocate {0} bytes of pixel storage")]
    AllocationFailed(usize),
    /// Two objects that must share a backend do not.
    #[error("backend mismatch: expected {expected:?}, found {found:?}")]
    BackendMismatch {
        /// Backend of the receiving object.
        expected: BackendType,
        /// Backend of the supplied object.
        found: BackendType,
    },
    /// Two targets that must match in size do not.
    #[error("size mismatch: {0} vs {1}")]
    SizeMismatch(IntSize, IntSize),
    /// The target has outstanding locked bits.
    #[error("draw target is locked")]
    Locked,
    /// Font data could not be parsed or the handle has the wrong type.
    #[error("invalid font: {0}")]
    InvalidFont(String),
    /// The operation is not implemented by this backend or provider.
    #[error("operation not supported: {0}")]
    Unsupported(&'static str),
}

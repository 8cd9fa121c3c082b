// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Source surfaces and CPU pixel storage.
//!
//! A [`SourceSurface`] is an immutable-by-convention image that can be drawn
//! or used as a pattern. [`DataSourceSurface`] is the CPU-addressable kind;
//! every surface can produce one through [`SourceSurface::data_surface`].
//!
//! Pixel memory lives in [`SharedPixels`], a reference-counted buffer. A
//! surface that wraps caller memory holds one reference to it and never
//! frees it; the caller's handle stays valid after the surface is dropped.

use core::any::Any;
use core::fmt;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::pixel::{self, Premul};
use crate::{DrawError, IntSize, SurfaceFormat, SurfaceType};

/// Largest accepted width or height, in pixels.
pub const MAX_SURFACE_DIMENSION: u32 = 32_767;

/// Reference-counted pixel buffer shared between surfaces, targets and callers.
#[derive(Clone, Default)]
pub struct SharedPixels {
    bytes: Arc<RwLock<Vec<u8>>>,
}

impl fmt::Debug for SharedPixels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedPixels")
            .field("len", &self.len())
            .field("handles", &self.handle_count())
            .finish()
    }
}

impl SharedPixels {
    /// Take ownership of `bytes`.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes: Arc::new(RwLock::new(bytes)),
        }
    }

    /// Allocate `len` zeroed bytes, reporting allocation failure as an error.
    pub fn zeroed(len: usize) -> Result<Self, DrawError> {
        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(len)
            .map_err(|_| DrawError::AllocationFailed(len))?;
        bytes.resize(len, 0);
        Ok(Self::new(bytes))
    }

    /// Shared read access.
    pub fn read(&self) -> PixelsRead<'_> {
        PixelsRead(self.bytes.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Exclusive write access.
    ///
    /// The guard exposes the bytes as a slice, so the buffer keeps its
    /// length for as long as any surface or target describes it.
    pub fn write(&self) -> PixelsWrite<'_> {
        PixelsWrite(self.bytes.write().unwrap_or_else(PoisonError::into_inner))
    }

    /// Buffer length in bytes.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Returns `true` if the buffer holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of the current contents.
    pub fn to_vec(&self) -> Vec<u8> {
        self.read().to_vec()
    }

    /// Returns `true` if both handles refer to the same buffer.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.bytes, &other.bytes)
    }

    /// Number of live handles to the buffer.
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.bytes)
    }
}

/// Shared read guard over the bytes of a [`SharedPixels`].
#[derive(Debug)]
pub struct PixelsRead<'a>(RwLockReadGuard<'a, Vec<u8>>);

impl Deref for PixelsRead<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

/// Exclusive write guard over the bytes of a [`SharedPixels`].
#[derive(Debug)]
pub struct PixelsWrite<'a>(RwLockWriteGuard<'a, Vec<u8>>);

impl Deref for PixelsWrite<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl DerefMut for PixelsWrite<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.0
    }
}

/// Opaque handle to an external rendering device.
///
/// Targets and surfaces created against a device stay valid only while the
/// device does. [`mark_lost`](Self::mark_lost) invalidates all of them.
#[derive(Clone)]
pub struct DeviceHandle {
    inner: Arc<DeviceState>,
}

struct DeviceState {
    lost: AtomicBool,
    token: Option<Arc<dyn Any + Send + Sync>>,
}

impl fmt::Debug for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceHandle")
            .field("lost", &self.is_lost())
            .field("has_token", &self.inner.token.is_some())
            .finish()
    }
}

impl Default for DeviceHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceHandle {
    /// Handle with no backend-specific payload.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DeviceState {
                lost: AtomicBool::new(false),
                token: None,
            }),
        }
    }

    /// Handle carrying a backend-specific payload.
    pub fn with_token(token: impl Any + Send + Sync) -> Self {
        Self {
            inner: Arc::new(DeviceState {
                lost: AtomicBool::new(false),
                token: Some(Arc::new(token)),
            }),
        }
    }

    /// Payload, if it has type `T`.
    pub fn token<T: Any>(&self) -> Option<&T> {
        self.inner.token.as_deref()?.downcast_ref()
    }

    /// Invalidate every target and surface bound to this device.
    pub fn mark_lost(&self) {
        self.inner.lost.store(true, Ordering::Release);
    }

    /// Returns `true` once the device has been lost.
    pub fn is_lost(&self) -> bool {
        self.inner.lost.load(Ordering::Acquire)
    }

    /// Returns `true` if both handles refer to the same device.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Validated row addressing for a pixel buffer.
///
/// Negative strides are supported: row 0 then sits at the end of the buffer
/// and later rows run toward its start.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PixelLayout {
    size: IntSize,
    format: SurfaceFormat,
    stride: i32,
    origin: usize,
}

impl PixelLayout {
    /// Tightly packed rows.
    pub fn packed(size: IntSize, format: SurfaceFormat) -> Result<Self, DrawError> {
        check_size(size)?;
        let row = size.width as usize * format.bytes_per_pixel();
        let stride = i32::try_from(row).map_err(|_| DrawError::InvalidSize(size))?;
        Ok(Self {
            size,
            format,
            stride,
            origin: 0,
        })
    }

    /// Rows `stride` bytes apart inside a buffer of `buffer_len` bytes.
    pub fn new(
        size: IntSize,
        format: SurfaceFormat,
        stride: i32,
        buffer_len: usize,
    ) -> Result<Self, DrawError> {
        check_size(size)?;
        let row = size.width as usize * format.bytes_per_pixel();
        let step = stride.unsigned_abs() as usize;
        if stride == 0 || step < row {
            return Err(DrawError::InvalidStride {
                stride,
                width: size.width,
                format,
            });
        }
        let last_row = (size.height as usize - 1)
            .checked_mul(step)
            .ok_or(DrawError::InvalidSize(size))?;
        let required = last_row + row;
        if required > buffer_len {
            return Err(DrawError::BufferTooSmall {
                required,
                actual: buffer_len,
            });
        }
        Ok(Self {
            size,
            format,
            stride,
            origin: if stride < 0 { last_row } else { 0 },
        })
    }

    /// Pixel dimensions.
    pub fn size(&self) -> IntSize {
        self.size
    }

    /// Pixel format.
    pub fn format(&self) -> SurfaceFormat {
        self.format
    }

    /// Signed distance between rows in bytes.
    pub fn stride(&self) -> i32 {
        self.stride
    }

    /// Meaningful bytes per row.
    pub fn row_bytes(&self) -> usize {
        self.size.width as usize * self.format.bytes_per_pixel()
    }

    /// Smallest buffer length this layout addresses.
    pub fn required_len(&self) -> usize {
        (self.size.height as usize - 1) * self.stride.unsigned_abs() as usize + self.row_bytes()
    }

    /// Byte offset of row `y`.
    pub fn row_offset(&self, y: u32) -> usize {
        let step = self.stride.unsigned_abs() as usize * y as usize;
        if self.stride < 0 {
            self.origin - step
        } else {
            self.origin + step
        }
    }

    /// Byte offset of pixel `(x, y)`.
    pub fn pixel_offset(&self, x: u32, y: u32) -> usize {
        self.row_offset(y) + x as usize * self.format.bytes_per_pixel()
    }
}

/// Reject empty and oversized dimensions.
pub(crate) fn check_size(size: IntSize) -> Result<(), DrawError> {
    if size.is_empty() || size.width > MAX_SURFACE_DIMENSION || size.height > MAX_SURFACE_DIMENSION
    {
        return Err(DrawError::InvalidSize(size));
    }
    Ok(())
}

/// An image that can be drawn or used as a pattern source.
pub trait SourceSurface: fmt::Debug + Send + Sync {
    /// Kind of surface.
    fn surface_type(&self) -> SurfaceType;
    /// Pixel dimensions.
    fn size(&self) -> IntSize;
    /// Pixel format.
    fn format(&self) -> SurfaceFormat;
    /// Returns `false` once the surface's device has been lost.
    fn is_valid(&self) -> bool {
        true
    }
    /// CPU-addressable view of the same pixels.
    ///
    /// Data surfaces return themselves; other kinds may read back or copy.
    fn data_surface(&self) -> Option<DataSourceSurface>;
    /// Access to the concrete type, for backends that recognize their own
    /// optimized surfaces.
    fn as_any(&self) -> &dyn Any;
}

/// Shared handle to any source surface.
pub type SourceSurfaceRef = Arc<dyn SourceSurface>;

/// CPU-addressable source surface.
///
/// Clones share the same pixels.
#[derive(Clone)]
pub struct DataSourceSurface {
    inner: Arc<DataSurfaceInner>,
}

struct DataSurfaceInner {
    pixels: SharedPixels,
    layout: PixelLayout,
    surface_type: SurfaceType,
    wrapping: bool,
    device: Option<DeviceHandle>,
    generation: AtomicU64,
}

impl fmt::Debug for DataSourceSurface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataSourceSurface")
            .field("layout", &self.inner.layout)
            .field("surface_type", &self.inner.surface_type)
            .field("wrapping", &self.inner.wrapping)
            .field("generation", &self.generation())
            .finish_non_exhaustive()
    }
}

impl DataSourceSurface {
    fn from_inner(
        pixels: SharedPixels,
        layout: PixelLayout,
        surface_type: SurfaceType,
        wrapping: bool,
        device: Option<DeviceHandle>,
    ) -> Self {
        Self {
            inner: Arc::new(DataSurfaceInner {
                pixels,
                layout,
                surface_type,
                wrapping,
                device,
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Owned, zero-initialized, tightly packed surface.
    pub fn new(size: IntSize, format: SurfaceFormat) -> Result<Self, DrawError> {
        let layout = PixelLayout::packed(size, format)?;
        let pixels = SharedPixels::zeroed(layout.required_len())?;
        Ok(Self::from_inner(pixels, layout, SurfaceType::Data, false, None))
    }

    /// Owned surface that takes `bytes` as its storage.
    pub fn from_vec(
        bytes: Vec<u8>,
        size: IntSize,
        stride: i32,
        format: SurfaceFormat,
    ) -> Result<Self, DrawError> {
        let layout = PixelLayout::new(size, format, stride, bytes.len())?;
        Ok(Self::from_inner(
            SharedPixels::new(bytes),
            layout,
            SurfaceType::Data,
            false,
            None,
        ))
    }

    /// Owned, packed copy of caller pixels described by `stride`.
    pub fn copy_from_slice(
        data: &[u8],
        size: IntSize,
        stride: i32,
        format: SurfaceFormat,
    ) -> Result<Self, DrawError> {
        let src = PixelLayout::new(size, format, stride, data.len())?;
        let surface = Self::new(size, format)?;
        {
            let mut out = surface.map_mut();
            for y in 0..size.height {
                let start = src.row_offset(y);
                out.row_mut(y)
                    .copy_from_slice(&data[start..start + src.row_bytes()]);
            }
        }
        Ok(surface)
    }

    /// Surface over caller memory. The caller keeps ownership of `pixels`.
    pub fn wrapping(
        pixels: SharedPixels,
        size: IntSize,
        stride: i32,
        format: SurfaceFormat,
    ) -> Result<Self, DrawError> {
        let layout = PixelLayout::new(size, format, stride, pixels.len())?;
        Ok(Self::from_inner(
            pixels,
            layout,
            SurfaceType::Data,
            true,
            None,
        ))
    }

    /// Surface produced by a backend, typically a snapshot.
    ///
    /// When `device` is given the surface becomes invalid once that device
    /// is lost.
    pub fn from_backend(
        bytes: Vec<u8>,
        size: IntSize,
        stride: i32,
        format: SurfaceFormat,
        surface_type: SurfaceType,
        device: Option<DeviceHandle>,
    ) -> Result<Self, DrawError> {
        let layout = PixelLayout::new(size, format, stride, bytes.len())?;
        Ok(Self::from_inner(
            SharedPixels::new(bytes),
            layout,
            surface_type,
            false,
            device,
        ))
    }

    /// Share this surface as a [`SourceSurfaceRef`].
    pub fn into_source(self) -> SourceSurfaceRef {
        Arc::new(self)
    }

    /// Backing pixel buffer.
    pub fn pixels(&self) -> &SharedPixels {
        &self.inner.pixels
    }

    /// Row addressing.
    pub fn layout(&self) -> PixelLayout {
        self.inner.layout
    }

    /// Signed distance between rows in bytes.
    pub fn stride(&self) -> i32 {
        self.inner.layout.stride()
    }

    /// Returns `true` if the pixels belong to the caller.
    pub fn is_wrapping(&self) -> bool {
        self.inner.wrapping
    }

    /// Read access to the pixels.
    pub fn map(&self) -> DataSurfaceMap<'_> {
        DataSurfaceMap {
            bytes: self.inner.pixels.read(),
            layout: self.inner.layout,
        }
    }

    /// Write access to the pixels. The surface is marked dirty when the
    /// mapping is dropped.
    pub fn map_mut(&self) -> DataSurfaceMapMut<'_> {
        DataSurfaceMapMut {
            bytes: self.inner.pixels.write(),
            layout: self.inner.layout,
            generation: &self.inner.generation,
        }
    }

    /// Record that the pixels changed behind the surface's back.
    pub fn mark_dirty(&self) {
        self.inner.generation.fetch_add(1, Ordering::AcqRel);
    }

    /// Counter bumped by every [`mark_dirty`](Self::mark_dirty).
    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::Acquire)
    }

    /// Premultiplied color of one pixel, or `None` outside the surface.
    pub fn premul_pixel(&self, x: u32, y: u32) -> Option<Premul> {
        let size = self.inner.layout.size();
        (x < size.width && y < size.height).then(|| self.map().premul(x, y))
    }

    /// Returns `true` if both handles share the same pixels and layout.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl SourceSurface for DataSourceSurface {
    fn surface_type(&self) -> SurfaceType {
        self.inner.surface_type
    }

    fn size(&self) -> IntSize {
        self.inner.layout.size()
    }

    fn format(&self) -> SurfaceFormat {
        self.inner.layout.format()
    }

    fn is_valid(&self) -> bool {
        self.inner.device.as_ref().is_none_or(|d| !d.is_lost())
    }

    fn data_surface(&self) -> Option<DataSourceSurface> {
        Some(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Read mapping of a [`DataSourceSurface`].
#[derive(Debug)]
pub struct DataSurfaceMap<'a> {
    bytes: PixelsRead<'a>,
    layout: PixelLayout,
}

impl DataSurfaceMap<'_> {
    /// Row addressing.
    pub fn layout(&self) -> PixelLayout {
        self.layout
    }

    /// Meaningful bytes of row `y`.
    pub fn row(&self, y: u32) -> &[u8] {
        let start = self.layout.row_offset(y);
        &self.bytes[start..start + self.layout.row_bytes()]
    }

    /// Premultiplied color of pixel `(x, y)`.
    pub fn premul(&self, x: u32, y: u32) -> Premul {
        let at = self.layout.pixel_offset(x, y);
        pixel::read(self.layout.format(), &self.bytes[at..])
    }
}

/// Write mapping of a [`DataSourceSurface`].
#[derive(Debug)]
pub struct DataSurfaceMapMut<'a> {
    bytes: PixelsWrite<'a>,
    layout: PixelLayout,
    generation: &'a AtomicU64,
}

impl DataSurfaceMapMut<'_> {
    /// Row addressing.
    pub fn layout(&self) -> PixelLayout {
        self.layout
    }

    /// Meaningful bytes of row `y`.
    pub fn row_mut(&mut self, y: u32) -> &mut [u8] {
        let start = self.layout.row_offset(y);
        let len = self.layout.row_bytes();
        &mut self.bytes[start..start + len]
    }

    /// Premultiplied color of pixel `(x, y)`.
    pub fn premul(&self, x: u32, y: u32) -> Premul {
        let at = self.layout.pixel_offset(x, y);
        pixel::read(self.layout.format(), &self.bytes[at..])
    }

    /// Store a premultiplied color at `(x, y)`.
    pub fn set_premul(&mut self, x: u32, y: u32, p: Premul) {
        let at = self.layout.pixel_offset(x, y);
        pixel::write(self.layout.format(), p, &mut self.bytes[at..]);
    }

    /// Fill every pixel with `p`.
    pub fn fill(&mut self, p: Premul) {
        let size = self.layout.size();
        for y in 0..size.height {
            for x in 0..size.width {
                self.set_premul(x, y, p);
            }
        }
    }
}

impl Drop for DataSurfaceMapMut<'_> {
    fn drop(&mut self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapping_surface_never_frees_caller_memory() {
        let pixels = SharedPixels::new(vec![7_u8; 4 * 4 * 4]);
        {
            let s = DataSourceSurface::wrapping(
                pixels.clone(),
                IntSize::new(4, 4),
                16,
                SurfaceFormat::B8G8R8A8,
            )
            .unwrap();
            assert!(s.is_wrapping());
            assert_eq!(pixels.handle_count(), 2);
            let source = s.into_source();
            drop(source);
        }
        assert_eq!(pixels.handle_count(), 1);
        assert!(pixels.read().iter().all(|b| *b == 7));
    }

    #[test]
    fn write_guard_is_a_fixed_length_slice() {
        let pixels = SharedPixels::new(vec![255; 64]);
        let s = DataSourceSurface::wrapping(
            pixels.clone(),
            IntSize::new(4, 4),
            16,
            SurfaceFormat::B8G8R8A8,
        )
        .unwrap();
        {
            let mut bytes = pixels.write();
            let slice: &mut [u8] = &mut bytes;
            slice[..8].fill(0);
        }
        assert_eq!(pixels.len(), 64);
        assert_eq!(s.map().row(3).len(), 16);
        assert_eq!(s.premul_pixel(1, 0), Some([0.0; 4]));
        assert_eq!(s.premul_pixel(3, 3), Some([1.0; 4]));
    }

    #[test]
    fn stride_validation() {
        let pixels = SharedPixels::new(vec![0; 40]);
        let size = IntSize::new(4, 2);
        assert!(matches!(
            DataSourceSurface::wrapping(pixels.clone(), size, 8, SurfaceFormat::B8G8R8A8),
            Err(DrawError::InvalidStride { .. })
        ));
        assert!(matches!(
            DataSourceSurface::wrapping(pixels.clone(), size, 0, SurfaceFormat::B8G8R8A8),
            Err(DrawError::InvalidStride { .. })
        ));
        let short = DataSourceSurface::wrapping(pixels.clone(), size, 32, SurfaceFormat::B8G8R8A8);
        let Err(DrawError::BufferTooSmall { required, actual }) = short else {
            panic!("short buffer accepted");
        };
        assert_eq!((required, actual), (48, 40));
        assert!(DataSourceSurface::wrapping(pixels, size, 20, SurfaceFormat::B8G8R8A8).is_ok());
    }

    #[test]
    fn negative_stride_addresses_rows_backwards() {
        let mut bytes = vec![0_u8; 8];
        // Row 1 occupies the first four bytes, row 0 the last four.
        bytes[4..].copy_from_slice(&[0, 0, 255, 255]);
        let (size, format) = (IntSize::new(1, 2), SurfaceFormat::B8G8R8A8);
        let s = DataSourceSurface::from_vec(bytes, size, -4, format).unwrap();
        assert_eq!(s.premul_pixel(0, 0), Some([1.0, 0.0, 0.0, 1.0]));
        assert_eq!(s.premul_pixel(0, 1), Some([0.0; 4]));
        assert_eq!(s.premul_pixel(0, 2), None);
    }

    #[test]
    fn copy_from_slice_packs_rows() {
        let data = [1_u8, 2, 3, 4, 0xee, 0xee, 5, 6, 7, 8, 0xee, 0xee];
        let (size, format) = (IntSize::new(1, 2), SurfaceFormat::R8G8B8A8);
        let s = DataSourceSurface::copy_from_slice(&data, size, 6, format).unwrap();
        assert_eq!(s.stride(), 4);
        assert_eq!(s.pixels().to_vec(), vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn map_mut_marks_dirty() {
        let s = DataSourceSurface::new(IntSize::new(2, 2), SurfaceFormat::B8G8R8A8).unwrap();
        let g = s.generation();
        s.map_mut().set_premul(1, 1, [0.0, 1.0, 0.0, 1.0]);
        assert!(s.generation() > g);
        s.mark_dirty();
        assert_eq!(s.generation(), g + 2);
        assert_eq!(s.premul_pixel(1, 1), Some([0.0, 1.0, 0.0, 1.0]));
    }

    #[test]
    fn lost_device_invalidates_surface() {
        let device = DeviceHandle::with_token(42_u32);
        assert_eq!(device.token::<u32>(), Some(&42));
        let s = DataSourceSurface::from_backend(
            vec![0; 4],
            IntSize::new(1, 1),
            4,
            SurfaceFormat::B8G8R8A8,
            SurfaceType::Raster,
            Some(device.clone()),
        )
        .unwrap();
        assert!(s.is_valid());
        device.mark_lost();
        assert!(!s.is_valid());
    }

    #[test]
    fn rejects_empty_and_huge_sizes() {
        assert!(DataSourceSurface::new(IntSize::new(0, 4), SurfaceFormat::A8).is_err());
        let huge = IntSize::new(MAX_SURFACE_DIMENSION + 1, 1);
        assert!(DataSourceSurface::new(huge, SurfaceFormat::A8).is_err());
    }
}

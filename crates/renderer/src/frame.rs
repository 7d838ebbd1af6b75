//! Camera frames and the collaborators that supply them.
//!
//! The pipeline only borrows a frame for the duration of one conversion step.
//! Planes are handed out as [`ImagePlane`] views into the frame's memory.

use std::time::Duration;

use compositor_core::MatteResolution;
use glam::{DAffine2, DVec2, UVec2};

use crate::transform::Orientation;

/// Texture slot of each plane the composite pass samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlaneKind {
    /// Full-resolution Y plane.
    Luma,
    /// Half-resolution interleaved CbCr plane.
    Chroma,
    /// Color output of the scene renderer.
    SceneColor,
    /// Person-segmentation matte.
    Alpha,
}

impl PlaneKind {
    /// Fragment shader binding of the plane's texture.
    pub fn binding(self) -> u32 {
        match self {
            PlaneKind::Luma => 0,
            PlaneKind::Chroma => 1,
            PlaneKind::SceneColor => 2,
            PlaneKind::Alpha => 3,
        }
    }

    /// Bytes per texel as uploaded from the CPU.
    pub fn bytes_per_texel(self) -> usize {
        match self {
            PlaneKind::Luma | PlaneKind::Alpha => 1,
            PlaneKind::Chroma => 2,
            PlaneKind::SceneColor => 4,
        }
    }

    /// Lowercase name used in logs.
    pub fn name(self) -> &'static str {
        match self {
            PlaneKind::Luma => "luma",
            PlaneKind::Chroma => "chroma",
            PlaneKind::SceneColor => "scene-color",
            PlaneKind::Alpha => "alpha",
        }
    }
}

impl std::fmt::Display for PlaneKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Borrowed view of one plane of a planar image.
#[derive(Debug, Clone, Copy)]
pub struct ImagePlane<'a> {
    /// Width in texels.
    pub width: u32,
    /// Height in texels.
    pub height: u32,
    /// Row stride in bytes, including padding.
    pub bytes_per_row: usize,
    /// Plane memory, `height` rows of `bytes_per_row` bytes.
    pub data: &'a [u8],
}

impl<'a> ImagePlane<'a> {
    /// Wraps `data` as a plane of the given size and stride.
    pub fn new(width: u32, height: u32, bytes_per_row: usize, data: &'a [u8]) -> Self {
        Self {
            width,
            height,
            bytes_per_row,
            data,
        }
    }

    /// True if `data` holds `height` rows of `width` texels at the row stride.
    pub fn is_valid(&self, bytes_per_texel: usize) -> bool {
        let row_len = self.width as usize * bytes_per_texel;
        if row_len == 0 || self.height == 0 || self.bytes_per_row < row_len {
            return false;
        }
        let needed = self.bytes_per_row * (self.height as usize - 1) + row_len;
        self.data.len() >= needed
    }

    /// Bytes of row `y`, without stride padding.
    pub fn row(&self, y: u32, bytes_per_texel: usize) -> Option<&'a [u8]> {
        if y >= self.height {
            return None;
        }
        let start = y as usize * self.bytes_per_row;
        self.data
            .get(start..start + self.width as usize * bytes_per_texel)
    }
}

/// A planar camera image (luma plane, then interleaved chroma plane).
pub trait CameraFrame {
    /// Number of planes in the image.
    fn plane_count(&self) -> usize;

    /// View of plane `index`, or `None` past the last plane.
    fn plane(&self, index: usize) -> Option<ImagePlane<'_>>;

    /// Sensor size in pixels (the luma plane's size).
    fn image_size(&self) -> UVec2;

    /// Capture time relative to the session start.
    fn timestamp(&self) -> Duration;
}

/// The tracking session feeding the pipeline.
pub trait SessionSource {
    /// Frame type handed out by the session.
    type Frame: CameraFrame;

    /// Latest frame, if one arrived since the previous poll. Never blocks.
    fn current_frame(&mut self) -> Option<Self::Frame>;

    /// Maps normalized sensor coordinates to normalized display coordinates
    /// for `orientation` and a viewport of `viewport` pixels.
    fn display_transform(&self, orientation: Orientation, viewport: DVec2) -> DAffine2;
}

/// The segmentation collaborator. May fail for any frame.
pub trait MatteGenerator {
    /// Produces a matte for `frame` at `resolution`. `None` on failure.
    ///
    /// # Arguments
    ///
    /// * `frame` - Camera frame to segment, borrowed for this call only
    /// * `resolution` - Requested matte size relative to the camera image
    fn generate_matte(
        &mut self,
        frame: &dyn CameraFrame,
        resolution: MatteResolution,
    ) -> Option<AlphaMatte>;
}

/// 8-bit foreground mask; 255 shows scene content over the camera image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlphaMatte {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl AlphaMatte {
    /// Returns `None` unless `data` holds exactly `width * height` bytes.
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        (width > 0 && height > 0 && data.len() == width as usize * height as usize).then_some(
            Self {
                width,
                height,
                data,
            },
        )
    }

    /// Matte with every texel set to `value`.
    pub fn filled(width: u32, height: u32, value: u8) -> Option<Self> {
        Self::new(
            width,
            height,
            vec![value; width as usize * height as usize],
        )
    }

    /// Width in texels.
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in texels.
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Tightly packed rows, one byte per texel.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Borrows the matte as a single-channel plane.
    pub fn as_plane(&self) -> ImagePlane<'_> {
        ImagePlane::new(self.width, self.height, self.width as usize, &self.data)
    }
}

/// One owned plane of a [`PlanarFrame`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedPlane {
    /// Width in texels.
    pub width: u32,
    /// Height in texels.
    pub height: u32,
    /// Row stride in bytes.
    pub bytes_per_row: usize,
    /// Plane memory.
    pub data: Vec<u8>,
}

impl OwnedPlane {
    pub fn as_plane(&self) -> ImagePlane<'_> {
        ImagePlane::new(self.width, self.height, self.bytes_per_row, &self.data)
    }
}

/// Heap-backed [`CameraFrame`] for synthetic sessions and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanarFrame {
    planes: Vec<OwnedPlane>,
    timestamp: Duration,
}

impl PlanarFrame {
    /// Frame from owned planes, in plane order.
    pub fn new(planes: Vec<OwnedPlane>, timestamp: Duration) -> Self {
        Self { planes, timestamp }
    }

    /// Bi-planar 4:2:0 frame: a `width` x `height` luma plane and a half-size
    /// interleaved CbCr plane. Sizes must be even.
    pub fn nv12(width: u32, height: u32, luma: Vec<u8>, chroma: Vec<u8>, timestamp: Duration) -> Self {
        Self::new(
            vec![
                OwnedPlane {
                    width,
                    height,
                    bytes_per_row: width as usize,
                    data: luma,
                },
                OwnedPlane {
                    width: width / 2,
                    height: height / 2,
                    bytes_per_row: width as usize,
                    data: chroma,
                },
            ],
            timestamp,
        )
    }

    /// Keeps only the first `count` planes.
    pub fn truncate_planes(&mut self, count: usize) {
        self.planes.truncate(count);
    }
}

impl CameraFrame for PlanarFrame {
    fn plane_count(&self) -> usize {
        self.planes.len()
    }

    fn plane(&self, index: usize) -> Option<ImagePlane<'_>> {
        self.planes.get(index).map(OwnedPlane::as_plane)
    }

    fn image_size(&self) -> UVec2 {
        self.planes
            .first()
            .map_or(UVec2::ZERO, |p| UVec2::new(p.width, p.height))
    }

    fn timestamp(&self) -> Duration {
        self.timestamp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plane_bindings_are_distinct() {
        let kinds = [
            PlaneKind::Luma,
            PlaneKind::Chroma,
            PlaneKind::SceneColor,
            PlaneKind::Alpha,
        ];
        let mut bindings: Vec<u32> = kinds.iter().map(|k| k.binding()).collect();
        bindings.sort_unstable();
        assert_eq!(bindings, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_image_plane_validation() {
        let data = vec![0u8; 10 * 3];
        assert!(ImagePlane::new(8, 3, 10, &data).is_valid(1));
        // Last row needs no padding.
        assert!(ImagePlane::new(8, 3, 10, &data[..28]).is_valid(1));
        assert!(!ImagePlane::new(8, 3, 10, &data[..27]).is_valid(1));
        // Stride shorter than a row.
        assert!(!ImagePlane::new(8, 3, 10, &data).is_valid(2));
        assert!(!ImagePlane::new(0, 3, 10, &data).is_valid(1));
    }

    #[test]
    fn test_image_plane_row() {
        let data: Vec<u8> = (0..12).collect();
        let plane = ImagePlane::new(2, 3, 4, &data);
        assert_eq!(plane.row(1, 1), Some(&[4u8, 5][..]));
        assert_eq!(plane.row(2, 2), Some(&[8u8, 9, 10, 11][..]));
        assert_eq!(plane.row(3, 1), None);
    }

    #[test]
    fn test_alpha_matte_size_checked() {
        assert!(AlphaMatte::new(4, 4, vec![0; 16]).is_some());
        assert!(AlphaMatte::new(4, 4, vec![0; 15]).is_none());
        assert!(AlphaMatte::new(0, 4, vec![]).is_none());

        let matte = AlphaMatte::filled(3, 2, 255).expect("matte");
        let plane = matte.as_plane();
        assert_eq!(plane.bytes_per_row, 3);
        assert!(plane.is_valid(PlaneKind::Alpha.bytes_per_texel()));
    }

    #[test]
    fn test_nv12_frame() {
        let mut frame = PlanarFrame::nv12(
            4,
            2,
            vec![16; 8],
            vec![128; 4],
            Duration::from_millis(16),
        );
        assert_eq!(frame.plane_count(), 2);
        assert_eq!(frame.image_size(), UVec2::new(4, 2));

        let chroma = frame.plane(1).expect("chroma plane");
        assert_eq!((chroma.width, chroma.height), (2, 1));
        assert!(chroma.is_valid(PlaneKind::Chroma.bytes_per_texel()));

        frame.truncate_planes(1);
        assert_eq!(frame.plane_count(), 1);
        assert!(frame.plane(1).is_none());
    }
}

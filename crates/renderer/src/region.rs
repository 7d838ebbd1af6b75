//! Region mapping for the cropping paths.
//!
//! A color pick selects a fixed square in the middle of the viewport and
//! reads the sensor pixels under it; an object recognizer reports a
//! normalized box over the on-screen image. Both go through the same
//! [`CoordinateTransform`] the compositor uses.

use glam::DVec2;

use crate::frame::ImagePlane;
use crate::transform::{CoordinateTransform, PixelRect, ViewportDescriptor};

/// Edge length of the color-pick selection, in viewport pixels.
pub const SELECTION_SIZE: f64 = 256.0;

/// Maps selections and recognizer boxes onto the sensor image.
#[derive(Debug, Clone, Copy)]
pub struct RegionMapper {
    transform: CoordinateTransform,
    viewport: DVec2,
}

impl RegionMapper {
    /// Creates a mapper for `viewport` using the compositor's `transform`.
    pub fn new(transform: CoordinateTransform, viewport: &ViewportDescriptor) -> Self {
        Self {
            transform,
            viewport: viewport.size(),
        }
    }

    /// The sensor to viewport transform.
    #[inline]
    pub fn transform(&self) -> &CoordinateTransform {
        &self.transform
    }

    /// The fixed color-pick square centered in the viewport.
    pub fn centered_selection(&self) -> PixelRect {
        PixelRect::from_center_size(self.viewport * 0.5, DVec2::splat(SELECTION_SIZE))
    }

    /// Maps a viewport selection to sensor pixels, clamped to the image.
    ///
    /// Returns `None` if the selection does not cover any part of the image.
    pub fn selection_to_sensor(&self, selection: &PixelRect, image_size: DVec2) -> Option<PixelRect> {
        let sensor = self.transform.viewport_rect_to_sensor(selection);
        sensor.intersect(&PixelRect::new(DVec2::ZERO, image_size))
    }

    /// Scales a box normalized over the viewport (origin top-left) to
    /// viewport pixels, clamped to the viewport.
    pub fn normalized_box_to_viewport(&self, bbox: &PixelRect) -> Option<PixelRect> {
        let scaled = PixelRect::new(bbox.min * self.viewport, bbox.max * self.viewport);
        scaled.intersect(&PixelRect::new(DVec2::ZERO, self.viewport))
    }
}

/// Tightly packed copy of part of a plane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CroppedPlane {
    /// Width in texels.
    pub width: u32,
    /// Height in texels.
    pub height: u32,
    /// Tightly packed texel rows.
    pub data: Vec<u8>,
}

impl CroppedPlane {
    /// Average byte value; the mean luma for a luma crop.
    pub fn mean(&self) -> Option<f64> {
        if self.data.is_empty() {
            return None;
        }
        let sum: u64 = self.data.iter().map(|&b| b as u64).sum();
        Some(sum as f64 / self.data.len() as f64)
    }
}

/// Copies the texels of `plane` covered by `rect` (in plane pixels).
///
/// Partially covered texels are included. Returns `None` if `rect` misses the
/// plane or the plane is shorter than its declared size.
pub fn crop_plane(plane: &ImagePlane<'_>, rect: &PixelRect, bytes_per_texel: usize) -> Option<CroppedPlane> {
    let bounds = rect.intersect(&PixelRect::new(
        DVec2::ZERO,
        DVec2::new(plane.width as f64, plane.height as f64),
    ))?;

    let x0 = bounds.min.x.floor() as usize;
    let y0 = bounds.min.y.floor() as u32;
    let x1 = (bounds.max.x.ceil() as usize).min(plane.width as usize);
    let y1 = (bounds.max.y.ceil() as u32).min(plane.height);
    if x1 <= x0 || y1 <= y0 {
        return None;
    }

    let mut data = Vec::with_capacity((x1 - x0) * (y1 - y0) as usize * bytes_per_texel);
    for y in y0..y1 {
        let row = plane.row(y, bytes_per_texel)?;
        data.extend_from_slice(row.get(x0 * bytes_per_texel..x1 * bytes_per_texel)?);
    }

    Some(CroppedPlane {
        width: (x1 - x0) as u32,
        height: y1 - y0,
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::{Orientation, aspect_fill_display_transform};

    fn mapper(width: u32, height: u32, orientation: Orientation) -> (RegionMapper, DVec2) {
        let image = DVec2::new(1920.0, 1440.0);
        let viewport = ViewportDescriptor::new(width, height, orientation);
        let display = aspect_fill_display_transform(image, orientation, viewport.size());
        let transform = CoordinateTransform::new(image, &viewport, display).expect("transform");
        (RegionMapper::new(transform, &viewport), image)
    }

    #[test]
    fn test_centered_selection() {
        let (mapper, _) = mapper(1170, 2532, Orientation::Portrait);
        let selection = mapper.centered_selection();
        assert_eq!(selection.center(), DVec2::new(585.0, 1266.0));
        assert_eq!(selection.size(), DVec2::splat(SELECTION_SIZE));
    }

    #[test]
    fn test_selection_maps_into_image() {
        for orientation in Orientation::ALL {
            let (mapper, image) = mapper(1170, 2532, orientation);
            let sensor = mapper
                .selection_to_sensor(&mapper.centered_selection(), image)
                .expect("center of the viewport shows the image");

            // The viewport center shows the sensor center under aspect fill.
            assert!(sensor.center().abs_diff_eq(image * 0.5, 1e-6));
            assert!(sensor.min.cmpge(DVec2::ZERO).all());
            assert!(sensor.max.cmple(image).all());
        }
    }

    #[test]
    fn test_landscape_selection_scale() {
        // Same aspect ratio as the sensor, half the size: one viewport pixel
        // covers two sensor pixels.
        let (mapper, image) = mapper(960, 720, Orientation::LandscapeRight);
        let sensor = mapper
            .selection_to_sensor(&mapper.centered_selection(), image)
            .expect("inside");
        assert!(sensor.size().abs_diff_eq(DVec2::splat(512.0), 1e-6));
    }

    #[test]
    fn test_selection_outside_viewport() {
        let (mapper, image) = mapper(1170, 2532, Orientation::Portrait);
        let off_screen = PixelRect::new(DVec2::new(-5000.0, -5000.0), DVec2::new(-4000.0, -4000.0));
        assert!(mapper.selection_to_sensor(&off_screen, image).is_none());
    }

    #[test]
    fn test_normalized_box_to_viewport() {
        let (mapper, _) = mapper(1000, 2000, Orientation::Portrait);
        let bbox = PixelRect::new(DVec2::new(0.25, 0.5), DVec2::new(0.75, 1.2));
        let rect = mapper.normalized_box_to_viewport(&bbox).expect("visible");
        assert_eq!(rect.min, DVec2::new(250.0, 1000.0));
        assert_eq!(rect.max, DVec2::new(750.0, 2000.0));

        let outside = PixelRect::new(DVec2::new(1.1, 0.0), DVec2::new(1.5, 1.0));
        assert!(mapper.normalized_box_to_viewport(&outside).is_none());
    }

    #[test]
    fn test_crop_plane() {
        // 4x3 plane with a row stride of 6.
        let data: Vec<u8> = (0..18).collect();
        let plane = ImagePlane::new(4, 3, 6, &data);

        let rect = PixelRect::new(DVec2::new(1.0, 1.0), DVec2::new(2.5, 3.0));
        let crop = crop_plane(&plane, &rect, 1).expect("inside");
        assert_eq!((crop.width, crop.height), (2, 2));
        assert_eq!(crop.data, vec![7, 8, 13, 14]);
        assert_eq!(crop.mean(), Some(10.5));

        let clamped = PixelRect::new(DVec2::new(-10.0, -10.0), DVec2::new(1.0, 1.0));
        let crop = crop_plane(&plane, &clamped, 1).expect("overlaps corner");
        assert_eq!(crop.data, vec![0]);

        let missed = PixelRect::new(DVec2::new(5.0, 0.0), DVec2::new(6.0, 1.0));
        assert!(crop_plane(&plane, &missed, 1).is_none());
    }
}

//! Mapping between sensor pixels and viewport pixels.
//!
//! The forward transform applies, in order:
//!
//! 1. normalization of sensor pixels by the image size
//! 2. in portrait orientations, a 180° turn of the unit square
//!    (scale by -1 on both axes, then translate by (1, 1))
//! 3. the session display transform for the orientation and viewport size
//! 4. scaling by the viewport size
//!
//! The composite geometry and the cropping paths share this transform; none of
//! them special-cases it. Math is done in `f64` so round trips through
//! viewport-sized pixel coordinates stay well inside `1e-4`.

use std::fmt;

use glam::{DAffine2, DVec2};

use crate::error::{CompositorError, CompositorResult};

/// Interface orientation of the output surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Orientation {
    #[default]
    Portrait,
    PortraitUpsideDown,
    LandscapeLeft,
    LandscapeRight,
}

impl Orientation {
    /// Every orientation, in rotation order.
    pub const ALL: [Orientation; 4] = [
        Orientation::Portrait,
        Orientation::LandscapeLeft,
        Orientation::PortraitUpsideDown,
        Orientation::LandscapeRight,
    ];

    /// Whether the surface is taller than it is wide in this orientation.
    #[inline]
    pub fn is_portrait(self) -> bool {
        matches!(
            self,
            Orientation::Portrait | Orientation::PortraitUpsideDown
        )
    }

    /// Portrait when the surface is taller than it is wide.
    pub fn from_extent(width: u32, height: u32) -> Self {
        if height > width {
            Orientation::Portrait
        } else {
            Orientation::LandscapeRight
        }
    }

    /// The orientation after turning the device a quarter further.
    pub fn rotated(self) -> Self {
        let index = Self::ALL.iter().position(|&o| o == self).unwrap_or(0);
        Self::ALL[(index + 1) % Self::ALL.len()]
    }

    /// Lowercase name used in logs and configuration.
    pub fn name(self) -> &'static str {
        match self {
            Orientation::Portrait => "portrait",
            Orientation::PortraitUpsideDown => "portrait-upside-down",
            Orientation::LandscapeLeft => "landscape-left",
            Orientation::LandscapeRight => "landscape-right",
        }
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Size and orientation of the output surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewportDescriptor {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Interface orientation of the surface.
    pub orientation: Orientation,
}

impl ViewportDescriptor {
    /// Creates a viewport descriptor.
    pub fn new(width: u32, height: u32, orientation: Orientation) -> Self {
        Self {
            width,
            height,
            orientation,
        }
    }

    /// Size in pixels as a vector.
    #[inline]
    pub fn size(&self) -> DVec2 {
        DVec2::new(self.width as f64, self.height as f64)
    }

    /// Whether either dimension is zero.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Axis-aligned rectangle in pixel coordinates (sensor or viewport).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelRect {
    /// Top-left corner.
    pub min: DVec2,
    /// Bottom-right corner.
    pub max: DVec2,
}

impl PixelRect {
    /// Rectangle spanned by two opposite corners, in any order.
    pub fn new(a: DVec2, b: DVec2) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// Rectangle with its top-left corner at `origin`.
    pub fn from_origin_size(origin: DVec2, size: DVec2) -> Self {
        Self::new(origin, origin + size)
    }

    /// Rectangle of `size` centered on `center`.
    pub fn from_center_size(center: DVec2, size: DVec2) -> Self {
        Self::new(center - size * 0.5, center + size * 0.5)
    }

    /// Extent of the rectangle.
    #[inline]
    pub fn size(&self) -> DVec2 {
        self.max - self.min
    }

    /// Horizontal extent.
    #[inline]
    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    /// Vertical extent.
    #[inline]
    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    /// Midpoint of the rectangle.
    #[inline]
    pub fn center(&self) -> DVec2 {
        (self.min + self.max) * 0.5
    }

    /// Whether the rectangle has no area.
    pub fn is_empty(&self) -> bool {
        !(self.width() > 0.0 && self.height() > 0.0)
    }

    /// Whether `point` lies inside or on the boundary.
    pub fn contains(&self, point: DVec2) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }

    /// Corners in the order top-left, top-right, bottom-right, bottom-left.
    pub fn corners(&self) -> [DVec2; 4] {
        [
            self.min,
            DVec2::new(self.max.x, self.min.y),
            DVec2::new(self.min.x, self.max.y),
            self.max,
        ]
    }

    /// Overlap of two rectangles, `None` when it has no area.
    pub fn intersect(&self, other: &PixelRect) -> Option<PixelRect> {
        let rect = PixelRect {
            min: self.min.max(other.min),
            max: self.max.min(other.max),
        };
        (!rect.is_empty()).then_some(rect)
    }

    fn bounds_of(points: [DVec2; 4]) -> PixelRect {
        let min = points.iter().copied().fold(DVec2::INFINITY, DVec2::min);
        let max = points.iter().copied().fold(DVec2::NEG_INFINITY, DVec2::max);
        PixelRect { min, max }
    }
}

/// Sensor-pixel to viewport-pixel mapping and its inverse.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateTransform {
    forward: DAffine2,
    inverse: DAffine2,
}

impl CoordinateTransform {
    /// Builds the transform for a camera image of `image_size` pixels shown
    /// on `viewport` through the session's `display` transform.
    ///
    /// # Errors
    ///
    /// Returns [`CompositorError::InvalidTransform`] if either size has a zero
    /// dimension or the composition is not invertible.
    pub fn new(
        image_size: DVec2,
        viewport: &ViewportDescriptor,
        display: DAffine2,
    ) -> CompositorResult<Self> {
        if !(image_size.x > 0.0 && image_size.y > 0.0) {
            return Err(CompositorError::InvalidTransform(format!(
                "image size must be non-zero, got {}x{}",
                image_size.x, image_size.y
            )));
        }
        if viewport.is_empty() {
            return Err(CompositorError::InvalidTransform(format!(
                "viewport size must be non-zero, got {}x{}",
                viewport.width, viewport.height
            )));
        }

        let forward = DAffine2::from_scale(viewport.size())
            * display
            * orientation_flip(viewport.orientation)
            * DAffine2::from_scale(image_size.recip());
        Self::from_forward(forward)
    }

    /// Normalized sensor coordinates to normalized display coordinates
    /// through the display transform alone, as texture sampling needs it.
    ///
    /// # Errors
    ///
    /// Returns [`CompositorError::InvalidTransform`] if `display` is singular.
    pub fn normalized(display: DAffine2) -> CompositorResult<Self> {
        Self::from_forward(display)
    }

    fn from_forward(forward: DAffine2) -> CompositorResult<Self> {
        let determinant = forward.matrix2.determinant();
        if !determinant.is_normal() || !forward.is_finite() {
            return Err(CompositorError::InvalidTransform(format!(
                "transform is not invertible (determinant {})",
                determinant
            )));
        }
        Ok(Self {
            forward,
            inverse: forward.inverse(),
        })
    }

    /// Sensor to viewport affine map.
    #[inline]
    pub fn forward(&self) -> DAffine2 {
        self.forward
    }

    /// Viewport to sensor affine map.
    #[inline]
    pub fn inverse(&self) -> DAffine2 {
        self.inverse
    }

    /// Maps a sensor pixel to a viewport pixel.
    #[inline]
    pub fn to_viewport(&self, sensor: DVec2) -> DVec2 {
        self.forward.transform_point2(sensor)
    }

    /// Maps a viewport pixel to a sensor pixel.
    #[inline]
    pub fn to_sensor(&self, viewport: DVec2) -> DVec2 {
        self.inverse.transform_point2(viewport)
    }

    /// Bounds of the sensor rectangle's mapped corners.
    pub fn sensor_rect_to_viewport(&self, rect: &PixelRect) -> PixelRect {
        PixelRect::bounds_of(rect.corners().map(|p| self.to_viewport(p)))
    }

    /// Bounds of the viewport rectangle's corners mapped back to the sensor.
    pub fn viewport_rect_to_sensor(&self, rect: &PixelRect) -> PixelRect {
        PixelRect::bounds_of(rect.corners().map(|p| self.to_sensor(p)))
    }
}

/// The sensor captures in landscape; portrait output sees it turned by 180°.
fn orientation_flip(orientation: Orientation) -> DAffine2 {
    if orientation.is_portrait() {
        DAffine2::from_translation(DVec2::ONE) * DAffine2::from_scale(DVec2::NEG_ONE)
    } else {
        DAffine2::IDENTITY
    }
}

/// Display transform of a session that shows the whole sensor image
/// aspect-filled into the viewport.
///
/// Rotates normalized image coordinates into `orientation`, then scales about
/// the center so the image covers the viewport, cropping the overflow.
pub fn aspect_fill_display_transform(
    image_size: DVec2,
    orientation: Orientation,
    viewport: DVec2,
) -> DAffine2 {
    let rotation = match orientation {
        Orientation::LandscapeRight => DAffine2::IDENTITY,
        // (x, y) -> (1 - x, 1 - y)
        Orientation::LandscapeLeft => DAffine2::from_cols(
            DVec2::new(-1.0, 0.0),
            DVec2::new(0.0, -1.0),
            DVec2::new(1.0, 1.0),
        ),
        // (x, y) -> (1 - y, x)
        Orientation::Portrait => DAffine2::from_cols(
            DVec2::new(0.0, 1.0),
            DVec2::new(-1.0, 0.0),
            DVec2::new(1.0, 0.0),
        ),
        // (x, y) -> (y, 1 - x)
        Orientation::PortraitUpsideDown => DAffine2::from_cols(
            DVec2::new(0.0, -1.0),
            DVec2::new(1.0, 0.0),
            DVec2::new(0.0, 1.0),
        ),
    };

    let rotated = if orientation.is_portrait() {
        DVec2::new(image_size.y, image_size.x)
    } else {
        image_size
    };
    if !(rotated.x > 0.0 && rotated.y > 0.0 && viewport.x > 0.0 && viewport.y > 0.0) {
        return rotation;
    }

    let image_aspect = rotated.x / rotated.y;
    let viewport_aspect = viewport.x / viewport.y;
    let scale = if image_aspect > viewport_aspect {
        DVec2::new(image_aspect / viewport_aspect, 1.0)
    } else {
        DVec2::new(1.0, viewport_aspect / image_aspect)
    };

    let center = DVec2::splat(0.5);
    DAffine2::from_translation(center)
        * DAffine2::from_scale(scale)
        * DAffine2::from_translation(-center)
        * rotation
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 1e-4;

    fn assert_close(a: DVec2, b: DVec2) {
        assert!(
            a.abs_diff_eq(b, TOLERANCE),
            "expected {:?} to be within {} of {:?}",
            a,
            TOLERANCE,
            b
        );
    }

    fn transform_for(image: DVec2, viewport: ViewportDescriptor) -> CoordinateTransform {
        let display = aspect_fill_display_transform(image, viewport.orientation, viewport.size());
        CoordinateTransform::new(image, &viewport, display).expect("valid transform")
    }

    #[test]
    fn test_orientation_from_extent() {
        assert_eq!(Orientation::from_extent(390, 844), Orientation::Portrait);
        assert_eq!(
            Orientation::from_extent(844, 390),
            Orientation::LandscapeRight
        );
        assert_eq!(
            Orientation::from_extent(500, 500),
            Orientation::LandscapeRight
        );
    }

    #[test]
    fn test_orientation_rotation_cycles() {
        let mut orientation = Orientation::Portrait;
        for _ in 0..Orientation::ALL.len() {
            orientation = orientation.rotated();
        }
        assert_eq!(orientation, Orientation::Portrait);
        assert!(Orientation::PortraitUpsideDown.is_portrait());
        assert!(!Orientation::LandscapeLeft.is_portrait());
    }

    #[test]
    fn test_round_trip_all_orientations() {
        let images = [DVec2::new(1920.0, 1440.0), DVec2::new(640.0, 480.0)];
        let viewports = [(1170, 2532), (2532, 1170), (390, 844), (1, 1)];
        let points = [
            DVec2::ZERO,
            DVec2::new(1919.0, 1439.0),
            DVec2::new(960.5, 720.25),
            DVec2::new(-50.0, 3000.0),
        ];

        for image in images {
            for (width, height) in viewports {
                for orientation in Orientation::ALL {
                    let viewport = ViewportDescriptor::new(width, height, orientation);
                    let transform = transform_for(image, viewport);
                    for p in points {
                        assert_close(transform.to_sensor(transform.to_viewport(p)), p);
                    }
                }
            }
        }
    }

    #[test]
    fn test_portrait_sensor_origin_lands_on_bottom_edge() {
        // 1920x1440 sensor shown on a 1170x2532 portrait viewport.
        let image = DVec2::new(1920.0, 1440.0);
        let viewport = ViewportDescriptor::new(1170, 2532, Orientation::Portrait);
        let display = aspect_fill_display_transform(image, viewport.orientation, viewport.size());
        let transform = CoordinateTransform::new(image, &viewport, display).expect("valid");

        let mapped = transform.to_viewport(DVec2::ZERO);

        // The flip sends the origin to (1, 1) before the display transform.
        let expected = display.transform_point2(DVec2::ONE) * viewport.size();
        assert_close(mapped, expected);
        assert!((mapped.y - 2532.0).abs() < TOLERANCE);
        assert!(mapped.x <= 0.0, "aspect fill crops the left edge: {:?}", mapped);
        assert!((mapped.x - -364.5).abs() < 1e-3);

        let unflipped = display.transform_point2(DVec2::ZERO) * viewport.size();
        assert!(!mapped.abs_diff_eq(unflipped, 1.0));
    }

    #[test]
    fn test_landscape_has_no_flip() {
        let image = DVec2::new(1920.0, 1440.0);
        let viewport = ViewportDescriptor::new(1920, 1440, Orientation::LandscapeRight);
        let transform = transform_for(image, viewport);
        assert_close(transform.to_viewport(DVec2::ZERO), DVec2::ZERO);
        assert_close(transform.to_viewport(image), image);
    }

    #[test]
    fn test_zero_sizes_rejected() {
        let viewport = ViewportDescriptor::new(100, 100, Orientation::Portrait);
        let result = CoordinateTransform::new(DVec2::new(0.0, 10.0), &viewport, DAffine2::IDENTITY);
        assert!(matches!(result, Err(CompositorError::InvalidTransform(_))));

        let empty = ViewportDescriptor::new(0, 100, Orientation::Portrait);
        let result = CoordinateTransform::new(DVec2::new(10.0, 10.0), &empty, DAffine2::IDENTITY);
        assert!(matches!(result, Err(CompositorError::InvalidTransform(_))));
    }

    #[test]
    fn test_singular_display_rejected() {
        let singular = DAffine2::from_scale(DVec2::new(1.0, 0.0));
        assert!(CoordinateTransform::normalized(singular).is_err());

        let viewport = ViewportDescriptor::new(100, 100, Orientation::LandscapeRight);
        assert!(CoordinateTransform::new(DVec2::splat(10.0), &viewport, singular).is_err());
    }

    #[test]
    fn test_rect_mapping_round_trip() {
        let image = DVec2::new(1920.0, 1440.0);
        let viewport = ViewportDescriptor::new(1170, 2532, Orientation::Portrait);
        let transform = transform_for(image, viewport);

        let sensor = PixelRect::new(DVec2::new(100.0, 200.0), DVec2::new(400.0, 300.0));
        let on_screen = transform.sensor_rect_to_viewport(&sensor);
        assert!(!on_screen.is_empty());

        let back = transform.viewport_rect_to_sensor(&on_screen);
        assert_close(back.min, sensor.min);
        assert_close(back.max, sensor.max);
    }

    #[test]
    fn test_aspect_fill_covers_viewport() {
        let image = DVec2::new(1920.0, 1440.0);
        for orientation in Orientation::ALL {
            let viewport = DVec2::new(1170.0, 2532.0);
            let display = aspect_fill_display_transform(image, orientation, viewport);
            let corners = PixelRect::new(DVec2::ZERO, DVec2::ONE)
                .corners()
                .map(|p| display.transform_point2(p));
            let bounds = PixelRect::bounds_of(corners);
            assert!(bounds.min.x <= TOLERANCE && bounds.min.y <= TOLERANCE);
            assert!(bounds.max.x >= 1.0 - TOLERANCE && bounds.max.y >= 1.0 - TOLERANCE);
        }
    }

    #[test]
    fn test_pixel_rect_intersect() {
        let a = PixelRect::new(DVec2::ZERO, DVec2::splat(10.0));
        let b = PixelRect::new(DVec2::splat(5.0), DVec2::splat(20.0));
        let overlap = a.intersect(&b).expect("overlapping");
        assert_eq!(overlap.min, DVec2::splat(5.0));
        assert_eq!(overlap.max, DVec2::splat(10.0));

        let c = PixelRect::new(DVec2::splat(10.0), DVec2::splat(12.0));
        assert!(a.intersect(&c).is_none());
        assert!(a.contains(DVec2::splat(10.0)));
        assert!(!a.contains(DVec2::new(-0.5, 3.0)));
    }
}

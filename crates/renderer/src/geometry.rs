//! The two full-screen quads drawn by the composite pass.
//!
//! The image-plane quad samples the camera texture at coordinates mapped back
//! through the display transform, so the fixed-orientation sensor image is
//! resampled for the current output orientation. The scene-plane quad always
//! samples 1:1. Recomputation is gated by a dirty flag set on viewport changes.

use bytemuck::cast_slice;
use compositor_rhi::vertex::QuadVertex;
use glam::Vec2;
use tracing::debug;

use crate::transform::CoordinateTransform;

/// Triangle-strip corners: clip-space position and identity texcoord.
///
/// Clip space has y pointing down, so texcoord (0, 0) sits top-left.
pub const QUAD_CORNERS: [QuadVertex; 4] = [
    QuadVertex::new(Vec2::new(-1.0, -1.0), Vec2::new(0.0, 0.0)),
    QuadVertex::new(Vec2::new(1.0, -1.0), Vec2::new(1.0, 0.0)),
    QuadVertex::new(Vec2::new(-1.0, 1.0), Vec2::new(0.0, 1.0)),
    QuadVertex::new(Vec2::new(1.0, 1.0), Vec2::new(1.0, 1.0)),
];

/// Image-plane and scene-plane quads with their dirty state.
#[derive(Debug, Clone, PartialEq)]
pub struct QuadGeometry {
    image_plane: [QuadVertex; 4],
    scene_plane: [QuadVertex; 4],
    dirty: bool,
    /// Bumped on every recomputation; backends compare it to skip re-uploads.
    generation: u64,
}

impl QuadGeometry {
    /// Starts dirty so the first frame computes the image plane.
    pub fn new() -> Self {
        Self {
            image_plane: QUAD_CORNERS,
            scene_plane: QUAD_CORNERS,
            dirty: true,
            generation: 0,
        }
    }

    /// Requests recomputation on the next [`update`](Self::update).
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Whether the image plane is stale.
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Recomputes the image-plane texcoords if dirty.
    ///
    /// `transform` maps normalized sensor coordinates to normalized display
    /// coordinates; each corner's texcoord goes through its inverse. Returns
    /// whether anything was recomputed.
    pub fn update(&mut self, transform: &CoordinateTransform) -> bool {
        if !self.dirty {
            return false;
        }

        for (vertex, corner) in self.image_plane.iter_mut().zip(QUAD_CORNERS) {
            vertex.tex_coord = transform.to_sensor(corner.tex_coord.as_dvec2()).as_vec2();
        }
        self.dirty = false;
        self.generation += 1;

        debug!(
            generation = self.generation,
            "Image plane texcoords: {:?}",
            self.image_plane.map(|v| v.tex_coord)
        );
        true
    }

    /// Number of recomputations so far.
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Quad sampling the camera texture.
    #[inline]
    pub fn image_plane(&self) -> &[QuadVertex; 4] {
        &self.image_plane
    }

    /// Quad sampling the scene texture 1:1.
    #[inline]
    pub fn scene_plane(&self) -> &[QuadVertex; 4] {
        &self.scene_plane
    }

    /// Image-plane vertices as raw bytes for upload.
    pub fn image_plane_bytes(&self) -> &[u8] {
        cast_slice(&self.image_plane)
    }

    /// Scene-plane vertices as raw bytes for upload.
    pub fn scene_plane_bytes(&self) -> &[u8] {
        cast_slice(&self.scene_plane)
    }
}

impl Default for QuadGeometry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::{Orientation, aspect_fill_display_transform};
    use glam::{DAffine2, DVec2};

    fn portrait_transform() -> CoordinateTransform {
        let display = aspect_fill_display_transform(
            DVec2::new(1920.0, 1440.0),
            Orientation::Portrait,
            DVec2::new(1170.0, 2532.0),
        );
        CoordinateTransform::normalized(display).expect("invertible")
    }

    #[test]
    fn test_identity_display_keeps_texcoords() {
        let mut geometry = QuadGeometry::new();
        let transform = CoordinateTransform::normalized(DAffine2::IDENTITY).expect("identity");
        assert!(geometry.update(&transform));
        assert_eq!(geometry.image_plane(), &QUAD_CORNERS);
        assert_eq!(geometry.generation(), 1);
    }

    #[test]
    fn test_update_is_gated_by_dirty_flag() {
        let mut geometry = QuadGeometry::new();
        let transform = portrait_transform();

        assert!(geometry.update(&transform));
        let first = geometry.image_plane_bytes().to_vec();
        let generation = geometry.generation();

        assert!(!geometry.update(&transform));
        assert_eq!(geometry.image_plane_bytes(), first.as_slice());
        assert_eq!(geometry.generation(), generation);

        // A different transform has no effect until the flag is set again.
        let identity = CoordinateTransform::normalized(DAffine2::IDENTITY).expect("identity");
        assert!(!geometry.update(&identity));
        assert_eq!(geometry.image_plane_bytes(), first.as_slice());

        geometry.mark_dirty();
        assert!(geometry.update(&identity));
        assert_ne!(geometry.image_plane_bytes(), first.as_slice());
    }

    #[test]
    fn test_portrait_texcoords_rotate() {
        let mut geometry = QuadGeometry::new();
        geometry.update(&portrait_transform());

        // Display y runs along sensor x, so the top edge samples the sensor's
        // left column; aspect fill crops it to the middle of that column.
        let top_left = geometry.image_plane()[0].tex_coord;
        let top_right = geometry.image_plane()[1].tex_coord;
        assert!(top_left.x.abs() < 1e-5 && top_right.x.abs() < 1e-5);
        assert!(top_left.y > 0.75, "unexpected top-left sample {:?}", top_left);
        assert!(top_right.y < 0.25, "unexpected top-right sample {:?}", top_right);
    }

    #[test]
    fn test_scene_plane_is_never_transformed() {
        let mut geometry = QuadGeometry::new();
        geometry.update(&portrait_transform());
        assert_eq!(geometry.scene_plane(), &QUAD_CORNERS);
        assert_eq!(geometry.scene_plane_bytes().len(), 4 * 16);
    }
}

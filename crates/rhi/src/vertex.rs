//! Vertex layout of the full-screen composite quad.
//!
//! The quad is drawn from two vertex buffers with the same layout:
//!
//! - binding 0: clip-space position (location 0) and camera texcoord (location 1)
//! - binding 1: scene texcoord (location 2); its position field is unused

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::Vec2;

/// Vertex buffer binding carrying positions and camera texcoords.
pub const CAMERA_BINDING: u32 = 0;
/// Vertex buffer binding carrying scene texcoords.
pub const SCENE_BINDING: u32 = 1;

/// One corner of the composite quad.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct QuadVertex {
    /// Clip-space position.
    pub position: Vec2,
    /// Normalized texture coordinate.
    pub tex_coord: Vec2,
}

impl QuadVertex {
    /// Creates a vertex from a clip-space position and texcoord.
    #[inline]
    pub const fn new(position: Vec2, tex_coord: Vec2) -> Self {
        Self {
            position,
            tex_coord,
        }
    }

    /// Per-vertex binding description with the `QuadVertex` stride.
    ///
    /// # Arguments
    ///
    /// * `binding` - Binding number, [`CAMERA_BINDING`] or [`SCENE_BINDING`]
    pub fn binding_description(binding: u32) -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding,
            stride: std::mem::size_of::<Self>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    /// Bindings for the composite pipeline.
    pub fn composite_bindings() -> [vk::VertexInputBindingDescription; 2] {
        [
            Self::binding_description(CAMERA_BINDING),
            Self::binding_description(SCENE_BINDING),
        ]
    }

    /// Attributes for the composite pipeline.
    ///
    /// Location 2 reads the texcoord from the scene binding; see the module docs.
    pub fn composite_attributes() -> [vk::VertexInputAttributeDescription; 3] {
        let tex_coord_offset = std::mem::offset_of!(QuadVertex, tex_coord) as u32;
        [
            vk::VertexInputAttributeDescription {
                location: 0,
                binding: CAMERA_BINDING,
                format: vk::Format::R32G32_SFLOAT,
                offset: 0,
            },
            vk::VertexInputAttributeDescription {
                location: 1,
                binding: CAMERA_BINDING,
                format: vk::Format::R32G32_SFLOAT,
                offset: tex_coord_offset,
            },
            vk::VertexInputAttributeDescription {
                location: 2,
                binding: SCENE_BINDING,
                format: vk::Format::R32G32_SFLOAT,
                offset: tex_coord_offset,
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quad_vertex_size() {
        assert_eq!(std::mem::size_of::<QuadVertex>(), 16);
        assert_eq!(std::mem::offset_of!(QuadVertex, tex_coord), 8);
    }

    #[test]
    fn test_composite_attributes() {
        let attributes = QuadVertex::composite_attributes();
        assert_eq!(attributes[0].binding, CAMERA_BINDING);
        assert_eq!(attributes[1].offset, 8);
        assert_eq!(attributes[2].location, 2);
        assert_eq!(attributes[2].binding, SCENE_BINDING);
        assert_eq!(attributes[2].offset, 8);
        assert!(
            attributes
                .iter()
                .all(|a| a.format == vk::Format::R32G32_SFLOAT)
        );
    }

    #[test]
    fn test_composite_bindings() {
        let bindings = QuadVertex::composite_bindings();
        assert_eq!(bindings[0].binding, 0);
        assert_eq!(bindings[1].binding, 1);
        assert!(bindings.iter().all(|b| b.stride == 16));
    }

    #[test]
    fn test_quad_vertex_pod() {
        let vertices = [
            QuadVertex::new(Vec2::new(-1.0, -1.0), Vec2::new(0.0, 0.0)),
            QuadVertex::new(Vec2::new(1.0, 1.0), Vec2::new(1.0, 1.0)),
        ];
        let bytes: &[u8] = bytemuck::cast_slice(&vertices);
        assert_eq!(bytes.len(), 32);
        let floats: &[f32] = bytemuck::cast_slice(bytes);
        assert_eq!(floats, &[-1.0, -1.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0]);
    }
}

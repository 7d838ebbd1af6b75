//! Pipeline layouts and graphics pipelines for dynamic rendering.
//!
//! This module provides:
//! - [`PipelineLayout`] ties descriptor set layouts and push constants together
//! - [`Pipeline`] owns a created graphics pipeline
//! - [`GraphicsPipelineBuilder`] assembles the fixed-function state
//!
//! Only what the composite pass needs is exposed: no depth attachment, no
//! blending, dynamic viewport and scissor. Pipelines target dynamic rendering,
//! so no render pass object is involved; the color attachment format is
//! baked in at build time instead.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::shader::Shader;

/// Pipeline layout wrapper.
///
/// Describes which descriptor sets and push constant ranges a pipeline can
/// access. Destroyed on drop.
pub struct PipelineLayout {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan pipeline layout handle.
    layout: vk::PipelineLayout,
}

impl PipelineLayout {
    /// Creates a pipeline layout.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `descriptor_set_layouts` - Set layouts, in set-number order
    /// * `push_constant_ranges` - Push constant ranges, may be empty
    ///
    /// # Errors
    ///
    /// Returns an error if layout creation fails.
    pub fn new(
        device: Arc<Device>,
        descriptor_set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> RhiResult<Self> {
        let create_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(descriptor_set_layouts)
            .push_constant_ranges(push_constant_ranges);

        let layout = unsafe { device.handle().create_pipeline_layout(&create_info, None)? };

        debug!(
            "Created pipeline layout with {} descriptor set layout(s)",
            descriptor_set_layouts.len()
        );

        Ok(Self { device, layout })
    }

    /// Returns the Vulkan pipeline layout handle.
    #[inline]
    pub fn handle(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_pipeline_layout(self.layout, None);
        }
    }
}

/// Graphics pipeline wrapper.
///
/// Created through [`GraphicsPipelineBuilder`]; destroyed on drop.
pub struct Pipeline {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan pipeline handle.
    pipeline: vk::Pipeline,
}

impl Pipeline {
    fn create_graphics_internal(
        device: Arc<Device>,
        create_info: &vk::GraphicsPipelineCreateInfo,
    ) -> RhiResult<Self> {
        let pipelines = unsafe {
            device
                .handle()
                .create_graphics_pipelines(
                    vk::PipelineCache::null(),
                    std::slice::from_ref(create_info),
                    None,
                )
                .map_err(|(_, result)| result)?
        };
        let pipeline = pipelines
            .into_iter()
            .next()
            .ok_or_else(|| RhiError::PipelineError("Driver returned no pipeline".to_string()))?;

        info!("Graphics pipeline created");

        Ok(Self { device, pipeline })
    }

    /// Returns the Vulkan pipeline handle.
    #[inline]
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_pipeline(self.pipeline, None);
        }
        debug!("Graphics pipeline destroyed");
    }
}

/// How vertices are assembled into primitives.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PrimitiveTopology {
    #[default]
    TriangleList,
    /// Four vertices form a quad without an index buffer.
    TriangleStrip,
}

impl PrimitiveTopology {
    /// Converts to the Vulkan primitive topology.
    pub fn to_vk(self) -> vk::PrimitiveTopology {
        match self {
            PrimitiveTopology::TriangleList => vk::PrimitiveTopology::TRIANGLE_LIST,
            PrimitiveTopology::TriangleStrip => vk::PrimitiveTopology::TRIANGLE_STRIP,
        }
    }
}

/// Which faces the rasterizer discards.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CullMode {
    #[default]
    None,
    Back,
}

impl CullMode {
    /// Converts to Vulkan cull mode flags.
    pub fn to_vk(self) -> vk::CullModeFlags {
        match self {
            CullMode::None => vk::CullModeFlags::NONE,
            CullMode::Back => vk::CullModeFlags::BACK,
        }
    }
}

/// Builds a single-color-attachment graphics pipeline.
///
/// ```no_run
/// # use std::sync::Arc;
/// # use compositor_rhi::device::Device;
/// # use compositor_rhi::pipeline::{GraphicsPipelineBuilder, PipelineLayout, PrimitiveTopology};
/// # use compositor_rhi::shader::Shader;
/// # fn example(device: Arc<Device>, vs: &Shader, fs: &Shader, layout: &PipelineLayout) -> compositor_rhi::RhiResult<()> {
/// let pipeline = GraphicsPipelineBuilder::new()
///     .vertex_shader(vs)
///     .fragment_shader(fs)
///     .topology(PrimitiveTopology::TriangleStrip)
///     .color_attachment_format(ash::vk::Format::B8G8R8A8_UNORM)
///     .build(device, layout)?;
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct GraphicsPipelineBuilder<'a> {
    vertex_shader: Option<&'a Shader>,
    fragment_shader: Option<&'a Shader>,
    vertex_bindings: Vec<vk::VertexInputBindingDescription>,
    vertex_attributes: Vec<vk::VertexInputAttributeDescription>,
    topology: PrimitiveTopology,
    cull_mode: CullMode,
    color_attachment_format: Option<vk::Format>,
}

impl<'a> GraphicsPipelineBuilder<'a> {
    /// Creates a builder with triangle-list topology and no culling.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the vertex shader. Required.
    pub fn vertex_shader(mut self, shader: &'a Shader) -> Self {
        self.vertex_shader = Some(shader);
        self
    }

    /// Sets the fragment shader. Required.
    pub fn fragment_shader(mut self, shader: &'a Shader) -> Self {
        self.fragment_shader = Some(shader);
        self
    }

    /// Appends vertex input bindings.
    pub fn vertex_bindings(mut self, bindings: &[vk::VertexInputBindingDescription]) -> Self {
        self.vertex_bindings.extend_from_slice(bindings);
        self
    }

    /// Appends vertex input attributes.
    pub fn vertex_attributes(mut self, attributes: &[vk::VertexInputAttributeDescription]) -> Self {
        self.vertex_attributes.extend_from_slice(attributes);
        self
    }

    /// Sets the primitive topology.
    pub fn topology(mut self, topology: PrimitiveTopology) -> Self {
        self.topology = topology;
        self
    }

    /// Sets the cull mode.
    pub fn cull_mode(mut self, mode: CullMode) -> Self {
        self.cull_mode = mode;
        self
    }

    /// Sets the format of the single color attachment. Required.
    ///
    /// Must match the image the pipeline renders into, normally the swapchain
    /// format.
    pub fn color_attachment_format(mut self, format: vk::Format) -> Self {
        self.color_attachment_format = Some(format);
        self
    }

    /// Creates the pipeline.
    ///
    /// Viewport and scissor are dynamic and must be set before drawing.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `layout` - Pipeline layout describing the bound descriptor sets
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::PipelineError`] if a shader or the color format is
    /// missing, or the Vulkan error if pipeline creation fails.
    pub fn build(self, device: Arc<Device>, layout: &PipelineLayout) -> RhiResult<Pipeline> {
        let vertex_shader = self
            .vertex_shader
            .ok_or_else(|| RhiError::PipelineError("Vertex shader is required".to_string()))?;
        let fragment_shader = self
            .fragment_shader
            .ok_or_else(|| RhiError::PipelineError("Fragment shader is required".to_string()))?;
        let color_format = self.color_attachment_format.ok_or_else(|| {
            RhiError::PipelineError("A color attachment format is required".to_string())
        })?;

        let shader_stages = [
            vertex_shader.stage_create_info(),
            fragment_shader.stage_create_info(),
        ];

        let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&self.vertex_bindings)
            .vertex_attribute_descriptions(&self.vertex_attributes);

        let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(self.topology.to_vk())
            .primitive_restart_enable(false);

        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        let rasterization_state = vk::PipelineRasterizationStateCreateInfo::default()
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(self.cull_mode.to_vk())
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE);

        let multisample_state = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let depth_stencil_state = vk::PipelineDepthStencilStateCreateInfo::default();

        let color_blend_attachments = [vk::PipelineColorBlendAttachmentState::default()
            .blend_enable(false)
            .color_write_mask(vk::ColorComponentFlags::RGBA)];
        let color_blend_state =
            vk::PipelineColorBlendStateCreateInfo::default().attachments(&color_blend_attachments);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let color_formats = [color_format];
        let mut rendering_info =
            vk::PipelineRenderingCreateInfo::default().color_attachment_formats(&color_formats);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input_state)
            .input_assembly_state(&input_assembly_state)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization_state)
            .multisample_state(&multisample_state)
            .depth_stencil_state(&depth_stencil_state)
            .color_blend_state(&color_blend_state)
            .dynamic_state(&dynamic_state)
            .layout(layout.handle())
            .push_next(&mut rendering_info);

        Pipeline::create_graphics_internal(device, &pipeline_info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_topology_to_vk() {
        assert_eq!(
            PrimitiveTopology::TriangleStrip.to_vk(),
            vk::PrimitiveTopology::TRIANGLE_STRIP
        );
        assert_eq!(
            PrimitiveTopology::default().to_vk(),
            vk::PrimitiveTopology::TRIANGLE_LIST
        );
    }

    #[test]
    fn test_cull_mode_to_vk() {
        assert_eq!(CullMode::None.to_vk(), vk::CullModeFlags::NONE);
        assert_eq!(CullMode::Back.to_vk(), vk::CullModeFlags::BACK);
    }

    #[test]
    fn test_builder_collects_vertex_input() {
        let binding = vk::VertexInputBindingDescription::default().binding(1).stride(16);
        let builder = GraphicsPipelineBuilder::new()
            .vertex_bindings(&[binding])
            .vertex_attributes(&[vk::VertexInputAttributeDescription::default().location(2)])
            .topology(PrimitiveTopology::TriangleStrip);
        assert_eq!(builder.vertex_bindings.len(), 1);
        assert_eq!(builder.vertex_attributes[0].location, 2);
        assert_eq!(builder.topology, PrimitiveTopology::TriangleStrip);
        assert!(builder.color_attachment_format.is_none());
    }
}

//! Vulkan implementation of [`CompositorBackend`].
//!
//! Every in-flight slot owns its command buffer, fence, plane textures,
//! scene-color target, quad vertex buffers and descriptor set, so a slot's
//! resources are only rewritten once the completion worker has seen its fence
//! signal and released the ticket.
//!
//! # Cycle
//!
//! 1. `begin_stream` waits on the slot fence (already signaled for a
//!    released ticket), begins the command buffer and records the scene pass
//! 2. plane uploads are recorded as buffer-to-image copies
//! 3. `encode_composite` acquires a swapchain image, rewrites the descriptor
//!    set if a bound view changed, and draws both quads
//! 4. `commit` submits with the slot fence and hands the fence to the
//!    completion worker before presenting

use std::mem::ManuallyDrop;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use ash::vk;
use tracing::{debug, error, info, trace, warn};

use compositor_core::config::PipelineConfig;
use compositor_platform::{Surface, Window};
use compositor_rhi::RhiError;
use compositor_rhi::buffer::{Buffer, BufferUsage};
use compositor_rhi::command::{CommandBuffer, CommandPool};
use compositor_rhi::descriptor::{
    DescriptorPool, DescriptorSetLayout, combined_image_sampler, image_info,
    update_descriptor_sets,
};
use compositor_rhi::device::Device;
use compositor_rhi::instance::Instance;
use compositor_rhi::physical_device::select_physical_device;
use compositor_rhi::pipeline::{
    CullMode, GraphicsPipelineBuilder, Pipeline, PipelineLayout, PrimitiveTopology,
};
use compositor_rhi::rendering::{ColorAttachment, RenderingConfig, layout_transition};
use compositor_rhi::sampler::Sampler;
use compositor_rhi::shader::{Shader, ShaderStage};
use compositor_rhi::swapchain::Swapchain;
use compositor_rhi::sync::{Fence, Semaphore};
use compositor_rhi::texture::{Image, PlaneTexture, PlaneUpload};
use compositor_rhi::vertex::{CAMERA_BINDING, QuadVertex};

use crate::completion::{CompletionSignal, CompletionWorker};
use crate::compositor::{CompositeInputs, CompositorBackend, PassOutcome};
use crate::error::{CompositorError, CompositorResult};
use crate::frame::{ImagePlane, PlaneKind};
use crate::geometry::QuadGeometry;
use crate::scheduler::FrameTicket;

/// SPIR-V file of the composite vertex shader, relative to the shader directory.
pub const VERTEX_SHADER: &str = "composite.vert.spv";
/// SPIR-V file of the composite fragment shader.
pub const FRAGMENT_SHADER: &str = "composite.frag.spv";

const SCENE_COLOR_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;
const QUAD_BYTES: vk::DeviceSize = (4 * size_of::<QuadVertex>()) as vk::DeviceSize;

/// A released ticket implies a signaled fence, so this only trips on a lost device.
const FENCE_TIMEOUT: Duration = Duration::from_secs(5);

/// Texture format backing a camera or matte plane. Scene color is rendered,
/// never uploaded.
pub fn plane_format(kind: PlaneKind) -> Option<vk::Format> {
    match kind {
        PlaneKind::Luma | PlaneKind::Alpha => Some(vk::Format::R8_UNORM),
        PlaneKind::Chroma => Some(vk::Format::R8G8_UNORM),
        PlaneKind::SceneColor => None,
    }
}

/// Descriptor bindings of the composite fragment shader.
fn texture_bindings() -> [vk::DescriptorSetLayoutBinding<'static>; 4] {
    [
        PlaneKind::Luma,
        PlaneKind::Chroma,
        PlaneKind::SceneColor,
        PlaneKind::Alpha,
    ]
    .map(|kind| combined_image_sampler(kind.binding(), vk::ShaderStageFlags::FRAGMENT))
}

/// Recording state of one cycle.
#[derive(Debug)]
pub struct VulkanStream {
    slot: usize,
    /// Swapchain image the composite pass renders into, once acquired.
    image_index: Option<u32>,
}

/// A plane texture bound for one composite pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VulkanTexture {
    /// Binding the texture is sampled through.
    pub kind: PlaneKind,
    /// View sampled by the fragment shader.
    pub view: vk::ImageView,
}

/// Completion of a slot's submission, as seen by the completion worker.
struct FenceSignal(Arc<Fence>);

impl CompletionSignal for FenceSignal {
    fn wait(&self) -> CompositorResult<()> {
        self.0.wait(Duration::MAX)?;
        Ok(())
    }
}

/// Image views last written into a slot's descriptor set, in binding order.
///
/// Handle values alone cannot tell a live view from a recreated one: a driver
/// may hand out the same value for a new view after the old one is destroyed.
/// Any recreation of a bound image must go through [`invalidate`](Self::invalidate).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct BoundViews(Option<[vk::ImageView; 4]>);

impl BoundViews {
    fn invalidate(&mut self) {
        self.0 = None;
    }

    /// Records `views` as bound. Returns true if the set must be rewritten.
    fn rebind(&mut self, views: [vk::ImageView; 4]) -> bool {
        if self.0 == Some(views) {
            return false;
        }
        self.0 = Some(views);
        true
    }
}

/// GPU resources owned by one in-flight slot.
struct FrameSlot {
    // Freed with the pool; declared first so it drops first.
    command_buffer: CommandBuffer,
    /// Owns `command_buffer`.
    _command_pool: CommandPool,
    /// Signaled when the slot's submission completes; shared with the completion worker.
    fence: Arc<Fence>,
    /// Signaled when the acquired swapchain image is ready.
    image_available: Semaphore,
    luma: PlaneTexture,
    chroma: PlaneTexture,
    alpha: PlaneTexture,
    /// Scene-color target, created at the drawable size on first use.
    scene_color: Option<Image>,
    /// Vertex buffer of the camera quad.
    image_plane: Buffer,
    /// Vertex buffer of the scene quad.
    scene_plane: Buffer,
    /// Geometry generation currently in the vertex buffers.
    geometry_generation: Option<u64>,
    descriptor_set: vk::DescriptorSet,
    bound_views: BoundViews,
}

impl FrameSlot {
    fn new(
        device: &Arc<Device>,
        graphics_family: u32,
        descriptor_set: vk::DescriptorSet,
    ) -> CompositorResult<Self> {
        let command_pool = CommandPool::new(device.clone(), graphics_family)?;
        let command_buffer = CommandBuffer::new(device.clone(), &command_pool)?;

        Ok(Self {
            command_buffer,
            _command_pool: command_pool,
            fence: Arc::new(Fence::new(device.clone(), true)?),
            image_available: Semaphore::new(device.clone())?,
            luma: new_plane_texture(device, PlaneKind::Luma)?,
            chroma: new_plane_texture(device, PlaneKind::Chroma)?,
            alpha: new_plane_texture(device, PlaneKind::Alpha)?,
            scene_color: None,
            image_plane: Buffer::new(device.clone(), BufferUsage::Vertex, QUAD_BYTES)?,
            scene_plane: Buffer::new(device.clone(), BufferUsage::Vertex, QUAD_BYTES)?,
            geometry_generation: None,
            descriptor_set,
            bound_views: BoundViews::default(),
        })
    }

    /// Records the scene pass: the scene-color target is (re)created at
    /// `extent`, cleared, and left ready for sampling.
    fn record_scene_pass(
        &mut self,
        device: Arc<Device>,
        extent: vk::Extent2D,
        clear_color: [f32; 4],
    ) -> CompositorResult<()> {
        let image = match self.scene_color.take() {
            Some(image) if image.extent() == extent => image,
            _ => {
                debug!(
                    "Creating scene-color target {}x{}",
                    extent.width, extent.height
                );
                self.bound_views.invalidate();
                Image::new(
                    device,
                    SCENE_COLOR_FORMAT,
                    extent,
                    vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
                    "scene-color",
                )?
            }
        };
        let image = self.scene_color.insert(image);

        image.transition(&self.command_buffer, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        let rendering = RenderingConfig::from_extent(extent)
            .with_color_attachment(ColorAttachment::new(image.view()).with_clear_color(clear_color))
            .build();
        self.command_buffer.begin_rendering(&rendering.info());
        self.command_buffer.end_rendering();
        image.transition(&self.command_buffer, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        Ok(())
    }

    /// Forgets the layouts recorded by a cycle that is never submitted.
    fn discard_contents(&mut self) {
        self.luma.discard_contents();
        self.chroma.discard_contents();
        self.alpha.discard_contents();
        if let Some(image) = self.scene_color.as_mut() {
            image.discard_contents();
        }
    }
}

/// Compositor backend rendering into a window swapchain.
///
/// Vulkan objects are wrapped in `ManuallyDrop` and destroyed in dependency
/// order by the [`Drop`] impl.
pub struct VulkanBackend {
    completion: CompletionWorker,
    slots: Vec<FrameSlot>,
    /// Render-finished semaphores, one per swapchain image.
    render_finished: Vec<Semaphore>,

    pipeline: ManuallyDrop<Pipeline>,
    pipeline_layout: ManuallyDrop<PipelineLayout>,
    descriptor_pool: ManuallyDrop<DescriptorPool>,
    descriptor_set_layout: ManuallyDrop<DescriptorSetLayout>,
    sampler: ManuallyDrop<Sampler>,
    swapchain: ManuallyDrop<Swapchain>,
    device: ManuallyDrop<Arc<Device>>,
    surface: ManuallyDrop<Surface>,
    instance: ManuallyDrop<Instance>,

    clear_color: [f32; 4],
    width: u32,
    height: u32,
    surface_stale: bool,
}

impl VulkanBackend {
    /// Creates the device, swapchain, composite pipeline and one resource
    /// set per in-flight slot.
    ///
    /// # Errors
    ///
    /// Fails if no suitable GPU exists, the shaders cannot be loaded from
    /// `config.shader_dir`, or any Vulkan object cannot be created.
    pub fn new(window: &Window, config: &PipelineConfig) -> CompositorResult<Self> {
        let (width, height) = window.size();
        info!("Initializing Vulkan compositor backend ({}x{})", width, height);

        let surface_extensions = window.required_surface_extensions()?;
        let instance = Instance::new(config.validation, &surface_extensions)?;
        let surface = window.create_surface(instance.entry(), instance.handle())?;

        let physical = select_physical_device(instance.handle(), surface.handle(), surface.loader())?;
        info!(
            "Using {} ({})",
            physical.device_name(),
            physical.device_type_name()
        );
        let device = Device::new(&instance, &physical)?;
        let Some(graphics_family) = device.queue_families().graphics_family else {
            return Err(CompositorError::Init("device has no graphics queue".into()));
        };

        let swapchain = Swapchain::new(
            &instance,
            device.clone(),
            surface.handle(),
            width,
            height,
            config.vsync,
        )?;

        let slot_count = config.max_frames_in_flight as u32;
        let descriptor_set_layout = DescriptorSetLayout::new(device.clone(), &texture_bindings())?;
        let pool_sizes = [vk::DescriptorPoolSize::default()
            .ty(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .descriptor_count(texture_bindings().len() as u32 * slot_count)];
        let descriptor_pool = DescriptorPool::new(device.clone(), slot_count, &pool_sizes)?;
        let sampler = Sampler::linear_clamp(device.clone())?;

        let (pipeline, pipeline_layout) = create_composite_pipeline(
            &device,
            &config.shader_dir,
            &descriptor_set_layout,
            swapchain.format(),
        )?;

        let layouts = vec![descriptor_set_layout.handle(); slot_count as usize];
        let slots = descriptor_pool
            .allocate(&layouts)?
            .into_iter()
            .map(|set| FrameSlot::new(&device, graphics_family, set))
            .collect::<CompositorResult<Vec<_>>>()?;

        let render_finished = create_semaphores(&device, swapchain.image_count())?;
        let completion = CompletionWorker::spawn("gpu-completion")?;

        info!(
            "Vulkan compositor backend ready: {} slot(s), {} swapchain image(s), validation {}",
            slots.len(),
            swapchain.image_count(),
            if instance.has_validation() { "on" } else { "off" }
        );

        Ok(Self {
            completion,
            slots,
            render_finished,
            pipeline: ManuallyDrop::new(pipeline),
            pipeline_layout: ManuallyDrop::new(pipeline_layout),
            descriptor_pool: ManuallyDrop::new(descriptor_pool),
            descriptor_set_layout: ManuallyDrop::new(descriptor_set_layout),
            sampler: ManuallyDrop::new(sampler),
            swapchain: ManuallyDrop::new(swapchain),
            device: ManuallyDrop::new(device),
            surface: ManuallyDrop::new(surface),
            instance: ManuallyDrop::new(instance),
            clear_color: config.clear_color,
            width,
            height,
            surface_stale: false,
        })
    }

    /// Returns the logical device.
    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// Returns the current swapchain size.
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    /// Tickets submitted to the completion worker and not yet released.
    pub fn pending_completions(&self) -> usize {
        self.completion.pending()
    }

    fn slot_mut(&mut self, index: usize) -> CompositorResult<&mut FrameSlot> {
        self.slots
            .get_mut(index)
            .ok_or_else(|| CompositorError::Backend(format!("no resources for slot {}", index)))
    }

    fn recreate_surface(&mut self) -> CompositorResult<()> {
        if self.width == 0 || self.height == 0 {
            return Ok(());
        }

        let format = self.swapchain.format();
        self.swapchain
            .recreate(&self.instance, self.surface.handle(), self.width, self.height)?;
        if self.swapchain.format() != format {
            return Err(CompositorError::Backend(format!(
                "surface format changed from {:?} to {:?}",
                format,
                self.swapchain.format()
            )));
        }

        // The device is idle after recreation, so no present waits on these.
        self.render_finished = create_semaphores(&self.device, self.swapchain.image_count())?;
        self.surface_stale = false;

        let extent = self.swapchain.extent();
        info!("Swapchain recreated: {}x{}", extent.width, extent.height);
        Ok(())
    }
}

impl CompositorBackend for VulkanBackend {
    type Stream = VulkanStream;
    type Texture = VulkanTexture;

    fn begin_stream(&mut self, ticket: &FrameTicket) -> CompositorResult<VulkanStream> {
        if self.surface_stale {
            self.recreate_surface()?;
        }

        let extent = self.swapchain.extent();
        let device = Arc::clone(self.device());
        let clear_color = self.clear_color;
        let slot = self.slot_mut(ticket.slot())?;

        slot.fence.wait(FENCE_TIMEOUT)?;
        slot.command_buffer.reset()?;
        slot.command_buffer.begin()?;
        slot.record_scene_pass(device, extent, clear_color)?;

        trace!(slot = ticket.slot(), sequence = ticket.sequence(), "Stream begun");
        Ok(VulkanStream {
            slot: ticket.slot(),
            image_index: None,
        })
    }

    fn plane_texture(
        &mut self,
        stream: &mut VulkanStream,
        kind: PlaneKind,
        plane: ImagePlane<'_>,
    ) -> CompositorResult<VulkanTexture> {
        let slot = self.slot_mut(stream.slot)?;
        let FrameSlot {
            command_buffer,
            luma,
            chroma,
            alpha,
            bound_views,
            ..
        } = slot;
        let texture = match kind {
            PlaneKind::Luma => luma,
            PlaneKind::Chroma => chroma,
            PlaneKind::Alpha => alpha,
            PlaneKind::SceneColor => {
                return Err(CompositorError::Backend(
                    "scene color is rendered, not uploaded".into(),
                ));
            }
        };

        let recreated = texture.upload(
            command_buffer,
            PlaneUpload {
                width: plane.width,
                height: plane.height,
                bytes_per_row: plane.bytes_per_row,
                data: plane.data,
            },
        )?;
        if recreated {
            debug!("{} texture resized to {}x{}", kind, plane.width, plane.height);
            bound_views.invalidate();
        }

        let view = texture
            .view()
            .ok_or_else(|| CompositorError::Backend(format!("{} texture has no view", kind)))?;
        Ok(VulkanTexture { kind, view })
    }

    fn scene_color(&mut self, stream: &mut VulkanStream) -> Option<VulkanTexture> {
        let image = self.slots.get(stream.slot)?.scene_color.as_ref()?;
        Some(VulkanTexture {
            kind: PlaneKind::SceneColor,
            view: image.view(),
        })
    }

    fn write_geometry(
        &mut self,
        stream: &mut VulkanStream,
        geometry: &QuadGeometry,
    ) -> CompositorResult<()> {
        let slot = self.slot_mut(stream.slot)?;
        if slot.geometry_generation == Some(geometry.generation()) {
            return Ok(());
        }

        slot.image_plane.write_data(0, geometry.image_plane_bytes())?;
        slot.scene_plane.write_data(0, geometry.scene_plane_bytes())?;
        slot.geometry_generation = Some(geometry.generation());
        trace!(
            slot = stream.slot,
            generation = geometry.generation(),
            "Quad geometry uploaded"
        );
        Ok(())
    }

    fn encode_composite(
        &mut self,
        stream: &mut VulkanStream,
        inputs: &CompositeInputs<VulkanTexture>,
    ) -> CompositorResult<PassOutcome> {
        let Some(slot) = self.slots.get_mut(stream.slot) else {
            return Err(CompositorError::Backend(format!(
                "no resources for slot {}",
                stream.slot
            )));
        };

        let image_index = match self
            .swapchain
            .acquire_next_image(slot.image_available.handle())
        {
            Ok((index, suboptimal)) => {
                if suboptimal {
                    self.surface_stale = true;
                }
                index
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                debug!("Swapchain out of date on acquire");
                self.surface_stale = true;
                return Ok(PassOutcome::SurfaceOutOfDate);
            }
            Err(e) => return Err(RhiError::from(e).into()),
        };

        let bindings = inputs.by_binding();
        let views = bindings.map(|(_, texture)| texture.view);
        if slot.bound_views.rebind(views) {
            let infos = views.map(|view| {
                image_info(
                    self.sampler.handle(),
                    view,
                    vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                )
            });
            let writes: Vec<_> = bindings
                .iter()
                .zip(&infos)
                .map(|((kind, _), info)| {
                    vk::WriteDescriptorSet::default()
                        .dst_set(slot.descriptor_set)
                        .dst_binding(kind.binding())
                        .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                        .image_info(std::slice::from_ref(info))
                })
                .collect();
            update_descriptor_sets(&self.device, &writes);
        }

        let cmd = &slot.command_buffer;
        let target = self.swapchain.image(image_index as usize);
        cmd.image_barriers(&[layout_transition(
            target,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        )]);

        let rendering = RenderingConfig::from_extent(self.swapchain.extent())
            .with_color_attachment(
                ColorAttachment::new(self.swapchain.image_view(image_index as usize)).dont_care(),
            )
            .build();
        cmd.begin_rendering(&rendering.info());
        let (viewport, scissor) = rendering.viewport_and_scissor();
        cmd.set_viewport(&viewport);
        cmd.set_scissor(&scissor);
        cmd.bind_graphics_pipeline(self.pipeline.handle());
        cmd.bind_vertex_buffers(
            CAMERA_BINDING,
            &[slot.image_plane.handle(), slot.scene_plane.handle()],
            &[0, 0],
        );
        cmd.bind_descriptor_sets(self.pipeline_layout.handle(), 0, &[slot.descriptor_set]);
        cmd.draw(4, 1, 0, 0);
        cmd.end_rendering();

        cmd.image_barriers(&[layout_transition(
            target,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::PRESENT_SRC_KHR,
        )]);

        stream.image_index = Some(image_index);
        Ok(PassOutcome::Completed)
    }

    fn commit(&mut self, stream: VulkanStream, ticket: FrameTicket) -> CompositorResult<PassOutcome> {
        let Some(image_index) = stream.image_index else {
            self.discard(stream, ticket);
            return Err(CompositorError::Backend(
                "commit without an encoded composite pass".into(),
            ));
        };
        let render_finished = self
            .render_finished
            .get(image_index as usize)
            .map(Semaphore::handle)
            .ok_or_else(|| {
                CompositorError::Backend(format!("no semaphore for image {}", image_index))
            })?;
        let Some(slot) = self.slots.get(stream.slot) else {
            return Err(CompositorError::Backend(format!(
                "no resources for slot {}",
                stream.slot
            )));
        };

        slot.command_buffer.end()?;

        let wait_semaphores = [slot.image_available.handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [slot.command_buffer.handle()];
        let signal_semaphores = [render_finished];
        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        // Reset only once submission is certain to be attempted.
        slot.fence.reset()?;
        unsafe {
            self.device.submit_graphics(&[submit_info], slot.fence.handle())?;
        }
        let signal = FenceSignal(Arc::clone(&slot.fence));
        self.completion.submit(signal, ticket)?;

        match self.swapchain.present(image_index, render_finished) {
            Ok(suboptimal) => {
                if suboptimal {
                    self.surface_stale = true;
                }
                Ok(PassOutcome::Completed)
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                debug!("Swapchain out of date on present");
                self.surface_stale = true;
                Ok(PassOutcome::SurfaceOutOfDate)
            }
            Err(e) => Err(RhiError::from(e).into()),
        }
    }

    fn discard(&mut self, stream: VulkanStream, ticket: FrameTicket) {
        if stream.image_index.is_some() {
            warn!(
                slot = stream.slot,
                "Discarding a cycle that already acquired a swapchain image"
            );
        }
        if let Some(slot) = self.slots.get_mut(stream.slot) {
            if let Err(e) = slot.command_buffer.reset() {
                warn!("Failed to reset command buffer of slot {}: {}", stream.slot, e);
            }
            slot.discard_contents();
        }
        // Nothing was submitted, so the slot is free again right away.
        ticket.complete();
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.surface_stale = true;
    }
}

impl Drop for VulkanBackend {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            error!("Failed to wait for device idle during cleanup: {}", e);
        }

        // All fences have signaled, so the worker drains without blocking.
        self.completion.shutdown();
        self.slots.clear();
        self.render_finished.clear();

        unsafe {
            ManuallyDrop::drop(&mut self.pipeline);
            ManuallyDrop::drop(&mut self.pipeline_layout);
            ManuallyDrop::drop(&mut self.descriptor_pool);
            ManuallyDrop::drop(&mut self.descriptor_set_layout);
            ManuallyDrop::drop(&mut self.sampler);
            ManuallyDrop::drop(&mut self.swapchain);
            ManuallyDrop::drop(&mut self.device);
            ManuallyDrop::drop(&mut self.surface);
            ManuallyDrop::drop(&mut self.instance);
        }

        info!("Vulkan compositor backend destroyed");
    }
}

fn create_composite_pipeline(
    device: &Arc<Device>,
    shader_dir: &Path,
    set_layout: &DescriptorSetLayout,
    color_format: vk::Format,
) -> CompositorResult<(Pipeline, PipelineLayout)> {
    let vertex_shader = Shader::from_spirv_file(
        device.clone(),
        &shader_dir.join(VERTEX_SHADER),
        ShaderStage::Vertex,
        "main",
    )?;
    let fragment_shader = Shader::from_spirv_file(
        device.clone(),
        &shader_dir.join(FRAGMENT_SHADER),
        ShaderStage::Fragment,
        "main",
    )?;

    let layout = PipelineLayout::new(device.clone(), &[set_layout.handle()], &[])?;
    let pipeline = GraphicsPipelineBuilder::new()
        .vertex_shader(&vertex_shader)
        .fragment_shader(&fragment_shader)
        .vertex_bindings(&QuadVertex::composite_bindings())
        .vertex_attributes(&QuadVertex::composite_attributes())
        .topology(PrimitiveTopology::TriangleStrip)
        .cull_mode(CullMode::None)
        .color_attachment_format(color_format)
        .build(device.clone(), &layout)?;

    debug!("Composite pipeline created for {:?}", color_format);
    Ok((pipeline, layout))
}

fn new_plane_texture(device: &Arc<Device>, kind: PlaneKind) -> CompositorResult<PlaneTexture> {
    let format = plane_format(kind)
        .ok_or_else(|| CompositorError::Backend(format!("{} has no upload format", kind)))?;
    Ok(PlaneTexture::new(device.clone(), format, kind.name())?)
}

fn create_semaphores(device: &Arc<Device>, count: u32) -> CompositorResult<Vec<Semaphore>> {
    (0..count)
        .map(|_| Semaphore::new(device.clone()).map_err(CompositorError::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[test]
    fn test_plane_formats() {
        assert_eq!(plane_format(PlaneKind::Luma), Some(vk::Format::R8_UNORM));
        assert_eq!(plane_format(PlaneKind::Chroma), Some(vk::Format::R8G8_UNORM));
        assert_eq!(plane_format(PlaneKind::Alpha), Some(vk::Format::R8_UNORM));
        assert_eq!(plane_format(PlaneKind::SceneColor), None);
    }

    #[test]
    fn test_plane_format_matches_texel_size() {
        for kind in [PlaneKind::Luma, PlaneKind::Chroma, PlaneKind::Alpha] {
            let format = plane_format(kind).expect("uploadable plane");
            assert_eq!(
                compositor_rhi::texture::bytes_per_texel(format),
                Some(kind.bytes_per_texel())
            );
        }
    }

    #[test]
    fn test_texture_bindings_follow_plane_kinds() {
        let bindings = texture_bindings();
        let numbers: Vec<u32> = bindings.iter().map(|b| b.binding).collect();
        assert_eq!(numbers, vec![0, 1, 2, 3]);
        assert!(bindings.iter().all(|b| {
            b.descriptor_type == vk::DescriptorType::COMBINED_IMAGE_SAMPLER
                && b.stage_flags == vk::ShaderStageFlags::FRAGMENT
        }));
    }

    #[test]
    fn test_quad_buffer_size() {
        assert_eq!(QUAD_BYTES, QuadGeometry::new().image_plane_bytes().len() as u64);
    }

    fn views(raw: [u64; 4]) -> [vk::ImageView; 4] {
        raw.map(vk::ImageView::from_raw)
    }

    #[test]
    fn test_bound_views_rewrite_on_change() {
        let mut bound = BoundViews::default();
        assert!(bound.rebind(views([1, 2, 3, 4])));
        assert!(!bound.rebind(views([1, 2, 3, 4])));
        assert!(bound.rebind(views([1, 2, 5, 4])));
    }

    #[test]
    fn test_recreated_view_with_same_handle_is_rewritten() {
        let mut bound = BoundViews::default();
        assert!(bound.rebind(views([1, 2, 3, 4])));

        // The luma image was recreated and the driver reused handle 1.
        bound.invalidate();
        assert!(bound.rebind(views([1, 2, 3, 4])));
        assert!(!bound.rebind(views([1, 2, 3, 4])));
    }

    #[test]
    fn test_fence_signal_is_send() {
        fn assert_send<T: Send + 'static>() {}
        assert_send::<FenceSignal>();
    }
}

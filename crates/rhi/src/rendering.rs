//! Dynamic rendering helpers and image layout transitions.
//!
//! The compositor records two rendering scopes per cycle: an empty scene pass
//! that clears the offscreen scene-color target, and the composite pass that
//! draws one quad into the acquired swapchain image. Both use
//! `VK_KHR_dynamic_rendering` (core in Vulkan 1.3), so attachments are
//! described at record time instead of through render pass objects.
//!
//! # Example
//!
//! ```no_run
//! use ash::vk;
//! use compositor_rhi::rendering::{ColorAttachment, RenderingConfig};
//!
//! # fn example(view: vk::ImageView, extent: vk::Extent2D) {
//! let bundle = RenderingConfig::from_extent(extent)
//!     .with_color_attachment(ColorAttachment::new(view).with_clear_color([0.0, 0.0, 0.0, 1.0]))
//!     .build();
//! let _info = bundle.info();
//! # }
//! ```

use ash::vk;
use tracing::warn;

use crate::texture::color_subresource_range;

/// A color attachment for `vkCmdBeginRendering`.
#[derive(Clone)]
pub struct ColorAttachment {
    /// View rendered into.
    pub image_view: vk::ImageView,
    /// Layout the image is in during rendering.
    pub layout: vk::ImageLayout,
    pub load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
    /// Used when `load_op` is `CLEAR`.
    pub clear_value: vk::ClearColorValue,
}

impl ColorAttachment {
    /// Color attachment in `COLOR_ATTACHMENT_OPTIMAL` that clears to opaque
    /// black and stores its result.
    #[inline]
    pub fn new(image_view: vk::ImageView) -> Self {
        Self {
            image_view,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            clear_value: vk::ClearColorValue {
                float32: [0.0, 0.0, 0.0, 1.0],
            },
        }
    }

    /// Clears to `color` (linear RGBA) on load.
    #[inline]
    pub fn with_clear_color(mut self, color: [f32; 4]) -> Self {
        self.load_op = vk::AttachmentLoadOp::CLEAR;
        self.clear_value = vk::ClearColorValue { float32: color };
        self
    }

    /// Every pixel is overwritten, so previous contents are not loaded.
    #[inline]
    pub fn dont_care(mut self) -> Self {
        self.load_op = vk::AttachmentLoadOp::DONT_CARE;
        self
    }

    /// Converts to the Vulkan attachment description.
    #[inline]
    pub fn to_rendering_attachment_info(&self) -> vk::RenderingAttachmentInfo<'static> {
        vk::RenderingAttachmentInfo::default()
            .image_view(self.image_view)
            .image_layout(self.layout)
            .load_op(self.load_op)
            .store_op(self.store_op)
            .clear_value(vk::ClearValue {
                color: self.clear_value,
            })
    }
}

impl std::fmt::Debug for ColorAttachment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Union; always written through float32 here.
        let clear_color = unsafe { self.clear_value.float32 };
        f.debug_struct("ColorAttachment")
            .field("image_view", &self.image_view)
            .field("layout", &self.layout)
            .field("load_op", &self.load_op)
            .field("store_op", &self.store_op)
            .field("clear_value", &clear_color)
            .finish()
    }
}

/// Description of one dynamic rendering scope.
///
/// Call [`build`](Self::build) to get a [`RenderingInfoBundle`] that owns the
/// Vulkan attachment infos for as long as recording needs them.
#[derive(Clone, Debug)]
pub struct RenderingConfig {
    /// Color attachments in location order.
    pub color_attachments: Vec<ColorAttachment>,
    /// Area affected by rendering, normally the full attachment extent.
    pub render_area: vk::Rect2D,
}

impl RenderingConfig {
    /// Render area covering `extent` from the origin, with no attachments yet.
    #[inline]
    pub fn from_extent(extent: vk::Extent2D) -> Self {
        Self {
            color_attachments: Vec::new(),
            render_area: vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            },
        }
    }

    /// Appends a color attachment at the next location.
    #[inline]
    pub fn with_color_attachment(mut self, attachment: ColorAttachment) -> Self {
        self.color_attachments.push(attachment);
        self
    }

    /// Returns the render area extent.
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.render_area.extent
    }

    /// Converts the attachments into Vulkan form.
    pub fn build(&self) -> RenderingInfoBundle {
        RenderingInfoBundle {
            color_attachments: self
                .color_attachments
                .iter()
                .map(ColorAttachment::to_rendering_attachment_info)
                .collect(),
            render_area: self.render_area,
        }
    }
}

/// Owns the attachment infos that `vk::RenderingInfo` points into.
pub struct RenderingInfoBundle {
    color_attachments: Vec<vk::RenderingAttachmentInfo<'static>>,
    render_area: vk::Rect2D,
}

impl RenderingInfoBundle {
    /// Rendering info for [`CommandBuffer::begin_rendering`](crate::command::CommandBuffer::begin_rendering).
    ///
    /// Borrows the attachment infos; keep the bundle alive while recording.
    pub fn info(&self) -> vk::RenderingInfo<'_> {
        vk::RenderingInfo::default()
            .render_area(self.render_area)
            .layer_count(1)
            .color_attachments(&self.color_attachments)
    }

    /// Full-extent viewport and scissor.
    pub fn viewport_and_scissor(&self) -> (vk::Viewport, vk::Rect2D) {
        let extent = self.render_area.extent;
        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        (viewport, self.render_area)
    }
}

/// Builds a synchronization2 barrier for a known color layout transition.
///
/// Unknown pairs fall back to a full `ALL_COMMANDS` barrier with a warning.
pub fn layout_transition(
    image: vk::Image,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) -> vk::ImageMemoryBarrier2<'static> {
    use vk::AccessFlags2 as A;
    use vk::ImageLayout as L;
    use vk::PipelineStageFlags2 as S;

    let (src_stage, src_access, dst_stage, dst_access) = match (old_layout, new_layout) {
        (L::UNDEFINED, L::TRANSFER_DST_OPTIMAL)
        | (L::SHADER_READ_ONLY_OPTIMAL, L::TRANSFER_DST_OPTIMAL) => (
            S::FRAGMENT_SHADER,
            A::NONE,
            S::COPY,
            A::TRANSFER_WRITE,
        ),
        (L::TRANSFER_DST_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL) => (
            S::COPY,
            A::TRANSFER_WRITE,
            S::FRAGMENT_SHADER,
            A::SHADER_SAMPLED_READ,
        ),
        (L::UNDEFINED, L::COLOR_ATTACHMENT_OPTIMAL)
        | (L::SHADER_READ_ONLY_OPTIMAL, L::COLOR_ATTACHMENT_OPTIMAL) => (
            S::COLOR_ATTACHMENT_OUTPUT | S::FRAGMENT_SHADER,
            A::NONE,
            S::COLOR_ATTACHMENT_OUTPUT,
            A::COLOR_ATTACHMENT_WRITE,
        ),
        (L::COLOR_ATTACHMENT_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL) => (
            S::COLOR_ATTACHMENT_OUTPUT,
            A::COLOR_ATTACHMENT_WRITE,
            S::FRAGMENT_SHADER,
            A::SHADER_SAMPLED_READ,
        ),
        (L::COLOR_ATTACHMENT_OPTIMAL, L::PRESENT_SRC_KHR) => (
            S::COLOR_ATTACHMENT_OUTPUT,
            A::COLOR_ATTACHMENT_WRITE,
            S::NONE,
            A::NONE,
        ),
        _ => {
            warn!(
                "Unhandled layout transition {:?} -> {:?}, using full barrier",
                old_layout, new_layout
            );
            (
                S::ALL_COMMANDS,
                A::MEMORY_WRITE,
                S::ALL_COMMANDS,
                A::MEMORY_READ | A::MEMORY_WRITE,
            )
        }
    };

    vk::ImageMemoryBarrier2::default()
        .src_stage_mask(src_stage)
        .src_access_mask(src_access)
        .dst_stage_mask(dst_stage)
        .dst_access_mask(dst_access)
        .old_layout(old_layout)
        .new_layout(new_layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(color_subresource_range())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_attachment_defaults() {
        let attachment = ColorAttachment::new(vk::ImageView::null());
        assert_eq!(attachment.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(attachment.store_op, vk::AttachmentStoreOp::STORE);
        assert_eq!(attachment.layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);

        let info = attachment
            .with_clear_color([0.25, 0.5, 0.75, 1.0])
            .to_rendering_attachment_info();
        assert_eq!(unsafe { info.clear_value.color.float32 }, [0.25, 0.5, 0.75, 1.0]);
    }

    #[test]
    fn test_rendering_bundle() {
        let extent = vk::Extent2D {
            width: 1170,
            height: 2532,
        };
        let bundle = RenderingConfig::from_extent(extent)
            .with_color_attachment(ColorAttachment::new(vk::ImageView::null()).dont_care())
            .build();
        let info = bundle.info();
        assert_eq!(info.color_attachment_count, 1);
        assert_eq!(info.layer_count, 1);

        let (viewport, scissor) = bundle.viewport_and_scissor();
        assert_eq!(viewport.width, 1170.0);
        assert_eq!(viewport.height, 2532.0);
        assert_eq!(scissor.extent, extent);
    }

    #[test]
    fn test_upload_transitions() {
        let to_dst = layout_transition(
            vk::Image::null(),
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        );
        assert_eq!(to_dst.dst_access_mask, vk::AccessFlags2::TRANSFER_WRITE);

        let to_read = layout_transition(
            vk::Image::null(),
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        );
        assert_eq!(to_read.src_stage_mask, vk::PipelineStageFlags2::COPY);
        assert_eq!(
            to_read.dst_stage_mask,
            vk::PipelineStageFlags2::FRAGMENT_SHADER
        );
    }

    #[test]
    fn test_unknown_transition_falls_back() {
        let barrier = layout_transition(
            vk::Image::null(),
            vk::ImageLayout::GENERAL,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        );
        assert_eq!(
            barrier.src_stage_mask,
            vk::PipelineStageFlags2::ALL_COMMANDS
        );
    }
}

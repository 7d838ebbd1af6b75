//! The composite pass and the GPU seam it is issued through.
//!
//! One pass blends the camera image (reconstructed from luma and chroma) with
//! the scene-color texture, using the alpha matte as a hole-cut mask: alpha 1
//! shows scene content, alpha 0 shows the camera. The pass needs all four
//! textures; if any is missing it is skipped and the last presented image
//! stays on screen.

use crate::converter::ConvertedTextures;
use crate::error::CompositorResult;
use crate::frame::{ImagePlane, PlaneKind};
use crate::geometry::QuadGeometry;
use crate::scheduler::FrameTicket;

/// Result of the surface-facing backend steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    /// The pass was recorded or presented.
    Completed,
    /// The surface must be rebuilt; nothing was presented.
    SurfaceOutOfDate,
}

/// Every texture one composite pass samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompositeInputs<T> {
    /// Luma plane texture.
    pub luma: T,
    /// Chroma plane texture.
    pub chroma: T,
    /// Rendered scene color.
    pub scene_color: T,
    /// Segmentation matte texture.
    pub alpha: T,
}

impl<T: Copy> CompositeInputs<T> {
    /// Collects the pass inputs, or names the first missing texture.
    pub fn collect(
        converted: &ConvertedTextures<T>,
        scene_color: Option<T>,
    ) -> Result<Self, PlaneKind> {
        Ok(Self {
            luma: converted.luma.ok_or(PlaneKind::Luma)?,
            chroma: converted.chroma.ok_or(PlaneKind::Chroma)?,
            scene_color: scene_color.ok_or(PlaneKind::SceneColor)?,
            alpha: converted.alpha.ok_or(PlaneKind::Alpha)?,
        })
    }

    /// Textures in binding order.
    pub fn by_binding(&self) -> [(PlaneKind, T); 4] {
        [
            (PlaneKind::Luma, self.luma),
            (PlaneKind::Chroma, self.chroma),
            (PlaneKind::SceneColor, self.scene_color),
            (PlaneKind::Alpha, self.alpha),
        ]
    }
}

/// GPU-side services the pipeline drives once per cycle.
///
/// A cycle is `begin_stream`, any number of texture and geometry writes,
/// `encode_composite`, and then exactly one of `commit` or `discard`. The
/// ticket reaches the backend in `commit`/`discard` and must be released only
/// once the GPU no longer reads the slot's resources.
pub trait CompositorBackend {
    /// Per-cycle recording state.
    type Stream;
    /// Handle to a texture usable by this cycle's pass.
    type Texture: Copy;

    /// Starts recording into the resources of `ticket`'s slot.
    ///
    /// # Errors
    ///
    /// Fails if the slot's previous work cannot be waited on or recording
    /// cannot start.
    fn begin_stream(&mut self, ticket: &FrameTicket) -> CompositorResult<Self::Stream>;

    /// Makes `plane` available to this cycle's pass as a `kind` texture.
    ///
    /// # Errors
    ///
    /// Fails if the plane is malformed or its texture cannot be created or
    /// filled. The pipeline treats the texture as missing.
    fn plane_texture(
        &mut self,
        stream: &mut Self::Stream,
        kind: PlaneKind,
        plane: ImagePlane<'_>,
    ) -> CompositorResult<Self::Texture>;

    /// The rendered scene for this cycle, if there is one.
    fn scene_color(&mut self, stream: &mut Self::Stream) -> Option<Self::Texture>;

    /// Makes `geometry`'s quads available to this cycle's pass.
    ///
    /// Backends may skip the upload when the geometry generation is unchanged.
    ///
    /// # Errors
    ///
    /// Fails if the vertex data cannot be written.
    fn write_geometry(
        &mut self,
        stream: &mut Self::Stream,
        geometry: &QuadGeometry,
    ) -> CompositorResult<()>;

    /// Records the composite pass into the drawable.
    ///
    /// # Errors
    ///
    /// Fails on backend errors. A surface that needs rebuilding is reported as
    /// [`PassOutcome::SurfaceOutOfDate`].
    fn encode_composite(
        &mut self,
        stream: &mut Self::Stream,
        inputs: &CompositeInputs<Self::Texture>,
    ) -> CompositorResult<PassOutcome>;

    /// Submits the cycle and presents it.
    ///
    /// `ticket` is released once the GPU has finished with the slot.
    ///
    /// # Errors
    ///
    /// Fails if submission fails. The ticket is still released.
    fn commit(&mut self, stream: Self::Stream, ticket: FrameTicket)
    -> CompositorResult<PassOutcome>;

    /// Abandons the cycle; nothing is presented.
    fn discard(&mut self, stream: Self::Stream, ticket: FrameTicket);

    /// The drawable changed size.
    fn resize(&mut self, width: u32, height: u32);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn converted(luma: bool, chroma: bool, alpha: bool) -> ConvertedTextures<u32> {
        ConvertedTextures {
            luma: luma.then_some(0),
            chroma: chroma.then_some(1),
            alpha: alpha.then_some(3),
        }
    }

    #[test]
    fn test_collect_complete() {
        let inputs =
            CompositeInputs::collect(&converted(true, true, true), Some(2)).expect("complete");
        let bindings: Vec<_> = inputs
            .by_binding()
            .iter()
            .map(|(kind, texture)| (kind.binding(), *texture))
            .collect();
        assert_eq!(bindings, vec![(0, 0), (1, 1), (2, 2), (3, 3)]);
    }

    #[test]
    fn test_collect_names_missing_texture() {
        assert_eq!(
            CompositeInputs::collect(&converted(false, true, true), Some(2)),
            Err(PlaneKind::Luma)
        );
        assert_eq!(
            CompositeInputs::collect(&converted(true, false, true), Some(2)),
            Err(PlaneKind::Chroma)
        );
        assert_eq!(
            CompositeInputs::collect(&converted(true, true, true), None),
            Err(PlaneKind::SceneColor)
        );
        assert_eq!(
            CompositeInputs::collect(&converted(true, true, false), Some(2)),
            Err(PlaneKind::Alpha)
        );
    }
}

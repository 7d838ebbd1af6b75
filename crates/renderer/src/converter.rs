//! Turns a camera frame into textures for one composite pass.
//!
//! Planes 0 (luma) and 1 (chroma) are handed to the backend's texture path;
//! the matte generator produces the alpha plane, which takes the same path.
//! Failures are per texture: whatever succeeded is returned, and the
//! compositor decides whether the pass can run.

use compositor_core::MatteResolution;
use tracing::{debug, warn};

use crate::compositor::CompositorBackend;
use crate::frame::{CameraFrame, ImagePlane, MatteGenerator, PlaneKind};

/// Frames with fewer planes are not bi-planar camera images.
pub const MIN_PLANES: usize = 2;

/// Textures produced for one frame. A `None` entry failed to convert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvertedTextures<T> {
    /// Full-resolution luma plane.
    pub luma: Option<T>,
    /// Half-resolution interleaved chroma plane.
    pub chroma: Option<T>,
    /// Segmentation matte.
    pub alpha: Option<T>,
}

impl<T> ConvertedTextures<T> {
    /// Whether every camera-side texture is present.
    pub fn is_complete(&self) -> bool {
        self.luma.is_some() && self.chroma.is_some() && self.alpha.is_some()
    }
}

/// Result of [`FrameConverter::convert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conversion<T> {
    /// The frame was not usable; no texture was touched.
    InsufficientPlanes { found: usize },
    /// The frame had enough planes; see the entries for per-texture failures.
    Converted(ConvertedTextures<T>),
}

/// Converts camera frames and mattes into backend textures.
#[derive(Debug, Clone, Copy)]
pub struct FrameConverter {
    matte_resolution: MatteResolution,
}

impl FrameConverter {
    /// Creates a converter requesting mattes at `matte_resolution`.
    pub fn new(matte_resolution: MatteResolution) -> Self {
        Self { matte_resolution }
    }

    /// Resolution requested from the matte generator.
    #[inline]
    pub fn matte_resolution(&self) -> MatteResolution {
        self.matte_resolution
    }

    /// Uploads the luma and chroma planes of `frame` and its matte.
    ///
    /// # Arguments
    ///
    /// * `frame` - The camera frame, borrowed for this call only
    /// * `matte` - Segmentation collaborator asked for the alpha plane
    /// * `backend` - Texture path for every plane
    /// * `stream` - Recording state of the current cycle
    ///
    /// Frames with fewer than [`MIN_PLANES`] planes return
    /// [`Conversion::InsufficientPlanes`] without touching the backend. Upload
    /// and matte failures are logged and leave the entry `None`.
    pub fn convert<B, M>(
        &self,
        frame: &dyn CameraFrame,
        matte: &mut M,
        backend: &mut B,
        stream: &mut B::Stream,
    ) -> Conversion<B::Texture>
    where
        B: CompositorBackend,
        M: MatteGenerator + ?Sized,
    {
        let found = frame.plane_count();
        if found < MIN_PLANES {
            debug!("Frame has {} plane(s), need {}", found, MIN_PLANES);
            return Conversion::InsufficientPlanes { found };
        }

        let luma = wrap_plane(backend, stream, PlaneKind::Luma, frame.plane(0));
        let chroma = wrap_plane(backend, stream, PlaneKind::Chroma, frame.plane(1));

        let alpha = match matte.generate_matte(frame, self.matte_resolution) {
            Some(matte) => wrap_plane(backend, stream, PlaneKind::Alpha, Some(matte.as_plane())),
            None => {
                debug!(
                    "Matte generation failed for frame at {:?}",
                    frame.timestamp()
                );
                None
            }
        };

        Conversion::Converted(ConvertedTextures {
            luma,
            chroma,
            alpha,
        })
    }
}

fn wrap_plane<B: CompositorBackend>(
    backend: &mut B,
    stream: &mut B::Stream,
    kind: PlaneKind,
    plane: Option<ImagePlane<'_>>,
) -> Option<B::Texture> {
    let Some(plane) = plane else {
        debug!("Frame has no {} plane", kind);
        return None;
    };
    if !plane.is_valid(kind.bytes_per_texel()) {
        debug!(
            "{} plane layout is inconsistent: {}x{}, {} bytes per row, {} bytes",
            kind,
            plane.width,
            plane.height,
            plane.bytes_per_row,
            plane.data.len()
        );
        return None;
    }

    match backend.plane_texture(stream, kind, plane) {
        Ok(texture) => Some(texture),
        Err(e) => {
            warn!("Failed to wrap {} plane: {}", kind, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compositor::{CompositeInputs, PassOutcome};
    use crate::error::{CompositorError, CompositorResult};
    use crate::frame::{AlphaMatte, PlanarFrame};
    use crate::geometry::QuadGeometry;
    use crate::scheduler::FrameTicket;
    use std::time::Duration;

    /// Records uploaded planes; fails uploads of `failing`.
    #[derive(Default)]
    struct RecordingBackend {
        uploads: Vec<(PlaneKind, u32, u32)>,
        failing: Option<PlaneKind>,
    }

    impl CompositorBackend for RecordingBackend {
        type Stream = ();
        type Texture = PlaneKind;

        fn begin_stream(&mut self, _ticket: &FrameTicket) -> CompositorResult<()> {
            Ok(())
        }

        fn plane_texture(
            &mut self,
            _stream: &mut (),
            kind: PlaneKind,
            plane: ImagePlane<'_>,
        ) -> CompositorResult<PlaneKind> {
            if self.failing == Some(kind) {
                return Err(CompositorError::Backend("out of memory".into()));
            }
            self.uploads.push((kind, plane.width, plane.height));
            Ok(kind)
        }

        fn scene_color(&mut self, _stream: &mut ()) -> Option<PlaneKind> {
            Some(PlaneKind::SceneColor)
        }

        fn write_geometry(&mut self, _: &mut (), _: &QuadGeometry) -> CompositorResult<()> {
            Ok(())
        }

        fn encode_composite(
            &mut self,
            _: &mut (),
            _: &CompositeInputs<PlaneKind>,
        ) -> CompositorResult<PassOutcome> {
            Ok(PassOutcome::Completed)
        }

        fn commit(&mut self, _: (), _: FrameTicket) -> CompositorResult<PassOutcome> {
            Ok(PassOutcome::Completed)
        }

        fn discard(&mut self, _: (), _: FrameTicket) {}

        fn resize(&mut self, _: u32, _: u32) {}
    }

    struct HalfMatte;

    impl MatteGenerator for HalfMatte {
        fn generate_matte(
            &mut self,
            frame: &dyn CameraFrame,
            resolution: MatteResolution,
        ) -> Option<AlphaMatte> {
            let size = frame.image_size();
            let (width, height) = resolution.scale(size.x, size.y);
            AlphaMatte::filled(width, height, 255)
        }
    }

    struct NoMatte;

    impl MatteGenerator for NoMatte {
        fn generate_matte(&mut self, _: &dyn CameraFrame, _: MatteResolution) -> Option<AlphaMatte> {
            None
        }
    }

    fn frame() -> PlanarFrame {
        PlanarFrame::nv12(8, 4, vec![0; 32], vec![128; 16], Duration::ZERO)
    }

    #[test]
    fn test_converts_all_planes() {
        let converter = FrameConverter::new(MatteResolution::Half);
        let mut backend = RecordingBackend::default();

        let result = converter.convert(&frame(), &mut HalfMatte, &mut backend, &mut ());

        let Conversion::Converted(textures) = result else {
            panic!("expected conversion, got {:?}", result);
        };
        assert!(textures.is_complete());
        assert_eq!(
            backend.uploads,
            vec![
                (PlaneKind::Luma, 8, 4),
                (PlaneKind::Chroma, 4, 2),
                (PlaneKind::Alpha, 4, 2),
            ]
        );
    }

    #[test]
    fn test_single_plane_frame_is_rejected() {
        let converter = FrameConverter::new(MatteResolution::Half);
        let mut backend = RecordingBackend::default();
        let mut single = frame();
        single.truncate_planes(1);

        let result = converter.convert(&single, &mut HalfMatte, &mut backend, &mut ());

        assert_eq!(result, Conversion::InsufficientPlanes { found: 1 });
        assert!(backend.uploads.is_empty());
    }

    #[test]
    fn test_partial_results() {
        let converter = FrameConverter::new(MatteResolution::Full);
        let mut backend = RecordingBackend {
            failing: Some(PlaneKind::Chroma),
            ..Default::default()
        };

        let result = converter.convert(&frame(), &mut NoMatte, &mut backend, &mut ());

        assert_eq!(
            result,
            Conversion::Converted(ConvertedTextures {
                luma: Some(PlaneKind::Luma),
                chroma: None,
                alpha: None,
            })
        );
    }
}

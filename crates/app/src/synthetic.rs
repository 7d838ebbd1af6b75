//! Synthetic camera session and matte generator.
//!
//! Stand-ins for a tracking session so the compositor can run on a desktop.
//! Both deliberately misbehave on a fixed cadence so the degraded paths are
//! visible in the running demo.

use std::sync::Arc;
use std::time::{Duration, Instant};

use compositor_core::MatteResolution;
use compositor_core::config::CameraConfig;
use compositor_renderer::frame::{AlphaMatte, ImagePlane, PlanarFrame};
use compositor_renderer::transform::aspect_fill_display_transform;
use compositor_renderer::{CameraFrame, MatteGenerator, Orientation, SessionSource};
use glam::{DAffine2, DVec2, UVec2};
use tracing::debug;

/// Every this many frames, one frame carries only its luma plane.
pub const SINGLE_PLANE_INTERVAL: u64 = 240;

/// Every this many requests, matte generation fails.
pub const MATTE_FAILURE_INTERVAL: u64 = 180;

/// A frame shared between the pipeline and the region-selection path.
#[derive(Debug, Clone)]
pub struct SyntheticFrame(Arc<PlanarFrame>);

impl CameraFrame for SyntheticFrame {
    fn plane_count(&self) -> usize {
        self.0.plane_count()
    }

    fn plane(&self, index: usize) -> Option<ImagePlane<'_>> {
        self.0.plane(index)
    }

    fn image_size(&self) -> UVec2 {
        self.0.image_size()
    }

    fn timestamp(&self) -> Duration {
        self.0.timestamp()
    }
}

/// Tracking session replaying a generated camera feed at `camera.fps`.
pub struct SyntheticSession {
    width: u32,
    height: u32,
    /// `None` delivers a frame on every poll.
    frame_interval: Option<Duration>,
    last_frame_at: Option<Instant>,
    frame_index: u64,
    latest: Option<SyntheticFrame>,
}

impl SyntheticSession {
    /// A session paced at the camera's frame rate.
    pub fn new(camera: &CameraConfig) -> Self {
        let mut session = Self::unpaced(camera.width, camera.height);
        session.frame_interval = Some(Duration::from_secs_f64(1.0 / camera.fps.max(1) as f64));
        session
    }

    pub fn unpaced(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            frame_interval: None,
            last_frame_at: None,
            frame_index: 0,
            latest: None,
        }
    }

    /// The most recent frame handed out.
    pub fn latest_frame(&self) -> Option<&SyntheticFrame> {
        self.latest.as_ref()
    }

    fn frame_due(&mut self) -> bool {
        let Some(interval) = self.frame_interval else {
            return true;
        };
        let now = Instant::now();
        if self
            .last_frame_at
            .is_some_and(|last| now.duration_since(last) < interval)
        {
            return false;
        }
        self.last_frame_at = Some(now);
        true
    }

    fn render_frame(&self) -> PlanarFrame {
        let (width, height) = (self.width as usize, self.height as usize);
        let bar_width = (width / 8).max(1);
        let bar_start = (self.frame_index as usize * 8) % width;

        let mut luma = vec![0u8; width * height];
        for (y, row) in luma.chunks_exact_mut(width).enumerate() {
            let shade = (y * 200 / height) as u8 + 16;
            for (x, texel) in row.iter_mut().enumerate() {
                let in_bar = (x + width - bar_start) % width < bar_width;
                *texel = if in_bar { 235 } else { shade };
            }
        }

        // Interleaved CbCr at half resolution, one row per two luma rows.
        let mut chroma = vec![128u8; width * (height / 2)];
        for (y, row) in chroma.chunks_exact_mut(width).enumerate() {
            let cb = (y * 255 / (height / 2).max(1)) as u8;
            for texel in row.chunks_exact_mut(2) {
                texel[0] = cb;
                texel[1] = 255 - cb;
            }
        }

        let timestamp = self
            .frame_interval
            .map_or(Duration::ZERO, |interval| interval * self.frame_index as u32);
        PlanarFrame::nv12(self.width, self.height, luma, chroma, timestamp)
    }
}

impl SessionSource for SyntheticSession {
    type Frame = SyntheticFrame;

    fn current_frame(&mut self) -> Option<SyntheticFrame> {
        if !self.frame_due() {
            return None;
        }

        let mut frame = self.render_frame();
        self.frame_index += 1;
        if self.frame_index % SINGLE_PLANE_INTERVAL == 0 {
            debug!("Frame {} drops its chroma plane", self.frame_index);
            frame.truncate_planes(1);
        }

        let frame = SyntheticFrame(Arc::new(frame));
        self.latest = Some(frame.clone());
        Some(frame)
    }

    fn display_transform(&self, orientation: Orientation, viewport: DVec2) -> DAffine2 {
        let image = DVec2::new(self.width as f64, self.height as f64);
        aspect_fill_display_transform(image, orientation, viewport)
    }
}

/// Elliptical foreground mask centered in the image.
#[derive(Debug, Default)]
pub struct EllipseMatte {
    requests: u64,
}

impl EllipseMatte {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MatteGenerator for EllipseMatte {
    fn generate_matte(
        &mut self,
        frame: &dyn CameraFrame,
        resolution: MatteResolution,
    ) -> Option<AlphaMatte> {
        self.requests += 1;
        if self.requests % MATTE_FAILURE_INTERVAL == 0 {
            debug!("Matte request {} fails", self.requests);
            return None;
        }

        let size = frame.image_size();
        let (width, height) = resolution.scale(size.x, size.y);
        let center = DVec2::new(width as f64, height as f64) * 0.5;
        let radii = DVec2::new(width as f64 * 0.3, height as f64 * 0.4);

        let mut data = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                let offset = (DVec2::new(x as f64 + 0.5, y as f64 + 0.5) - center) / radii;
                data.push(if offset.length_squared() <= 1.0 { 255 } else { 0 });
            }
        }
        AlphaMatte::new(width, height, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use compositor_renderer::PlaneKind;

    #[test]
    fn test_frames_are_well_formed() {
        let mut session = SyntheticSession::unpaced(64, 48);
        let frame = session.current_frame().expect("unpaced session always has a frame");

        assert_eq!(frame.plane_count(), 2);
        assert_eq!(frame.image_size(), UVec2::new(64, 48));
        let luma = frame.plane(0).expect("luma");
        let chroma = frame.plane(1).expect("chroma");
        assert!(luma.is_valid(PlaneKind::Luma.bytes_per_texel()));
        assert!(chroma.is_valid(PlaneKind::Chroma.bytes_per_texel()));
        assert_eq!((chroma.width, chroma.height), (32, 24));
    }

    #[test]
    fn test_bar_moves_between_frames() {
        let mut session = SyntheticSession::unpaced(64, 48);
        let first = session.current_frame().expect("first");
        let second = session.current_frame().expect("second");
        let row = |frame: &SyntheticFrame| frame.plane(0).and_then(|p| p.row(0, 1)).map(<[u8]>::to_vec);
        assert_ne!(row(&first), row(&second));
    }

    #[test]
    fn test_single_plane_cadence() {
        let mut session = SyntheticSession::unpaced(8, 8);
        let single: Vec<u64> = (1..=2 * SINGLE_PLANE_INTERVAL)
            .filter(|_| session.current_frame().is_some_and(|f| f.plane_count() == 1))
            .collect();
        assert_eq!(single, vec![SINGLE_PLANE_INTERVAL, 2 * SINGLE_PLANE_INTERVAL]);
    }

    #[test]
    fn test_latest_frame_tracks_last_poll() {
        let mut session = SyntheticSession::unpaced(8, 8);
        assert!(session.latest_frame().is_none());
        let frame = session.current_frame().expect("frame");
        assert!(Arc::ptr_eq(&frame.0, &session.latest_frame().expect("latest").0));
    }

    #[test]
    fn test_paced_session_waits_for_interval() {
        let camera = CameraConfig {
            width: 8,
            height: 8,
            fps: 1,
        };
        let mut session = SyntheticSession::new(&camera);
        assert!(session.current_frame().is_some());
        assert!(session.current_frame().is_none());
    }

    #[test]
    fn test_ellipse_matte() {
        let frame = PlanarFrame::nv12(40, 20, vec![0; 800], vec![128; 400], Duration::ZERO);
        let mut matte = EllipseMatte::new();

        let half = matte
            .generate_matte(&frame, MatteResolution::Half)
            .expect("matte");
        assert_eq!((half.width(), half.height()), (20, 10));
        let at = |x: u32, y: u32| half.data()[(y * half.width() + x) as usize];
        assert_eq!(at(10, 5), 255);
        assert_eq!(at(0, 0), 0);
    }

    #[test]
    fn test_matte_failure_cadence() {
        let frame = PlanarFrame::nv12(4, 4, vec![0; 16], vec![128; 8], Duration::ZERO);
        let mut matte = EllipseMatte::new();
        let failures = (1..=MATTE_FAILURE_INTERVAL)
            .filter(|_| matte.generate_matte(&frame, MatteResolution::Full).is_none())
            .count();
        assert_eq!(failures, 1);
    }
}

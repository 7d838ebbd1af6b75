//! One compositing cycle per display refresh.
//!
//! ```text
//! Idle -> Acquiring(slot) -> Converting -> [Updating geometry] -> Compositing -> Presenting -> Idle
//! ```
//!
//! Every state past `Acquiring` can fall back to `Idle`. The slot ticket then
//! goes to the backend's `discard`, or is dropped, which releases it. Resource
//! problems skip the cycle and leave the last presented image on screen;
//! only backend failures are returned as errors.

use std::fmt;

use compositor_core::config::PipelineConfig;
use glam::DVec2;
use tracing::{debug, info, trace, warn};

use crate::compositor::{CompositeInputs, CompositorBackend, PassOutcome};
use crate::converter::{Conversion, FrameConverter};
use crate::error::{CompositorError, CompositorResult};
use crate::frame::{CameraFrame, MatteGenerator, PlaneKind, SessionSource};
use crate::geometry::QuadGeometry;
use crate::scheduler::InFlightScheduler;
use crate::transform::{CoordinateTransform, Orientation, ViewportDescriptor};

/// Why a cycle presented nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The session had no new frame.
    NoFrame,
    /// No viewport has been reported yet.
    NoViewport,
    /// The frame was not a bi-planar camera image.
    InsufficientPlanes,
    /// A texture the composite pass samples could not be produced.
    MissingTexture(PlaneKind),
    /// The display transform could not be inverted.
    InvalidTransform,
    /// The drawable must be rebuilt before anything can be presented.
    SurfaceOutOfDate,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NoFrame => f.write_str("no frame"),
            SkipReason::NoViewport => f.write_str("no viewport"),
            SkipReason::InsufficientPlanes => f.write_str("insufficient planes"),
            SkipReason::MissingTexture(kind) => write!(f, "missing {} texture", kind),
            SkipReason::InvalidTransform => f.write_str("invalid transform"),
            SkipReason::SurfaceOutOfDate => f.write_str("surface out of date"),
        }
    }
}

/// What one call to [`CompositorPipeline::on_frame_ready`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The frame was composited and queued for presentation.
    Presented { sequence: u64 },
    /// Nothing was presented; the previous image stays on screen.
    Skipped(SkipReason),
}

impl CycleOutcome {
    /// Whether the cycle presented a frame.
    #[inline]
    pub fn is_presented(&self) -> bool {
        matches!(self, CycleOutcome::Presented { .. })
    }
}

/// Running totals of cycle outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleStats {
    pub presented: u64,
    pub no_frame: u64,
    pub no_viewport: u64,
    pub insufficient_planes: u64,
    pub missing_texture: u64,
    pub invalid_transform: u64,
    pub surface_out_of_date: u64,
}

impl CycleStats {
    /// Counts `outcome` under its bucket.
    pub fn record(&mut self, outcome: CycleOutcome) {
        let counter = match outcome {
            CycleOutcome::Presented { .. } => &mut self.presented,
            CycleOutcome::Skipped(SkipReason::NoFrame) => &mut self.no_frame,
            CycleOutcome::Skipped(SkipReason::NoViewport) => &mut self.no_viewport,
            CycleOutcome::Skipped(SkipReason::InsufficientPlanes) => &mut self.insufficient_planes,
            CycleOutcome::Skipped(SkipReason::MissingTexture(_)) => &mut self.missing_texture,
            CycleOutcome::Skipped(SkipReason::InvalidTransform) => &mut self.invalid_transform,
            CycleOutcome::Skipped(SkipReason::SurfaceOutOfDate) => &mut self.surface_out_of_date,
        };
        *counter += 1;
    }

    /// Cycles that presented nothing, across every reason.
    pub fn skipped(&self) -> u64 {
        self.no_frame
            + self.no_viewport
            + self.insufficient_planes
            + self.missing_texture
            + self.invalid_transform
            + self.surface_out_of_date
    }

    /// Every recorded cycle.
    pub fn total(&self) -> u64 {
        self.presented + self.skipped()
    }
}

impl fmt::Display for CycleStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "presented {}, skipped {} (no frame {}, no viewport {}, planes {}, textures {}, transform {}, surface {})",
            self.presented,
            self.skipped(),
            self.no_frame,
            self.no_viewport,
            self.insufficient_planes,
            self.missing_texture,
            self.invalid_transform,
            self.surface_out_of_date
        )
    }
}

/// Drives the session, matte generator and backend through one cycle per
/// [`on_frame_ready`](Self::on_frame_ready).
///
/// # Type Parameters
///
/// * `S` - Source of camera frames and display transforms
/// * `M` - Segmentation matte generator
/// * `B` - GPU backend the composite pass is issued through
pub struct CompositorPipeline<S, M, B>
where
    S: SessionSource,
    M: MatteGenerator,
    B: CompositorBackend,
{
    session: S,
    matte: M,
    backend: B,
    scheduler: InFlightScheduler,
    converter: FrameConverter,
    geometry: QuadGeometry,
    viewport: Option<ViewportDescriptor>,
    stats: CycleStats,
    shut_down: bool,
}

impl<S, M, B> CompositorPipeline<S, M, B>
where
    S: SessionSource,
    M: MatteGenerator,
    B: CompositorBackend,
{
    /// Creates a pipeline with `config.max_frames_in_flight` frame slots.
    ///
    /// No cycle runs until a viewport is reported through
    /// [`on_viewport_change`](Self::on_viewport_change).
    ///
    /// # Errors
    ///
    /// Returns [`CompositorError::Init`] if `max-frames-in-flight` is zero.
    pub fn new(session: S, matte: M, backend: B, config: &PipelineConfig) -> CompositorResult<Self> {
        let scheduler = InFlightScheduler::new(config.max_frames_in_flight)?;
        info!(
            "Compositor pipeline ready ({} frame(s) in flight, {:?} matte)",
            scheduler.capacity(),
            config.matte_resolution
        );

        Ok(Self {
            session,
            matte,
            backend,
            scheduler,
            converter: FrameConverter::new(config.matte_resolution),
            geometry: QuadGeometry::new(),
            viewport: None,
            stats: CycleStats::default(),
            shut_down: false,
        })
    }

    /// Records a new drawable size or orientation. Zero-area sizes are ignored.
    pub fn on_viewport_change(&mut self, width: u32, height: u32, orientation: Orientation) {
        let viewport = ViewportDescriptor::new(width, height, orientation);
        if viewport.is_empty() {
            debug!("Ignoring zero-area viewport {}x{}", width, height);
            return;
        }
        if self.viewport == Some(viewport) {
            return;
        }

        debug!("Viewport changed: {}x{} {}", width, height, orientation);
        let resized = self
            .viewport
            .is_none_or(|old| (old.width, old.height) != (width, height));
        self.viewport = Some(viewport);
        self.geometry.mark_dirty();
        if resized {
            self.backend.resize(width, height);
        }
    }

    /// Runs one cycle. Blocks while every frame slot is in flight.
    ///
    /// # Errors
    ///
    /// Returns backend failures and [`CompositorError::Shutdown`] after
    /// [`shutdown`](Self::shutdown). Missing frames, planes or textures are
    /// reported as [`CycleOutcome::Skipped`].
    pub fn on_frame_ready(&mut self) -> CompositorResult<CycleOutcome> {
        if self.shut_down {
            return Err(CompositorError::Shutdown);
        }
        let outcome = self.run_cycle()?;
        self.stats.record(outcome);
        if let CycleOutcome::Skipped(reason) = outcome {
            trace!("Cycle skipped: {}", reason);
        }
        Ok(outcome)
    }

    fn run_cycle(&mut self) -> CompositorResult<CycleOutcome> {
        let ticket = self.scheduler.acquire();
        let sequence = ticket.sequence();

        let Some(frame) = self.session.current_frame() else {
            return Ok(CycleOutcome::Skipped(SkipReason::NoFrame));
        };
        let Some(viewport) = self.viewport else {
            return Ok(CycleOutcome::Skipped(SkipReason::NoViewport));
        };

        let mut stream = self.backend.begin_stream(&ticket)?;

        let conversion =
            self.converter
                .convert(&frame, &mut self.matte, &mut self.backend, &mut stream);
        // The frame is only borrowed for conversion.
        drop(frame);

        let textures = match conversion {
            Conversion::Converted(textures) => textures,
            Conversion::InsufficientPlanes { .. } => {
                self.backend.discard(stream, ticket);
                return Ok(CycleOutcome::Skipped(SkipReason::InsufficientPlanes));
            }
        };

        if self.geometry.is_dirty() {
            let display = self
                .session
                .display_transform(viewport.orientation, viewport.size());
            match CoordinateTransform::normalized(display) {
                Ok(transform) => {
                    self.geometry.update(&transform);
                }
                Err(e) => {
                    warn!("Cannot rebuild quad geometry: {}", e);
                    self.backend.discard(stream, ticket);
                    return Ok(CycleOutcome::Skipped(SkipReason::InvalidTransform));
                }
            }
        }
        if let Err(e) = self.backend.write_geometry(&mut stream, &self.geometry) {
            self.backend.discard(stream, ticket);
            return Err(e);
        }

        let scene_color = self.backend.scene_color(&mut stream);
        let inputs = match CompositeInputs::collect(&textures, scene_color) {
            Ok(inputs) => inputs,
            Err(kind) => {
                debug!("Frame {} has no {} texture, keeping last image", sequence, kind);
                self.backend.discard(stream, ticket);
                return Ok(CycleOutcome::Skipped(SkipReason::MissingTexture(kind)));
            }
        };

        match self.backend.encode_composite(&mut stream, &inputs) {
            Ok(PassOutcome::Completed) => {}
            Ok(PassOutcome::SurfaceOutOfDate) => {
                self.backend.discard(stream, ticket);
                return Ok(CycleOutcome::Skipped(SkipReason::SurfaceOutOfDate));
            }
            Err(e) => {
                self.backend.discard(stream, ticket);
                return Err(e);
            }
        }

        match self.backend.commit(stream, ticket)? {
            PassOutcome::Completed => Ok(CycleOutcome::Presented { sequence }),
            PassOutcome::SurfaceOutOfDate => Ok(CycleOutcome::Skipped(SkipReason::SurfaceOutOfDate)),
        }
    }

    /// Waits until every frame slot has been released. Later cycles fail
    /// with [`CompositorError::Shutdown`].
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        debug!(
            "Shutting down with {} frame(s) in flight",
            self.scheduler.in_flight()
        );
        self.scheduler.wait_idle();
        info!("Compositor pipeline stopped: {}", self.stats);
    }

    /// Running totals of cycle outcomes.
    #[inline]
    pub fn stats(&self) -> &CycleStats {
        &self.stats
    }

    /// The in-flight scheduler shared with the backend's completions.
    #[inline]
    pub fn scheduler(&self) -> &InFlightScheduler {
        &self.scheduler
    }

    /// Last reported viewport, if any.
    #[inline]
    pub fn viewport(&self) -> Option<ViewportDescriptor> {
        self.viewport
    }

    /// Sensor-to-viewport transform for `frame` under the current viewport.
    ///
    /// Used by the cropping paths; `None` until a viewport is known.
    pub fn coordinate_transform(
        &self,
        frame: &dyn CameraFrame,
    ) -> Option<CompositorResult<CoordinateTransform>> {
        let viewport = self.viewport?;
        let image_size = frame.image_size().as_dvec2();
        let display = self
            .session
            .display_transform(viewport.orientation, viewport.size());
        Some(CoordinateTransform::new(image_size, &viewport, display))
    }

    /// Viewport size in pixels, zero until known.
    pub fn viewport_size(&self) -> DVec2 {
        self.viewport.map_or(DVec2::ZERO, |v| v.size())
    }

    /// The composite quads.
    #[inline]
    pub fn geometry(&self) -> &QuadGeometry {
        &self.geometry
    }

    /// The tracking session.
    #[inline]
    pub fn session(&self) -> &S {
        &self.session
    }

    /// The GPU backend.
    #[inline]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// The GPU backend, mutably.
    #[inline]
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_record() {
        let mut stats = CycleStats::default();
        stats.record(CycleOutcome::Presented { sequence: 0 });
        stats.record(CycleOutcome::Skipped(SkipReason::NoFrame));
        stats.record(CycleOutcome::Skipped(SkipReason::MissingTexture(
            PlaneKind::Alpha,
        )));
        stats.record(CycleOutcome::Skipped(SkipReason::MissingTexture(
            PlaneKind::Luma,
        )));

        assert_eq!(stats.presented, 1);
        assert_eq!(stats.no_frame, 1);
        assert_eq!(stats.missing_texture, 2);
        assert_eq!(stats.skipped(), 3);
        assert_eq!(stats.total(), 4);
        assert!(stats.to_string().starts_with("presented 1, skipped 3"));
    }

    #[test]
    fn test_stats_display_lists_every_bucket() {
        let mut stats = CycleStats::default();
        stats.record(CycleOutcome::Skipped(SkipReason::NoViewport));
        stats.record(CycleOutcome::Skipped(SkipReason::InvalidTransform));
        stats.record(CycleOutcome::Skipped(SkipReason::InvalidTransform));

        assert_eq!(
            stats.to_string(),
            "presented 0, skipped 3 (no frame 0, no viewport 1, planes 0, textures 0, transform 2, surface 0)"
        );
    }

    #[test]
    fn test_skip_reason_display() {
        assert_eq!(
            SkipReason::MissingTexture(PlaneKind::Alpha).to_string(),
            "missing alpha texture"
        );
        assert_eq!(SkipReason::SurfaceOutOfDate.to_string(), "surface out of date");
    }
}

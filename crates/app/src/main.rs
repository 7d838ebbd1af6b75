//! AR compositor demo.
//!
//! Composites a synthetic camera feed and person matte with the scene layer
//! in a desktop window. `R` simulates a device rotation, a left-button drag
//! samples the camera image under the selection, `Escape` quits.

mod synthetic;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use glam::DVec2;
use tracing::{debug, error, info, warn};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::PhysicalKey;
use winit::window::WindowId;

use compositor_core::{Config, FrameClock};
use compositor_platform::{Drag, InputState, KeyCode, Window};
use compositor_renderer::region::{RegionMapper, crop_plane};
use compositor_renderer::{
    CameraFrame, CompositorPipeline, CycleOutcome, Orientation, PixelRect, PlaneKind,
    VulkanBackend,
};

use crate::synthetic::{EllipseMatte, SyntheticSession};

/// How often the cycle summary is logged.
const STATS_INTERVAL: Duration = Duration::from_secs(1);

/// Drags shorter than this are clicks and sample the centered selection.
const CLICK_DISTANCE: f64 = 4.0;

#[derive(Parser, Debug)]
#[command(name = "ar-compositor", version, about = "Composites a camera feed with rendered scene content")]
struct Args {
    /// YAML configuration file; defaults apply when it does not exist
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Exit after this many display refreshes
    #[arg(long)]
    frames: Option<u64>,
}

type DemoPipeline = CompositorPipeline<SyntheticSession, EllipseMatte, VulkanBackend>;

/// Window, pipeline and input state driven by the winit event loop.
struct App {
    config: Config,
    frame_limit: Option<u64>,
    // Dropped before the window: the backend's surface refers to it.
    pipeline: Option<DemoPipeline>,
    window: Option<Window>,
    input: InputState,
    clock: FrameClock,
    /// Set by `R`; otherwise the orientation follows the window's aspect.
    orientation_override: Option<Orientation>,
    refreshes: u64,
}

impl App {
    fn new(config: Config, frame_limit: Option<u64>) -> Self {
        Self {
            config,
            frame_limit,
            pipeline: None,
            window: None,
            input: InputState::new(),
            clock: FrameClock::new(),
            orientation_override: None,
            refreshes: 0,
        }
    }

    fn create_pipeline(&self, window: &Window) -> Result<DemoPipeline> {
        let backend = VulkanBackend::new(window, &self.config.pipeline)
            .context("Failed to create the Vulkan backend")?;
        let session = SyntheticSession::new(&self.config.camera);
        let pipeline = CompositorPipeline::new(
            session,
            EllipseMatte::new(),
            backend,
            &self.config.pipeline,
        )?;
        Ok(pipeline)
    }

    fn orientation(&self, width: u32, height: u32) -> Orientation {
        self.orientation_override
            .unwrap_or_else(|| Orientation::from_extent(width, height))
    }

    fn update_viewport(&mut self) {
        let Some(window) = &self.window else {
            return;
        };
        let (width, height) = window.size();
        let orientation = self.orientation(width, height);
        if let Some(pipeline) = self.pipeline.as_mut() {
            pipeline.on_viewport_change(width, height, orientation);
        }
    }

    fn rotate(&mut self) {
        let Some(window) = &self.window else {
            return;
        };
        let (width, height) = window.size();
        let orientation = self.orientation(width, height).rotated();
        info!("Simulated rotation to {}", orientation);
        self.orientation_override = Some(orientation);
        self.update_viewport();
    }

    /// Logs the mean luma of the camera pixels under a selection.
    fn sample_selection(&self, drag: Drag) {
        let Some(pipeline) = &self.pipeline else {
            return;
        };
        let (Some(viewport), Some(frame)) = (pipeline.viewport(), pipeline.session().latest_frame())
        else {
            debug!("Nothing on screen to sample");
            return;
        };
        let transform = match pipeline.coordinate_transform(frame) {
            Some(Ok(transform)) => transform,
            Some(Err(e)) => {
                warn!("Cannot map the selection: {}", e);
                return;
            }
            None => return,
        };

        let mapper = RegionMapper::new(transform, &viewport);
        let start = DVec2::new(drag.start.0 as f64, drag.start.1 as f64);
        let end = DVec2::new(drag.end.0 as f64, drag.end.1 as f64);
        let selection = if start.distance(end) < CLICK_DISTANCE {
            mapper.centered_selection()
        } else {
            PixelRect::new(start, end)
        };

        let Some(sensor) = mapper.selection_to_sensor(&selection, frame.image_size().as_dvec2())
        else {
            info!("Selection {:?} does not cover the camera image", selection);
            return;
        };
        let crop = frame
            .plane(0)
            .and_then(|luma| crop_plane(&luma, &sensor, PlaneKind::Luma.bytes_per_texel()));
        match crop.as_ref().and_then(|crop| crop.mean().map(|mean| (crop, mean))) {
            Some((crop, mean)) => info!(
                "Selection {:.0?}..{:.0?} covers sensor {:.0?}..{:.0?} ({}x{} px), mean luma {:.1}",
                selection.min, selection.max, sensor.min, sensor.max, crop.width, crop.height, mean
            ),
            None => debug!("Selection maps to an empty crop"),
        }
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.as_ref().is_none_or(Window::is_minimized) {
            return;
        }
        let Some(pipeline) = self.pipeline.as_mut() else {
            return;
        };

        match pipeline.on_frame_ready() {
            Ok(CycleOutcome::Presented { .. }) => {}
            Ok(CycleOutcome::Skipped(reason)) => debug!("Cycle skipped: {}", reason),
            Err(e) => {
                error!("Compositing failed: {}", e);
                event_loop.exit();
                return;
            }
        }

        self.clock.tick();
        if let Some(rate) = self.clock.report_due(STATS_INTERVAL) {
            info!("{:.1} cycles/s, {}", rate, pipeline.stats());
        }

        self.refreshes += 1;
        if self.frame_limit.is_some_and(|limit| self.refreshes >= limit) {
            info!("Reached the frame limit of {}", self.refreshes);
            event_loop.exit();
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window_config = &self.config.window;
        let window = match Window::new(
            event_loop,
            window_config.width,
            window_config.height,
            &window_config.title,
        ) {
            Ok(window) => window,
            Err(e) => {
                error!("Failed to create window: {}", e);
                event_loop.exit();
                return;
            }
        };

        match self.create_pipeline(&window) {
            Ok(pipeline) => {
                info!("Initialization complete, entering main loop");
                self.pipeline = Some(pipeline);
                self.window = Some(window);
                self.update_viewport();
            }
            Err(e) => {
                error!("Failed to create compositor: {:#}", e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(window) = self.window.as_mut()
                    && window.resize(size.width, size.height)
                {
                    self.update_viewport();
                }
            }
            WindowEvent::RedrawRequested => self.redraw(event_loop),
            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(key) = event.physical_key {
                    if event.state.is_pressed() {
                        self.input.on_key_pressed(key);
                    } else {
                        self.input.on_key_released(key);
                    }
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.input
                    .on_mouse_moved(position.x as f32, position.y as f32);
            }
            WindowEvent::MouseInput { state, button, .. } => {
                if state.is_pressed() {
                    self.input.on_mouse_pressed(button.into());
                } else {
                    self.input.on_mouse_released(button.into());
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.input.is_key_just_pressed(KeyCode::Escape) {
            event_loop.exit();
        }
        if self.input.is_key_just_pressed(KeyCode::KeyR) {
            self.rotate();
        }
        if let Some(drag) = self.input.completed_drag() {
            self.sample_selection(drag);
        }
        self.input.begin_frame();

        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(mut pipeline) = self.pipeline.take() {
            pipeline.shutdown();
        }
        info!("Ran for {:.1?}", self.clock.elapsed());
    }
}

/// Loads and validates `path`, falling back to defaults when it is missing.
fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        warn!("Config file {} not found, using defaults", path.display());
        return Ok(Config::default());
    }
    let config = Config::from_yaml_file(path)
        .and_then(Config::validated)
        .with_context(|| format!("Failed to load {}", path.display()))?;
    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

fn main() -> Result<()> {
    let args = Args::parse();
    compositor_core::init_logging(args.verbose);
    info!("Starting AR compositor");

    let config = load_config(&args.config)?;

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config, args.frames);
    event_loop.run_app(&mut app)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_cli_defaults() {
        let args = Args::parse_from(["ar-compositor"]);
        assert_eq!(args.config, PathBuf::from("config.yaml"));
        assert_eq!(args.verbose, 0);
        assert_eq!(args.frames, None);

        let args = Args::parse_from(["ar-compositor", "-vv", "--frames", "120", "-c", "demo.yaml"]);
        assert_eq!(args.verbose, 2);
        assert_eq!(args.frames, Some(120));
        assert_eq!(args.config, PathBuf::from("demo.yaml"));
    }

    #[test]
    fn test_stats_logged_every_second() {
        let mut clock = FrameClock::new();
        clock.tick();
        assert!(clock.report_due(STATS_INTERVAL).is_none());
        assert_eq!(STATS_INTERVAL, Duration::from_secs(1));
    }

    #[test]
    fn test_missing_config_uses_defaults() {
        let config = load_config(Path::new("does/not/exist.yaml")).expect("defaults");
        assert_eq!(config.pipeline.max_frames_in_flight, 3);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "pipeline:\n  max-frames-in-flight: 0\n").expect("write");
        assert!(load_config(&path).is_err());
    }
}

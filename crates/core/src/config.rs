//! YAML configuration for the compositor and the demo application.
//!
//! Every key is optional; missing keys take the values from [`Config::default`].
//!
//! ```yaml
//! pipeline:
//!   max-frames-in-flight: 3
//!   matte-resolution: half
//!   clear-color: [0.0, 0.0, 0.0, 0.0]
//!   shader-dir: shaders/spirv
//!   validation: false
//!   vsync: true
//! window:
//!   width: 390
//!   height: 844
//! camera:
//!   width: 1920
//!   height: 1440
//!   fps: 60
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};

/// Upper bound accepted for `max-frames-in-flight`.
pub const MAX_FRAMES_IN_FLIGHT_LIMIT: usize = 8;

/// Top-level configuration.
///
/// # Example
///
/// ```no_run
/// use compositor_core::Config;
///
/// # fn main() -> compositor_core::Result<()> {
/// let config = Config::from_yaml_file("config.yaml")?.validated()?;
/// println!("{} frames in flight", config.pipeline.max_frames_in_flight);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Config {
    /// Compositing pipeline settings.
    pub pipeline: PipelineConfig,
    /// Demo window settings.
    pub window: WindowConfig,
    /// Synthetic camera settings.
    pub camera: CameraConfig,
}

impl Config {
    /// Parses a configuration from YAML text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigParse`] if the YAML is malformed or a value has
    /// the wrong type.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Reads and parses a YAML configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be read, or
    /// [`Error::ConfigParse`] if it cannot be parsed.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let s = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&s)
    }

    /// Checks invariants serde defaults cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first offending value.
    pub fn validated(self) -> Result<Self> {
        self.pipeline.validate()?;
        self.window.validate()?;
        self.camera.validate()?;
        Ok(self)
    }
}

/// Resolution of the alpha matte relative to the camera image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatteResolution {
    Full,
    #[default]
    Half,
}

impl MatteResolution {
    /// Size of the matte produced for a camera image of `width` x `height`.
    pub fn scale(self, width: u32, height: u32) -> (u32, u32) {
        match self {
            MatteResolution::Full => (width, height),
            MatteResolution::Half => ((width / 2).max(1), (height / 2).max(1)),
        }
    }
}

/// Settings of the compositing pipeline.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct PipelineConfig {
    /// Number of cycles allowed between submission and GPU completion.
    pub max_frames_in_flight: usize,
    /// Size of the segmentation matte relative to the camera image.
    pub matte_resolution: MatteResolution,
    /// RGBA clear value of the scene-color target.
    pub clear_color: [f32; 4],
    /// Directory holding `composite.vert.spv` and `composite.frag.spv`.
    pub shader_dir: PathBuf,
    /// Enables the Khronos validation layer when available.
    pub validation: bool,
    /// Pace presentation by the display refresh (FIFO).
    pub vsync: bool,
}

impl PipelineConfig {
    fn validate(&self) -> Result<()> {
        if self.max_frames_in_flight == 0 || self.max_frames_in_flight > MAX_FRAMES_IN_FLIGHT_LIMIT
        {
            return Err(Error::Config(format!(
                "pipeline.max-frames-in-flight must be within 1..={}, got {}",
                MAX_FRAMES_IN_FLIGHT_LIMIT, self.max_frames_in_flight
            )));
        }
        if self
            .clear_color
            .iter()
            .any(|c| !c.is_finite() || !(0.0..=1.0).contains(c))
        {
            return Err(Error::Config(format!(
                "pipeline.clear-color components must be within 0.0..=1.0, got {:?}",
                self.clear_color
            )));
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_frames_in_flight: 3,
            matte_resolution: MatteResolution::Half,
            clear_color: [0.0, 0.0, 0.0, 0.0],
            shader_dir: PathBuf::from("shaders/spirv"),
            validation: cfg!(debug_assertions),
            vsync: true,
        }
    }
}

/// Initial size and title of the demo window.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct WindowConfig {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Window title.
    pub title: String,
}

impl WindowConfig {
    fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::Config(format!(
                "window size must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }
        Ok(())
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 390,
            height: 844,
            title: "AR Compositor".to_string(),
        }
    }
}

/// Synthetic camera used by the demo session.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct CameraConfig {
    pub width: u32,
    pub height: u32,
    /// Frames produced per second.
    pub fps: u32,
}

impl CameraConfig {
    fn validate(&self) -> Result<()> {
        // NV12 chroma is subsampled 2x2.
        if self.width < 2 || self.height < 2 || self.width % 2 != 0 || self.height % 2 != 0 {
            return Err(Error::Config(format!(
                "camera size must be even and at least 2x2, got {}x{}",
                self.width, self.height
            )));
        }
        if self.fps == 0 {
            return Err(Error::Config("camera.fps must be greater than zero".into()));
        }
        Ok(())
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1440,
            fps: 60,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default().validated().unwrap();
        assert_eq!(config.pipeline.max_frames_in_flight, 3);
        assert_eq!(config.pipeline.matte_resolution, MatteResolution::Half);
        assert_eq!(config.pipeline.shader_dir, PathBuf::from("shaders/spirv"));
        assert_eq!(config.camera.width, 1920);
        assert_eq!(config.camera.height, 1440);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
pipeline:
  matte-resolution: full
  clear-color: [0.1, 0.2, 0.3, 1.0]
window:
  title: test
"#;
        let config = Config::from_yaml_str(yaml).unwrap().validated().unwrap();
        assert_eq!(config.pipeline.matte_resolution, MatteResolution::Full);
        assert_eq!(config.pipeline.clear_color, [0.1, 0.2, 0.3, 1.0]);
        assert_eq!(config.pipeline.max_frames_in_flight, 3);
        assert_eq!(config.window.title, "test");
        assert_eq!(config.window.width, 390);
    }

    #[test]
    fn test_rejects_zero_frames_in_flight() {
        let yaml = "pipeline:\n  max-frames-in-flight: 0\n";
        let err = Config::from_yaml_str(yaml).unwrap().validated().unwrap_err();
        assert!(matches!(err, Error::Config(msg) if msg.contains("max-frames-in-flight")));
    }

    #[test]
    fn test_rejects_odd_camera_size() {
        let yaml = "camera:\n  width: 1921\n";
        let err = Config::from_yaml_str(yaml).unwrap().validated().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_rejects_unknown_matte_resolution() {
        let yaml = "pipeline:\n  matte-resolution: quarter\n";
        assert!(matches!(
            Config::from_yaml_str(yaml),
            Err(Error::ConfigParse(_))
        ));
    }

    #[test]
    fn test_from_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "camera:\n  fps: 30").unwrap();
        let config = Config::from_yaml_file(file.path()).unwrap();
        assert_eq!(config.camera.fps, 30);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = Config::from_yaml_file("/nonexistent/compositor.yaml").unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_matte_resolution_scale() {
        assert_eq!(MatteResolution::Full.scale(1920, 1440), (1920, 1440));
        assert_eq!(MatteResolution::Half.scale(1920, 1440), (960, 720));
        assert_eq!(MatteResolution::Half.scale(1, 1), (1, 1));
    }
}

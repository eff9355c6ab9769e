// THEORY:
// Configuration is split by how often it may change.
//
// - `GridConfig`, `RateLimit`, `Encoding` and the baud rate are fixed for the
//   life of a pipeline. They are validated once and a bad value is fatal.
// - `Tuning` holds the knobs an operator turns while the camera is live
//   (thresholds, invert, sample step). Updates go through a `ConfigHandle`,
//   which publishes whole snapshots over a `watch` channel. The pipeline picks
//   up the newest snapshot at the start of a tick, so a tick never sees half
//   of an update.

use crate::core_modules::change_gate::RateLimit;
use crate::core_modules::encoder::Encoding;
use crate::error::{ConfigError, GeometryError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::sync::watch;

pub const DEFAULT_ROWS: usize = 10;
pub const DEFAULT_COLS: usize = 24;
/// Seven-segment digit proportions, width:height.
pub const DEFAULT_CELL_ASPECT_RATIO: f32 = 9.0 / 16.0;
pub const DEFAULT_MARGIN: u32 = 10;
pub const DEFAULT_GAP: u32 = 5;
pub const DEFAULT_BINARIZE_THRESHOLD: f32 = 0.7;
pub const DEFAULT_ACTIVATION_THRESHOLD: u8 = 128;
pub const DEFAULT_SAMPLE_STEP: u32 = 3;
pub const DEFAULT_BAUD_RATE: u32 = 250_000;

/// Shape of the cell grid and how it sits on the canvas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub rows: usize,
    pub cols: usize,
    /// Cell width divided by cell height.
    pub cell_aspect_ratio: f32,
    /// Blank border around the whole grid, in pixels.
    pub margin: u32,
    /// Spacing between neighbouring cells, in pixels.
    pub gap: u32,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            rows: DEFAULT_ROWS,
            cols: DEFAULT_COLS,
            cell_aspect_ratio: DEFAULT_CELL_ASPECT_RATIO,
            margin: DEFAULT_MARGIN,
            gap: DEFAULT_GAP,
        }
    }
}

impl GridConfig {
    pub fn cell_count(&self) -> usize {
        self.rows * self.cols
    }

    pub fn validate(&self) -> Result<(), GeometryError> {
        if self.rows == 0 || self.cols == 0 {
            return Err(GeometryError::EmptyGrid {
                rows: self.rows,
                cols: self.cols,
            });
        }
        if !self.cell_aspect_ratio.is_finite() || self.cell_aspect_ratio <= 0.0 {
            return Err(GeometryError::InvalidAspectRatio(self.cell_aspect_ratio));
        }
        Ok(())
    }
}

/// The live-tunable part of the configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tuning {
    /// Global black/white level, 0 to 1.
    pub binarize_threshold: f32,
    /// Per-cell mean intensity a cell is compared against, 0 to 255.
    pub activation_threshold: u8,
    /// When set, bright cells are active instead of dark ones.
    pub invert_detection: bool,
    /// Stride in pixels between samples inside a cell, both axes.
    pub sample_step: u32,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            binarize_threshold: DEFAULT_BINARIZE_THRESHOLD,
            activation_threshold: DEFAULT_ACTIVATION_THRESHOLD,
            invert_detection: false,
            sample_step: DEFAULT_SAMPLE_STEP,
        }
    }
}

impl Tuning {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.binarize_threshold) {
            return Err(ConfigError::Invalid(format!(
                "binarize_threshold must be within 0..=1 (got {})",
                self.binarize_threshold
            )));
        }
        if self.sample_step == 0 {
            return Err(ConfigError::Invalid("sample_step must be at least 1".into()));
        }
        Ok(())
    }
}

/// Everything a pipeline needs, as loaded from `gridcast.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub grid: GridConfig,
    pub tuning: Tuning,
    pub rate_limit: RateLimit,
    pub encoding: Encoding,
    pub baud_rate: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            grid: GridConfig::default(),
            tuning: Tuning::default(),
            rate_limit: RateLimit::default(),
            encoding: Encoding::default(),
            baud_rate: DEFAULT_BAUD_RATE,
        }
    }
}

impl PipelineConfig {
    /// Load and validate configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.grid.validate()?;
        self.tuning.validate()?;
        if let RateLimit::EveryNFrames { n: 0 } = self.rate_limit {
            return Err(ConfigError::Invalid(
                "every_n_frames rate limit needs n >= 1".into(),
            ));
        }
        if self.baud_rate == 0 {
            return Err(ConfigError::Invalid("baud_rate must be positive".into()));
        }
        Ok(())
    }
}

/// Write side of the live-tuning channel.
///
/// Cloning is cheap; every clone publishes to the same pipeline.
#[derive(Debug, Clone)]
pub struct ConfigHandle {
    tx: watch::Sender<Tuning>,
}

impl ConfigHandle {
    pub(crate) fn new(initial: Tuning) -> (Self, watch::Receiver<Tuning>) {
        let (tx, rx) = watch::channel(initial);
        (Self { tx }, rx)
    }

    pub fn current(&self) -> Tuning {
        self.tx.borrow().clone()
    }

    /// Replace the whole snapshot. Invalid snapshots are refused and the
    /// previous one stays in effect.
    pub fn set(&self, tuning: Tuning) -> Result<(), ConfigError> {
        tuning.validate()?;
        self.tx.send_replace(tuning);
        Ok(())
    }

    /// Edit a copy of the current snapshot and publish it.
    pub fn update(&self, edit: impl FnOnce(&mut Tuning)) -> Result<Tuning, ConfigError> {
        let mut next = self.current();
        edit(&mut next);
        self.set(next.clone())?;
        Ok(next)
    }

    pub fn set_binarize_threshold(&self, threshold: f32) -> Result<Tuning, ConfigError> {
        self.update(|t| t.binarize_threshold = threshold)
    }

    pub fn set_activation_threshold(&self, threshold: u8) -> Result<Tuning, ConfigError> {
        self.update(|t| t.activation_threshold = threshold)
    }

    pub fn toggle_invert(&self) -> Result<Tuning, ConfigError> {
        self.update(|t| t.invert_detection = !t.invert_detection)
    }

    pub fn set_sample_step(&self, step: u32) -> Result<Tuning, ConfigError> {
        self.update(|t| t.sample_step = step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_reference_deployment() {
        let config = PipelineConfig::default();
        assert_eq!(config.grid.cell_count(), 240);
        assert_eq!(config.tuning.activation_threshold, 128);
        assert_eq!(config.tuning.sample_step, 3);
        assert_eq!(config.rate_limit, RateLimit::Interval { ms: 500 });
        assert_eq!(config.encoding, Encoding::Dense);
        assert_eq!(config.baud_rate, 250_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_document_is_the_default() {
        let config = PipelineConfig::from_toml_str("").unwrap();
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn parses_a_full_document() {
        let toml = r#"
            encoding = "sparse_index_list"
            baud_rate = 115200

            [grid]
            rows = 4
            cols = 6
            cell_aspect_ratio = 1.0
            margin = 0
            gap = 2

            [tuning]
            binarize_threshold = 0.55
            activation_threshold = 100
            invert_detection = true
            sample_step = 2

            [rate_limit]
            mode = "every_n_frames"
            n = 5
        "#;
        let config = PipelineConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.grid.rows, 4);
        assert_eq!(config.grid.cols, 6);
        assert_eq!(config.grid.gap, 2);
        assert_eq!(config.tuning.activation_threshold, 100);
        assert!(config.tuning.invert_detection);
        assert_eq!(config.rate_limit, RateLimit::EveryNFrames { n: 5 });
        assert_eq!(config.encoding, Encoding::SparseIndexList);
        assert_eq!(config.baud_rate, 115_200);
    }

    #[test]
    fn partial_sections_keep_defaults() {
        let config = PipelineConfig::from_toml_str("[grid]\nrows = 2\n").unwrap();
        assert_eq!(config.grid.rows, 2);
        assert_eq!(config.grid.cols, DEFAULT_COLS);
        assert_eq!(config.tuning, Tuning::default());
    }

    #[test]
    fn rejects_degenerate_grid() {
        let err = PipelineConfig::from_toml_str("[grid]\ncols = 0\n").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Geometry(GeometryError::EmptyGrid { cols: 0, .. })
        ));
    }

    #[test]
    fn rejects_bad_tuning_and_rate_limit() {
        assert!(PipelineConfig::from_toml_str("[tuning]\nsample_step = 0\n").is_err());
        assert!(PipelineConfig::from_toml_str("[tuning]\nbinarize_threshold = 1.5\n").is_err());
        assert!(
            PipelineConfig::from_toml_str("[rate_limit]\nmode = \"every_n_frames\"\nn = 0\n")
                .is_err()
        );
        // 300 does not fit the 0..=255 activation range.
        assert!(PipelineConfig::from_toml_str("[tuning]\nactivation_threshold = 300\n").is_err());
    }

    #[test]
    fn missing_file_reports_path() {
        let err = PipelineConfig::load("/definitely/not/here.toml").unwrap_err();
        assert!(err.to_string().contains("/definitely/not/here.toml"));
    }

    #[test]
    fn handle_publishes_snapshots() {
        let (handle, mut rx) = ConfigHandle::new(Tuning::default());
        assert!(!rx.has_changed().unwrap());

        handle.set_binarize_threshold(0.3).unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().binarize_threshold, 0.3);

        let toggled = handle.toggle_invert().unwrap();
        assert!(toggled.invert_detection);
        assert!(rx.borrow_and_update().invert_detection);
    }

    #[test]
    fn handle_refuses_invalid_snapshot() {
        let (handle, rx) = ConfigHandle::new(Tuning::default());
        assert!(handle.set_sample_step(0).is_err());
        assert_eq!(rx.borrow().sample_step, DEFAULT_SAMPLE_STEP);
        assert!(!rx.has_changed().unwrap());
    }
}

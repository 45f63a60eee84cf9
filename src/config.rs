use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::app_dirs::AppDirs;
use crate::error::{GameError, Result};

/// Stimulus channel(s) used by a session
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum, strum_macros::Display,
)]
pub enum Modality {
    Visual,
    Audio,
    AudioVisual,
}

/// How non-planted positions are drawn
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum, strum_macros::Display,
)]
pub enum Density {
    /// Non-planted draws never repeat the n-back value, so the match rate equals the target.
    Strict,
    /// Non-planted draws are unrestricted and may match by accident.
    Loose,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GameConfig {
    pub n_back: usize,
    pub event_count: usize,
    pub interval_ms: u64,
    pub modality: Modality,
    pub match_ratio: f64,
    /// Number of grid cells for visual stimuli (3x3 by default)
    pub grid_size: u32,
    pub sound_count: u32,
    pub density: Density,
    pub penalize_misses: bool,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            n_back: 2,
            event_count: 10,
            interval_ms: 2000,
            modality: Modality::Visual,
            match_ratio: 0.3,
            grid_size: 9,
            sound_count: 9,
            density: Density::Strict,
            penalize_misses: false,
        }
    }
}

pub(crate) fn check_match_ratio(match_ratio: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&match_ratio) {
        return Err(GameError::InvalidConfiguration(format!(
            "match_ratio {} is outside [0, 1]",
            match_ratio
        )));
    }
    Ok(())
}

impl GameConfig {
    /// Size of the value range stimuli are drawn from for the configured modality.
    pub fn range_size(&self) -> u32 {
        match self.modality {
            Modality::Visual => self.grid_size,
            Modality::Audio => self.sound_count,
            Modality::AudioVisual => self.grid_size.min(self.sound_count),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.validate_shape()?;
        check_match_ratio(self.match_ratio)
    }

    /// Checks everything that bounds a sequence: lengths, timing and value range.
    pub fn validate_shape(&self) -> Result<()> {
        if self.n_back == 0 {
            return Err(GameError::InvalidConfiguration(
                "n_back must be at least 1".into(),
            ));
        }
        if self.event_count == 0 {
            return Err(GameError::InvalidConfiguration(
                "event_count must be positive".into(),
            ));
        }
        if self.n_back >= self.event_count {
            return Err(GameError::InvalidConfiguration(format!(
                "n_back ({}) must be smaller than event_count ({})",
                self.n_back, self.event_count
            )));
        }
        if self.interval_ms == 0 {
            return Err(GameError::InvalidConfiguration(
                "interval_ms must be positive".into(),
            ));
        }
        if self.range_size() <= 1 {
            return Err(GameError::InvalidConfiguration(format!(
                "stimulus range for {} must hold more than one value",
                self.modality
            )));
        }
        Ok(())
    }

    /// Copy of this config with the set fields of `update` applied.
    pub fn merged(&self, update: &ConfigUpdate) -> Self {
        let mut cfg = self.clone();
        if let Some(n) = update.n_back {
            cfg.n_back = n;
        }
        if let Some(n) = update.event_count {
            cfg.event_count = n;
        }
        if let Some(ms) = update.interval_ms {
            cfg.interval_ms = ms;
        }
        if let Some(m) = update.modality {
            cfg.modality = m;
        }
        if let Some(r) = update.match_ratio {
            cfg.match_ratio = r;
        }
        if let Some(g) = update.grid_size {
            cfg.grid_size = g;
        }
        if let Some(s) = update.sound_count {
            cfg.sound_count = s;
        }
        if let Some(d) = update.density {
            cfg.density = d;
        }
        if let Some(p) = update.penalize_misses {
            cfg.penalize_misses = p;
        }
        cfg
    }
}

/// Partial configuration change applied by `GameSession::set_configuration`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigUpdate {
    pub n_back: Option<usize>,
    pub event_count: Option<usize>,
    pub interval_ms: Option<u64>,
    pub modality: Option<Modality>,
    pub match_ratio: Option<f64>,
    pub grid_size: Option<u32>,
    pub sound_count: Option<u32>,
    pub density: Option<Density>,
    pub penalize_misses: Option<bool>,
}

impl ConfigUpdate {
    pub fn modality(modality: Modality) -> Self {
        Self {
            modality: Some(modality),
            ..Self::default()
        }
    }
}

pub trait ConfigStore {
    fn load(&self) -> GameConfig;
    fn save(&self, cfg: &GameConfig) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        let path =
            AppDirs::config_path().unwrap_or_else(|| PathBuf::from("nback_config.json"));
        Self { path }
    }

    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for FileConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self) -> GameConfig {
        match fs::read(&self.path) {
            Ok(bytes) => match serde_json::from_slice::<GameConfig>(&bytes) {
                Ok(cfg) => return cfg,
                Err(e) => tracing::warn!("Ignoring unreadable config {:?}: {}", self.path, e),
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Failed to read config {:?}: {}", self.path, e),
        }
        GameConfig::default()
    }

    fn save(&self, cfg: &GameConfig) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(cfg)?;
        fs::write(&self.path, data)?;
        Ok(())
    }
}

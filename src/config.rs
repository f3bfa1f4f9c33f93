#![warn(missing_docs)]
//! Analysis settings.
//!
//! The settings are read from a YAML file. Every key is optional:
//!
//! ```yaml
//! root_boundary: /data/pl
//! max_depth: 8
//! max_iterations: 200
//! lineshape: gaussian_const_bg
//! window_multiplier: 2.5
//! default_half_span: 0.05
//! retry_widen_factor: 1.5
//! reference_index: 0
//! ```
use crate::{
    error::{PlError, PlResult},
    fitter::CurveFitter,
    resolver::AuxFileResolver,
    tracking::{PeakTracker, TrackingConfig},
};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

/// All settings of an analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// topmost directory searched for auxiliary files. Without it no auxiliary files are searched.
    pub root_boundary: Option<PathBuf>,
    /// maximum depth of the subdirectory search
    pub max_depth: usize,
    /// iteration limit of the fitter
    pub max_iterations: usize,
    /// relative convergence tolerance of the fitter
    pub tolerance: f64,
    /// peak tracking parameters
    #[serde(flatten)]
    pub tracking: TrackingConfig,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            root_boundary: None,
            max_depth: 8,
            max_iterations: 200,
            tolerance: 1.0E-10,
            tracking: TrackingConfig::default(),
        }
    }
}

impl AnalysisConfig {
    /// Read the configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// This function will return
    ///   - [`PlError::Io`] if the file cannot be read.
    ///   - [`PlError::Configuration`] if the file content is invalid.
    pub fn from_file(path: &Path) -> PlResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| PlError::Io(format!("cannot read config {}: {e}", path.display())))?;
        Self::from_yaml(&content)
    }
    /// Parse the configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// This function will return an [`PlError::Configuration`] if the YAML is malformed or the
    /// settings are inconsistent.
    pub fn from_yaml(yaml: &str) -> PlResult<Self> {
        let config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(yaml)
                .map_err(|e| PlError::Configuration(format!("invalid config: {e}")))?
        };
        config.tracking.validate()?;
        Ok(config)
    }
    /// Read the configuration from `path` or use the defaults if no path is given.
    ///
    /// # Errors
    ///
    /// This function will return an error if the file cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> PlResult<Self> {
        path.map_or_else(|| Ok(Self::default()), Self::from_file)
    }
    /// Serialize the configuration to YAML.
    ///
    /// # Errors
    ///
    /// This function will return an error if serialization fails.
    pub fn to_yaml(&self) -> PlResult<String> {
        serde_yaml::to_string(self)
            .map_err(|e| PlError::Other(format!("config serialization failed: {e}")))
    }
    /// Create the fitter described by this configuration.
    ///
    /// # Errors
    ///
    /// This function will return an error if the fitter settings are invalid.
    pub fn fitter(&self) -> PlResult<CurveFitter> {
        CurveFitter::new(self.max_iterations, self.tolerance)
    }
    /// Create the peak tracker described by this configuration.
    ///
    /// # Errors
    ///
    /// This function will return an error if the settings are invalid.
    pub fn tracker(&self) -> PlResult<PeakTracker> {
        PeakTracker::new(self.fitter()?, self.tracking)
    }
    /// Create the auxiliary file resolver. `None` if no root boundary is configured.
    ///
    /// # Errors
    ///
    /// This function will return an error if the root boundary is not an existing directory.
    pub fn resolver(&self) -> PlResult<Option<AuxFileResolver>> {
        match &self.root_boundary {
            Some(root) => Ok(Some(AuxFileResolver::new(root, self.max_depth)?)),
            None => {
                warn!("no root boundary configured, auxiliary files are not searched");
                Ok(None)
            }
        }
    }
}

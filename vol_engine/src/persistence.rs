//! persistence.rs - Fitted-parameter file
//!
//! `<dir>/garch_model.json` holds exactly the configuration and the flat
//! parameter map. It restores point estimates, not a usable fit: residual
//! and variance state are not stored.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::EngineConfig;
use crate::error::{Result, VolError};
use crate::models::param_names;

pub const MODEL_FILE: &str = "garch_model.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PersistedModel {
    pub config: EngineConfig,
    pub params: BTreeMap<String, f64>,
}

impl PersistedModel {
    /// Write to `dir/garch_model.json`, creating `dir` if needed.
    pub fn write(&self, dir: impl AsRef<Path>) -> Result<PathBuf> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(|e| VolError::persistence(dir, e))?;
        let path = dir.join(MODEL_FILE);
        let json = serde_json::to_string_pretty(self).map_err(|e| VolError::persistence(&path, e))?;
        fs::write(&path, json).map_err(|e| VolError::persistence(&path, e))?;
        info!("model parameters saved to {}", path.display());
        Ok(path)
    }

    /// Read `dir/garch_model.json`. The configuration must be valid and the
    /// parameter names must match its layout exactly.
    pub fn read(dir: impl AsRef<Path>) -> Result<Self> {
        let path = dir.as_ref().join(MODEL_FILE);
        let text = fs::read_to_string(&path).map_err(|e| VolError::persistence(&path, e))?;
        let model: PersistedModel =
            serde_json::from_str(&text).map_err(|e| VolError::persistence(&path, e))?;

        model
            .config
            .validate()
            .map_err(|e| VolError::persistence(&path, e))?;

        let mut expected = param_names(&model.config);
        expected.sort();
        let found: Vec<String> = model.params.keys().cloned().collect();
        if found != expected {
            return Err(VolError::persistence(
                &path,
                format!("parameters {found:?} do not match {} layout {expected:?}", model.config.label()),
            ));
        }
        if let Some((name, v)) = model.params.iter().find(|(_, v)| !v.is_finite()) {
            return Err(VolError::persistence(&path, format!("parameter {name} is {v}")));
        }

        info!("model parameters loaded from {}", path.display());
        Ok(model)
    }
}

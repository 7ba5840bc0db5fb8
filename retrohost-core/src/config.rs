//! Host configuration.
//!
//! Loaded from a TOML file; every field is optional:
//!
//! ```toml
//! system_dir = "system"
//! save_dir = "saves"
//! volume = 0.8
//! save_extension = "srm"   # omit for .dsv (NDS) / .sav
//!
//! [bindings]
//! start = [13]             # RETROK codes
//! left_stick_up = [105]
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{HostError, Result};
use crate::input::{InputBindings, default_bindings};
use crate::storage::SaveNaming;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Reported to cores as the system (BIOS) directory.
    pub system_dir: PathBuf,
    /// Save files live here; also reported as the core's save directory.
    pub save_dir: PathBuf,
    /// Linear output gain, clamped to `[0, 1]` by the sink.
    pub volume: f32,
    /// Fixed save file extension instead of the per-console default.
    pub save_extension: Option<String>,
    /// Control name -> RETROK key codes. Replaces the defaults for that control.
    pub bindings: BTreeMap<String, Vec<u32>>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            system_dir: PathBuf::from("system"),
            save_dir: PathBuf::from("saves"),
            volume: 1.0,
            save_extension: None,
            bindings: BTreeMap::new(),
        }
    }
}

impl HostConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|source| HostError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn save_naming(&self) -> SaveNaming {
        match &self.save_extension {
            Some(ext) if !ext.trim_start_matches('.').is_empty() => SaveNaming::Fixed(ext.clone()),
            _ => SaveNaming::ByConsole,
        }
    }

    /// Default bindings with this config's overrides applied.
    pub fn input_bindings(&self) -> InputBindings {
        let mut bindings = default_bindings();
        bindings.apply_overrides(&self.bindings);
        bindings
    }
}

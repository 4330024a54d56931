use serde::{Deserialize, Serialize};
use std::path::Path;

/// Window and swap-chain settings for the demo driver, loaded from an
/// optional `glforge.toml` next to the binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub vsync: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Hello Triangle".to_string(),
            width: 640,
            height: 480,
            vsync: true,
        }
    }
}

impl WindowConfig {
    /// Reads the config file if present; any read or parse problem falls
    /// back to the defaults with a warning rather than aborting startup.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    log::warn!("Ignoring malformed {}: {}", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }
}

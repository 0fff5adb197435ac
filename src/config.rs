//! Song folders remembered between runs, stored as JSON in `$HOME/.chartscan`.

use std::fs;
use std::path::PathBuf;

use chartscan::ScanError;
use home::home_dir;
use serde::{Deserialize, Serialize};

const CONFIG_FOLDER: &str = ".chartscan";
const CONFIG_FILE: &str = "config.json";

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    song_folders: Vec<PathBuf>,
}

impl Config {
    pub fn song_folders(&self) -> &[PathBuf] {
        &self.song_folders
    }

    /// Replaces the folders, writing the file only when they changed.
    pub fn set_song_folders(&mut self, song_folders: Vec<PathBuf>) -> Result<(), ScanError> {
        if self.song_folders != song_folders {
            log::info!("Remembering {} song folders", song_folders.len());
            self.song_folders = song_folders;
            self.save_config()?;
        }
        Ok(())
    }

    fn config_path() -> Result<PathBuf, ScanError> {
        let home = home_dir().ok_or_else(|| ScanError::config("Could not find home directory"))?;
        Ok(home.join(CONFIG_FOLDER).join(CONFIG_FILE))
    }

    /// A missing file yields the default config, which is written out for the next run.
    pub fn read_config() -> Result<Self, ScanError> {
        let path = Self::config_path()?;
        if !path.exists() {
            let config = Self::default();
            config.save_config()?;
            return Ok(config);
        }
        let json = fs::read_to_string(&path)
            .map_err(|e| ScanError::config(format!("Could not read {}: {e}", path.display())))?;
        Self::from_json(&json)
    }

    fn from_json(json: &str) -> Result<Self, ScanError> {
        serde_json::from_str(json)
            .map_err(|e| ScanError::config(format!("Invalid local configuration: {e}")))
    }

    fn save_config(&self) -> Result<(), ScanError> {
        let path = Self::config_path()?;
        let write = |path: &PathBuf| -> std::io::Result<()> {
            if let Some(folder) = path.parent() {
                fs::create_dir_all(folder)?;
            }
            let json = serde_json::to_string_pretty(self)?;
            fs::write(path, json)
        };
        write(&path)
            .map_err(|e| ScanError::config(format!("Could not save {}: {e}", path.display())))
    }
}

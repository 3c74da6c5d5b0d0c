use crate::models::EngineSettings;
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;

/// File name of the engine settings inside the configuration directory
pub const SETTINGS_FILE: &str = "opexec.yaml";

/// Configuration manager for loading and saving engine settings.
///
/// Settings live in `opexec.yaml` inside the configuration directory. Loading
/// layers the file over [`EngineSettings::default`], so a missing file or a
/// file naming only some fields is fine.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_dir: Utf8PathBuf,
    settings_path: Utf8PathBuf,
}

impl ConfigManager {
    /// Create a new ConfigManager with the specified configuration directory.
    ///
    /// The directory is created if it doesn't exist.
    pub fn new<P: AsRef<Utf8Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create config directory: {}", config_dir))?;
        }

        Ok(Self {
            settings_path: config_dir.join(SETTINGS_FILE),
            config_dir,
        })
    }

    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }

    pub fn settings_path(&self) -> &Utf8Path {
        &self.settings_path
    }

    /// Load and validate the engine settings.
    ///
    /// # Returns
    /// The loaded settings, or defaults if the file doesn't exist
    pub fn load_settings(&self) -> Result<EngineSettings> {
        if !self.settings_path.exists() {
            tracing::warn!(
                "Settings file not found at {}, using defaults",
                self.settings_path
            );
        }

        let settings: EngineSettings = config::Config::builder()
            .add_source(
                config::File::from(self.settings_path.as_std_path())
                    .format(config::FileFormat::Yaml)
                    .required(false),
            )
            .build()
            .with_context(|| format!("Failed to read settings: {}", self.settings_path))?
            .try_deserialize()
            .with_context(|| format!("Failed to parse settings: {}", self.settings_path))?;

        settings
            .validate()
            .with_context(|| format!("Invalid settings in {}", self.settings_path))?;

        tracing::info!("Loaded engine settings from {}", self.settings_path);
        Ok(settings)
    }

    /// Save the engine settings.
    pub fn save_settings(&self, settings: &EngineSettings) -> Result<()> {
        let yaml_string =
            serde_yaml_ng::to_string(settings).context("Failed to serialize settings to YAML")?;

        fs::write(&self.settings_path, yaml_string)
            .with_context(|| format!("Failed to write settings: {}", self.settings_path))?;

        tracing::info!("Saved engine settings to {}", self.settings_path);
        Ok(())
    }
}

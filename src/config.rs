use chrono::NaiveTime;
use config::{Config, Environment, File as ConfigFile};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub root_directory: String,
    #[serde(default)]
    pub ignore_patterns: Vec<String>,
    #[serde(default = "default_true")]
    pub honour_first_delay: bool,
    pub mapping_file: String,
    #[serde(default = "default_database_path")]
    pub database_path: String,
    #[serde(default)]
    pub services: ServiceToggles,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub mapping_failure_policy: MappingFailurePolicy,
    #[serde(default = "default_image_extensions")]
    pub image_extensions: Vec<String>,
    #[serde(default = "default_progress_interval")]
    pub progress_interval: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_save_retry_attempts")]
    pub save_retry_attempts: u32,
    #[serde(default = "default_hard_delete_after_days")]
    pub hard_delete_after_days: u32,
}

/// Which scheduled jobs the worker runs.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceToggles {
    #[serde(default = "default_true")]
    pub new_files: bool,
    #[serde(default)]
    pub soft_delete: bool,
    #[serde(default)]
    pub hard_delete: bool,
}

impl Default for ServiceToggles {
    fn default() -> Self {
        Self {
            new_files: true,
            soft_delete: false,
            hard_delete: false,
        }
    }
}

/// Times of day, as `HH:MM` or `HH:MM:SS`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScheduleConfig {
    #[serde(default = "default_new_files_time")]
    pub new_files: String,
    #[serde(default = "default_soft_delete_time")]
    pub soft_delete: String,
    #[serde(default = "default_hard_delete_time")]
    pub hard_delete: String,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            new_files: default_new_files_time(),
            soft_delete: default_soft_delete_time(),
            hard_delete: default_hard_delete_time(),
        }
    }
}

/// Parsed form of [`ScheduleConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub new_files: NaiveTime,
    pub soft_delete: NaiveTime,
    pub hard_delete: NaiveTime,
}

/// What a cycle does when the mapping source cannot be loaded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingFailurePolicy {
    /// Skip classification sync only; files are still classified against
    /// the classifications already in the store.
    #[default]
    SkipSync,
    /// Mark the whole cycle failed and process no files.
    FailCycle,
}

fn default_true() -> bool {
    true
}

fn default_database_path() -> String {
    "catalog.db".to_string()
}

fn default_image_extensions() -> Vec<String> {
    ["jpg", "jpeg", "png", "gif", "bmp", "webp", "tif", "tiff"]
        .iter()
        .map(|ext| ext.to_string())
        .collect()
}

fn default_progress_interval() -> usize {
    1000
}

fn default_batch_size() -> usize {
    500
}

fn default_save_retry_attempts() -> u32 {
    3
}

fn default_hard_delete_after_days() -> u32 {
    30
}

fn default_new_files_time() -> String {
    "02:00".to_string()
}

fn default_soft_delete_time() -> String {
    "03:00".to_string()
}

fn default_hard_delete_time() -> String {
    "04:00".to_string()
}

impl AppConfig {
    /// Minimal configuration for a root directory and a mapping file; every
    /// other field takes its default.
    pub fn new(root_directory: impl Into<String>, mapping_file: impl Into<String>) -> Self {
        Self {
            root_directory: root_directory.into(),
            ignore_patterns: Vec::new(),
            honour_first_delay: true,
            mapping_file: mapping_file.into(),
            database_path: default_database_path(),
            services: ServiceToggles::default(),
            schedule: ScheduleConfig::default(),
            mapping_failure_policy: MappingFailurePolicy::default(),
            image_extensions: default_image_extensions(),
            progress_interval: default_progress_interval(),
            batch_size: default_batch_size(),
            save_retry_attempts: default_save_retry_attempts(),
            hard_delete_after_days: default_hard_delete_after_days(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.root_directory.trim().is_empty() {
            return Err(Error::invalid_config("root_directory must not be empty"));
        }
        if self.mapping_file.trim().is_empty() {
            return Err(Error::invalid_config("mapping_file must not be empty"));
        }
        if self.batch_size == 0 {
            return Err(Error::invalid_config("batch_size must be greater than zero"));
        }
        if self.progress_interval == 0 {
            return Err(Error::invalid_config(
                "progress_interval must be greater than zero",
            ));
        }
        if self.save_retry_attempts == 0 {
            return Err(Error::invalid_config(
                "save_retry_attempts must be at least 1",
            ));
        }
        self.schedule()?;
        Ok(())
    }

    pub fn schedule(&self) -> Result<Schedule> {
        Ok(Schedule {
            new_files: parse_time_of_day("schedule.new_files", &self.schedule.new_files)?,
            soft_delete: parse_time_of_day("schedule.soft_delete", &self.schedule.soft_delete)?,
            hard_delete: parse_time_of_day("schedule.hard_delete", &self.schedule.hard_delete)?,
        })
    }

    pub fn is_image_extension(&self, extension: &str) -> bool {
        self.image_extensions
            .iter()
            .any(|ext| ext.trim_start_matches('.').eq_ignore_ascii_case(extension))
    }
}

pub fn parse_time_of_day(field: &str, value: &str) -> Result<NaiveTime> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
        .map_err(|_| {
            Error::invalid_config(format!(
                "{} must be a time of day (HH:MM or HH:MM:SS), got '{}'",
                field, value
            ))
        })
}

/// Load `Config.toml` from the working directory (optional), overridden by
/// `CATALOG__*` environment variables.
pub fn load_configuration() -> Result<AppConfig> {
    let builder = Config::builder()
        .add_source(ConfigFile::with_name("Config").required(false))
        .add_source(Environment::with_prefix("CATALOG").separator("__"))
        .build()?;
    let config = builder.try_deserialize::<AppConfig>()?;
    config.validate()?;
    Ok(config)
}

pub fn load_configuration_from(path: &Path) -> Result<AppConfig> {
    let builder = Config::builder()
        .add_source(ConfigFile::from(path).required(true))
        .add_source(Environment::with_prefix("CATALOG").separator("__"))
        .build()?;
    let config = builder.try_deserialize::<AppConfig>()?;
    config.validate()?;
    Ok(config)
}

use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Inclusive bounds for the year of a parsed date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct YearRange {
    pub min: i32,
    pub max: i32,
}

impl YearRange {
    pub fn new(min: i32, max: i32) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, year: i32) -> bool {
        self.min <= year && year <= self.max
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub output_dir: String,
    pub media_extensions: Vec<String>,
    pub metadata_extension: String,
    pub metadata_subdir: Option<String>,
    pub date_formats: Vec<String>,
    pub year_range: Option<YearRange>,
    pub ignore_patterns: Vec<String>,
    pub recursive: bool,
    pub sample_limit: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            output_dir: "integrity_results".to_string(),
            media_extensions: vec!["mp4".to_string()],
            metadata_extension: "json".to_string(),
            metadata_subdir: None,
            date_formats: vec!["%Y%m%d".to_string(), "%Y-%m-%d".to_string()],
            year_range: Some(YearRange::new(1900, 2100)),
            ignore_patterns: vec!["*_backup_*".to_string()],
            recursive: false,
            sample_limit: 20,
        }
    }
}

/// Load `Config.toml` (optional) overlaid with `MEDIA_INTEGRITY__*` environment variables.
pub fn load_configuration() -> Result<AppConfig, ConfigError> {
    load_from(Path::new("Config"))
}

pub fn load_from(base: &Path) -> Result<AppConfig, ConfigError> {
    let builder = Config::builder()
        .add_source(ConfigFile::from(base).required(false))
        .add_source(
            Environment::with_prefix("MEDIA_INTEGRITY")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("media_extensions")
                .with_list_parse_key("date_formats")
                .with_list_parse_key("ignore_patterns")
                .try_parsing(true),
        )
        .build()?;
    builder.try_deserialize::<AppConfig>()
}

/// Remove directories that are subdirectories of other directories in the list.
pub fn non_overlapping_directories(dirs: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut result: Vec<PathBuf> = Vec::new();

    for dir in dirs {
        if result.iter().any(|kept| dir.starts_with(kept)) {
            continue;
        }
        result.retain(|kept| !kept.starts_with(&dir));
        result.push(dir);
    }

    result
}

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CatalinkError, Result};

/// Root application configuration, loaded from `~/.config/catalink/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub matching: MatchingConfig,
    pub merge: MergeConfig,
    pub duplicates: DuplicatesConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub database_path: String,
    /// Enforce unique identity values. Only read when the database file is
    /// created; audit copies that must hold duplicates set this to `false`.
    pub unique_identity: bool,
}

/// Candidate caps and score thresholds for the match pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    pub max_results: usize,
    pub fuzzy_high_threshold: f64,
    pub fuzzy_min_threshold: f64,
    pub similarity: SimilarityMetric,
    pub exact_limit: usize,
    pub manufacturer_ref_limit: usize,
    pub fuzzy_scan_limit: usize,
    pub fuzzy_keep: usize,
    pub partial_scan_limit: usize,
    pub partial_keep: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityMetric {
    /// Ratcliff/Obershelp matching-blocks ratio, `2 * M / T`.
    #[default]
    Ratio,
    Levenshtein,
    JaroWinkler,
}

impl std::fmt::Display for SimilarityMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ratio => write!(f, "ratio"),
            Self::Levenshtein => write!(f, "levenshtein"),
            Self::JaroWinkler => write!(f, "jaro_winkler"),
        }
    }
}

impl std::str::FromStr for SimilarityMetric {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "ratio" | "ratcliff_obershelp" => Ok(Self::Ratio),
            "levenshtein" => Ok(Self::Levenshtein),
            "jaro_winkler" | "jarowinkler" => Ok(Self::JaroWinkler),
            _ => Err(format!("Invalid SimilarityMetric: {s}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// Confidence assumed for a field that carries no score.
    pub default_confidence: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DuplicatesConfig {
    pub min_count: usize,
    pub page_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
}

// ─── Defaults ──────────────────────────────────────────────

impl Default for StorageConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("~/.local/share"))
            .join("catalink");

        Self {
            database_path: data_dir.join("catalink.db").to_string_lossy().to_string(),
            unique_identity: true,
        }
    }
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            max_results: 10,
            fuzzy_high_threshold: 0.90,
            fuzzy_min_threshold: 0.70,
            similarity: SimilarityMetric::Ratio,
            exact_limit: 5,
            manufacturer_ref_limit: 10,
            fuzzy_scan_limit: 50,
            fuzzy_keep: 10,
            partial_scan_limit: 20,
            partial_keep: 5,
        }
    }
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            default_confidence: 0.5,
        }
    }
}

impl Default for DuplicatesConfig {
    fn default() -> Self {
        Self {
            min_count: 2,
            page_size: 50,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

// ─── Load / Save ───────────────────────────────────────────

impl AppConfig {
    /// Standard config file path: `~/.config/catalink/config.toml`
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("CATALINK_CONFIG") {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("catalink")
            .join("config.toml")
    }

    /// Load config from disk, falling back to defaults if file doesn't exist.
    pub fn load() -> Result<Self> {
        let path = Self::config_path();
        Self::load_from(&path)
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to the standard path.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path();
        self.save_to(&path)
    }

    /// Save config to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let toml_str = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_str)?;
        Ok(())
    }

    /// Clamp thresholds into `[0, 1]` and reject inconsistent settings.
    pub fn validate(&mut self) -> Result<()> {
        let m = &mut self.matching;
        m.fuzzy_high_threshold = clamp_unit(m.fuzzy_high_threshold);
        m.fuzzy_min_threshold = clamp_unit(m.fuzzy_min_threshold);
        self.merge.default_confidence = clamp_unit(self.merge.default_confidence as f64) as f32;

        if m.fuzzy_min_threshold > m.fuzzy_high_threshold {
            return Err(CatalinkError::ConfigError(format!(
                "matching.fuzzy_min_threshold ({}) exceeds fuzzy_high_threshold ({})",
                m.fuzzy_min_threshold, m.fuzzy_high_threshold
            )));
        }
        if self.duplicates.page_size == 0 {
            return Err(CatalinkError::ConfigError(
                "duplicates.page_size must be positive".to_string(),
            ));
        }
        self.duplicates.min_count = self.duplicates.min_count.max(2);
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        PathBuf::from(&self.storage.database_path)
    }
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_is_valid() {
        let mut cfg = AppConfig::default();
        assert_eq!(cfg.matching.max_results, 10);
        assert_eq!(cfg.matching.similarity, SimilarityMetric::Ratio);
        assert_eq!(cfg.merge.default_confidence, 0.5);
        assert_eq!(cfg.duplicates.min_count, 2);
        assert!(cfg.database_path().to_string_lossy().contains("catalink.db"));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_config_toml_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        let mut cfg = AppConfig::default();
        cfg.matching.similarity = SimilarityMetric::JaroWinkler;
        cfg.matching.fuzzy_keep = 7;
        cfg.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded.matching.similarity, SimilarityMetric::JaroWinkler);
        assert_eq!(loaded.matching.fuzzy_keep, 7);
        assert_eq!(loaded.logging.filter, cfg.logging.filter);
    }

    #[test]
    fn test_load_nonexistent_returns_default() {
        let cfg = AppConfig::load_from(Path::new("/tmp/nonexistent_catalink_config.toml")).unwrap();
        assert_eq!(cfg.matching.exact_limit, 5);
    }

    #[test]
    fn test_partial_file_fills_defaults_and_clamps() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[matching]\nfuzzy_high_threshold = 1.4\n\n[duplicates]\nmin_count = 1\n",
        )
        .unwrap();

        let cfg = AppConfig::load_from(&path).unwrap();
        assert_eq!(cfg.matching.fuzzy_high_threshold, 1.0);
        assert_eq!(cfg.matching.fuzzy_min_threshold, 0.70);
        assert_eq!(cfg.duplicates.min_count, 2);
        assert_eq!(cfg.duplicates.page_size, 50);
    }

    #[test]
    fn test_inverted_thresholds_rejected() {
        let mut cfg = AppConfig::default();
        cfg.matching.fuzzy_min_threshold = 0.95;
        assert!(matches!(cfg.validate(), Err(CatalinkError::ConfigError(_))));
    }

    #[test]
    fn test_similarity_metric_from_str() {
        assert_eq!(
            "jaro-winkler".parse::<SimilarityMetric>().unwrap(),
            SimilarityMetric::JaroWinkler
        );
        assert_eq!("ratio".parse::<SimilarityMetric>().unwrap(), SimilarityMetric::Ratio);
        assert_eq!(SimilarityMetric::default(), SimilarityMetric::Ratio);
        assert!("cosine".parse::<SimilarityMetric>().is_err());
    }
}

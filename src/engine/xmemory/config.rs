// ── xmemory: Configuration Loading ──────────────────────────────────────────
//
// TOML file loading and sanity checks for `XMemoryConfig`. Missing keys fall
// back to the defaults in `atoms::constants`.
//
// Example:
//
//   storage_root = "/var/lib/agent/memory"
//   load_policy = "propagate"
//
//   [themes]
//   attach_threshold = 0.6
//   max_theme_size = 20
//
//   [search]
//   max_token_budget = 2000
//   expand_to_episodes = true

use crate::atoms::error::{MemoryError, MemoryResult};
use crate::atoms::xmemory_types::XMemoryConfig;
use log::info;
use std::path::Path;

impl XMemoryConfig {
    /// Read and validate a TOML config file.
    pub fn load_from_file(path: impl AsRef<Path>) -> MemoryResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)?;
        config.validate()?;
        info!("[xmemory::config] Loaded config from {}", path.display());
        Ok(config)
    }

    /// Reject values the engine cannot work with.
    pub fn validate(&self) -> MemoryResult<()> {
        let t = &self.themes;
        for (name, value) in [
            ("attach_threshold", t.attach_threshold),
            ("merge_threshold", t.merge_threshold),
            ("expand_threshold", t.expand_threshold),
            ("cluster_threshold", t.cluster_threshold),
        ] {
            if !(-1.0..=1.0).contains(&value) {
                return Err(MemoryError::Config(format!(
                    "themes.{} must be within [-1, 1], got {}",
                    name, value
                )));
            }
        }
        if t.max_theme_size == 0 {
            return Err(MemoryError::Config("themes.max_theme_size must be at least 1".into()));
        }
        if self.search.top_k_themes == 0 {
            return Err(MemoryError::Config("search.top_k_themes must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::xmemory_types::LoadPolicy;

    #[test]
    fn empty_document_gives_defaults() {
        let config = XMemoryConfig::from_toml_str("").unwrap();
        assert_eq!(config, XMemoryConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_document_overrides_only_given_keys() {
        let config = XMemoryConfig::from_toml_str(
            r#"
            load_policy = "propagate"

            [themes]
            max_theme_size = 20

            [search]
            expand_to_episodes = true
            "#,
        )
        .unwrap();
        assert_eq!(config.load_policy, LoadPolicy::Propagate);
        assert_eq!(config.themes.max_theme_size, 20);
        assert_eq!(config.themes.attach_threshold, 0.62);
        assert!(config.search.expand_to_episodes);
        assert_eq!(config.search.max_token_budget, 4000);
    }

    #[test]
    fn out_of_range_threshold_is_rejected() {
        let mut config = XMemoryConfig::default();
        config.themes.merge_threshold = 1.5;
        assert!(matches!(config.validate(), Err(MemoryError::Config(_))));
    }

    #[test]
    fn load_from_file_reads_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("xmemory.toml");
        std::fs::write(&path, "storage_root = \"/tmp/mem\"\n[themes]\nknn_k = 4\n").unwrap();

        let config = XMemoryConfig::load_from_file(&path).unwrap();
        assert_eq!(config.storage_root, std::path::PathBuf::from("/tmp/mem"));
        assert_eq!(config.themes.knn_k, 4);

        assert!(matches!(
            XMemoryConfig::load_from_file(dir.path().join("missing.toml")),
            Err(MemoryError::Io(_))
        ));
    }
}

use crate::errors::ConfigError;

/// Database connection settings. Field names mirror spec §6's "Database"
/// group; the DSN itself is assembled by [`DatabaseConfig::connection_url`].
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub ssl_mode: String,

    pub max_connections: u32,
    pub min_connections: u32,
    pub max_conn_lifetime_minutes: u64,
    pub max_conn_idle_minutes: u64,

    /// Rows per bulk-insert batch. Default 50_000 per spec §5 "Backpressure".
    pub batch_size: usize,
}

impl DatabaseConfig {
    pub fn connection_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}?sslmode={}",
            self.user, self.password, self.host, self.port, self.database, self.ssl_mode
        )
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            host: "localhost".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            password: String::new(),
            database: "gnames".to_string(),
            ssl_mode: "disable".to_string(),
            max_connections: 10,
            min_connections: 1,
            max_conn_lifetime_minutes: 60,
            max_conn_idle_minutes: 10,
            batch_size: 50_000,
        }
    }
}

/// Populate-phase overrides, from spec §6 "Populate" group.
#[derive(Debug, Clone, Default)]
pub struct PopulateConfig {
    /// Empty means "all configured sources".
    pub source_ids: Vec<i32>,
    pub release_version: Option<String>,
    pub release_date: Option<String>,
    pub with_flat_classification: bool,
}

/// Runtime knobs, from spec §6 "Runtime" group.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub jobs_number: usize,
    pub home_dir: std::path::PathBuf,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            jobs_number: num_cpus::get(),
            home_dir: std::env::temp_dir(),
        }
    }
}

/// A single source descriptor, loaded (by the excluded config collaborator)
/// from the per-source YAML file described in spec §6.
#[derive(Debug, Clone)]
pub struct SourceDescriptor {
    pub id: i32,
    pub parent: SourceLocation,
    pub title: Option<String>,
    pub title_short: Option<String>,
    pub description: Option<String>,
    pub home_url: Option<String>,
    pub doi: Option<String>,
    pub is_curated: bool,
    pub is_auto_curated: bool,
    pub has_taxon_data: bool,
    pub has_classification: bool,
}

#[derive(Debug, Clone)]
pub enum SourceLocation {
    LocalDir(std::path::PathBuf),
    Url(String),
}

/// The validated, immutable configuration record the core consumes. See
/// SPEC_FULL §1.3: constructed only through [`Config::validated`], so an
/// inconsistent configuration (e.g. a release override against more than one
/// source) can never reach the orchestrator.
#[derive(Debug, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub populate: PopulateConfig,
    pub runtime: RuntimeConfig,
    pub sources: Vec<SourceDescriptor>,
}

impl Config {
    /// Builds a config record, enforcing the single cross-cutting invariant
    /// that belongs to the core rather than to config loading: a
    /// release_version/release_date override may only be applied when
    /// exactly one source is selected (spec §4.9, tested by §8 scenario 3).
    pub fn validated(
        database: DatabaseConfig,
        populate: PopulateConfig,
        runtime: RuntimeConfig,
        sources: Vec<SourceDescriptor>,
    ) -> Result<Config, ConfigError> {
        let selected_count = Self::selected_source_count(&populate, &sources);

        let has_override = populate.release_version.is_some() || populate.release_date.is_some();
        if has_override && selected_count != 1 {
            return Err(ConfigError::OverrideRequiresSingleSource(selected_count));
        }

        Ok(Config {
            database,
            populate,
            runtime,
            sources,
        })
    }

    fn selected_source_count(populate: &PopulateConfig, sources: &[SourceDescriptor]) -> usize {
        if populate.source_ids.is_empty() {
            sources.len()
        }
        else {
            populate.source_ids.len()
        }
    }

    /// Sources selected for this run, honoring the `sourceIDs` filter (empty
    /// = all sources, per spec §6).
    pub fn selected_sources(&self) -> Vec<&SourceDescriptor> {
        if self.populate.source_ids.is_empty() {
            return self.sources.iter().collect();
        }

        self.sources
            .iter()
            .filter(|source| self.populate.source_ids.contains(&source.id))
            .collect()
    }

    pub fn cache_dir(&self) -> std::path::PathBuf {
        self.runtime.home_dir.join(".cache").join("gn-indexer").join("sfga")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(id: i32) -> SourceDescriptor {
        SourceDescriptor {
            id,
            parent: SourceLocation::Url(format!("https://example.org/{id}")),
            title: None,
            title_short: None,
            description: None,
            home_url: None,
            doi: None,
            is_curated: false,
            is_auto_curated: false,
            has_taxon_data: true,
            has_classification: true,
        }
    }

    #[test]
    fn override_with_single_selected_source_is_accepted() {
        let mut populate = PopulateConfig::default();
        populate.source_ids = vec![1];
        populate.release_version = Some("2024.1".to_string());

        let config = Config::validated(
            DatabaseConfig::default(),
            populate,
            RuntimeConfig::default(),
            vec![source(1), source(2)],
        );
        assert!(config.is_ok());
    }

    #[test]
    fn override_with_multiple_selected_sources_is_rejected() {
        let mut populate = PopulateConfig::default();
        populate.source_ids = vec![1, 2, 3];
        populate.release_version = Some("2024.1".to_string());

        let config = Config::validated(
            DatabaseConfig::default(),
            populate,
            RuntimeConfig::default(),
            vec![source(1), source(2), source(3)],
        );
        assert!(matches!(config, Err(ConfigError::OverrideRequiresSingleSource(3))));
    }

    #[test]
    fn override_with_empty_filter_counts_all_configured_sources() {
        let mut populate = PopulateConfig::default();
        populate.release_date = Some("2024-01-01".to_string());

        let config = Config::validated(
            DatabaseConfig::default(),
            populate,
            RuntimeConfig::default(),
            vec![source(1), source(2)],
        );
        assert!(matches!(config, Err(ConfigError::OverrideRequiresSingleSource(2))));
    }

    #[test]
    fn no_override_allows_any_number_of_sources() {
        let populate = PopulateConfig::default();
        let config = Config::validated(
            DatabaseConfig::default(),
            populate,
            RuntimeConfig::default(),
            vec![source(1), source(2)],
        );
        assert!(config.is_ok());
    }

    #[test]
    fn selected_sources_filters_by_source_ids() {
        let mut populate = PopulateConfig::default();
        populate.source_ids = vec![2];

        let config = Config::validated(
            DatabaseConfig::default(),
            populate,
            RuntimeConfig::default(),
            vec![source(1), source(2), source(3)],
        )
        .unwrap();

        let selected: Vec<i32> = config.selected_sources().iter().map(|s| s.id).collect();
        assert_eq!(selected, vec![2]);
    }
}

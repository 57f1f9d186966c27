use chrono::Utc;
use diesel::prelude::*;
use tracing::info;

use crate::config::SourceDescriptor;
use crate::db::models::DataSource;
use crate::db::{schema, Operator};
use crate::errors::Error;
use crate::fetch::ParsedFilename;
use crate::sfga::MetadataRow;

/// The fields a populate run resolves before writing a `data_sources` row,
/// split out as a pure function so the merge precedence (spec §4.8) can be
/// unit tested without a database.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedMetadata {
    pub title: Option<String>,
    pub title_short: String,
    pub description: Option<String>,
    pub doi: Option<String>,
    pub release_version: Option<String>,
    pub release_date: Option<String>,
}

/// Merges SFGA metadata with the per-source config (spec §4.8):
/// `title_short`/`website_url`/the curated flags are always taken from
/// config; `title`/`description`/`doi` fall back to SFGA only when config
/// leaves them empty; version/date follow the precedence chain
/// config-override > filename-parsed > SFGA metadata > null.
pub fn resolve(
    source: &SourceDescriptor,
    sfga: Option<&MetadataRow>,
    parsed_filename: Option<&ParsedFilename>,
    config_release_version: Option<&str>,
    config_release_date: Option<&str>,
) -> ResolvedMetadata {
    let title = source.title.clone().or_else(|| sfga.and_then(|m| m.title.clone()));
    let description = source.description.clone().or_else(|| sfga.and_then(|m| m.description.clone()));
    let doi = source.doi.clone().or_else(|| sfga.and_then(|m| m.doi.clone()));

    let title_short = source
        .title_short
        .clone()
        .or_else(|| sfga.and_then(|m| m.title.clone()))
        .unwrap_or_else(|| source.id.to_string());

    let release_version = config_release_version
        .map(|v| v.to_string())
        .or_else(|| parsed_filename.map(|p| p.version.to_string()))
        .or_else(|| sfga.and_then(|m| m.version.clone()));

    let release_date = config_release_date
        .map(|d| d.to_string())
        .or_else(|| parsed_filename.map(|p| p.date.clone()))
        .or_else(|| sfga.and_then(|m| m.release_date.clone()));

    ResolvedMetadata {
        title,
        title_short,
        description,
        doi,
        release_version,
        release_date,
    }
}

/// The Source-Metadata Writer (spec §4.8). Resolves a source's metadata,
/// pulls live counts from the two index tables, and upserts exactly one
/// `data_sources` row.
pub struct SourceMetadataWriter<'a> {
    operator: &'a Operator,
}

impl<'a> SourceMetadataWriter<'a> {
    pub fn new(operator: &'a Operator) -> SourceMetadataWriter<'a> {
        SourceMetadataWriter { operator }
    }

    pub fn write(
        &self,
        source: &SourceDescriptor,
        sfga: Option<&MetadataRow>,
        parsed_filename: Option<&ParsedFilename>,
        config_release_version: Option<&str>,
        config_release_date: Option<&str>,
    ) -> Result<DataSource, Error> {
        let resolved = resolve(source, sfga, parsed_filename, config_release_version, config_release_date);

        let record_count = self.operator.count_name_string_indices_for_source(source.id)? as i32;
        let vern_record_count = self.operator.count_vernacular_string_indices_for_source(source.id)? as i32;

        let row = DataSource {
            id: source.id,
            title: resolved.title,
            title_short: resolved.title_short,
            website_url: source.home_url.clone(),
            doi: resolved.doi,
            description: resolved.description,
            is_curated: source.is_curated,
            is_auto_curated: source.is_auto_curated,
            has_taxon_data: source.has_taxon_data,
            record_count,
            vern_record_count,
            release_version: resolved.release_version,
            release_date: resolved.release_date,
            updated_at: Utc::now(),
        };

        self.upsert(&row)?;
        info!(source_id = source.id, record_count, vern_record_count, "source metadata refreshed");
        Ok(row)
    }

    fn upsert(&self, row: &DataSource) -> Result<(), Error> {
        use schema::data_sources::dsl::id;

        let mut conn = self.operator.connection()?;
        diesel::insert_into(schema::data_sources::table)
            .values(row)
            .on_conflict(id)
            .do_update()
            .set(row)
            .execute(&mut conn)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SourceLocation;

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

    fn sfga_meta() -> MetadataRow {
        MetadataRow {
            title: Some("Ruhoff 1980".to_string()),
            description: Some("desc".to_string()),
            doi: None,
            version: Some("v1".to_string()),
            release_date: Some("1980-01-01".to_string()),
        }
    }

    #[test]
    fn config_fields_win_over_sfga_when_present() {
        let mut descriptor = source(1000);
        descriptor.title = Some("Configured Title".to_string());

        let resolved = resolve(&descriptor, Some(&sfga_meta()), None, None, None);
        assert_eq!(resolved.title.as_deref(), Some("Configured Title"));
    }

    #[test]
    fn sfga_fields_fill_in_when_config_is_empty() {
        let descriptor = source(1000);
        let resolved = resolve(&descriptor, Some(&sfga_meta()), None, None, None);
        assert_eq!(resolved.title.as_deref(), Some("Ruhoff 1980"));
        assert_eq!(resolved.title_short, "Ruhoff 1980");
        assert_eq!(resolved.description.as_deref(), Some("desc"));
    }

    #[test]
    fn title_short_falls_back_to_source_id_when_nothing_else_is_available() {
        let descriptor = source(2000);
        let resolved = resolve(&descriptor, None, None, None, None);
        assert_eq!(resolved.title_short, "2000");
    }

    #[test]
    fn version_precedence_is_config_then_filename_then_sfga() {
        let descriptor = source(1000);
        let parsed = ParsedFilename {
            id: 1000,
            slug: "ruhoff-1980".to_string(),
            date: "1980-06-01".to_string(),
            version: 3,
            compressed: false,
        };

        let resolved = resolve(&descriptor, Some(&sfga_meta()), Some(&parsed), None, None);
        assert_eq!(resolved.release_version.as_deref(), Some("3"));
        assert_eq!(resolved.release_date.as_deref(), Some("1980-06-01"));

        let resolved_with_override = resolve(&descriptor, Some(&sfga_meta()), Some(&parsed), Some("2024.1"), Some("2024-01-01"));
        assert_eq!(resolved_with_override.release_version.as_deref(), Some("2024.1"));
        assert_eq!(resolved_with_override.release_date.as_deref(), Some("2024-01-01"));
    }

    #[test]
    fn version_falls_back_to_sfga_when_no_filename_or_override_exists() {
        let descriptor = source(1000);
        let resolved = resolve(&descriptor, Some(&sfga_meta()), None, None, None);
        assert_eq!(resolved.release_version.as_deref(), Some("v1"));
    }
}

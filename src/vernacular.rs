use diesel::prelude::*;
use tracing::{info, warn};

use crate::cancel::CancellationToken;
use crate::db::models::{VernacularString, VernacularStringIndex};
use crate::db::{schema, Operator};
use crate::errors::Error;
use crate::ids::vernacular_string_id;
use crate::progress::{ProgressEvent, ProgressReporter};
use crate::sfga::SfgaArchive;

/// The Vernacular Ingestor (spec §4.7). Two sub-passes: dedup vernacular
/// name text into `vernacular_strings`, then delete-by-source and
/// bulk-insert every SFGA vernacular record (not deduplicated) into
/// `vernacular_string_indices`.
pub struct VernacularIngestor<'a> {
    operator: &'a Operator,
    batch_size: usize,
}

impl<'a> VernacularIngestor<'a> {
    pub fn new(operator: &'a Operator, batch_size: usize) -> VernacularIngestor<'a> {
        VernacularIngestor { operator, batch_size }
    }

    pub fn ingest(
        &self,
        source_id: i32,
        archive: &SfgaArchive,
        cancel: &CancellationToken,
        progress: &ProgressReporter,
    ) -> Result<usize, Error> {
        let start = std::time::Instant::now();

        let mut string_batch: Vec<VernacularString> = Vec::with_capacity(self.batch_size);
        archive.for_each_vernacular(|row| {
            cancel.check()?;
            let id = vernacular_string_id(&row.name);
            string_batch.push(VernacularString { id, name: row.name });
            if string_batch.len() >= self.batch_size {
                self.flush_strings(&mut string_batch)?;
            }
            Ok(())
        })?;
        self.flush_strings(&mut string_batch)?;

        self.operator.delete_vernacular_string_indices_for_source(source_id)?;

        let mut index_batch: Vec<VernacularStringIndex> = Vec::with_capacity(self.batch_size);
        let mut total = 0usize;

        archive.for_each_vernacular(|row| {
            cancel.check()?;

            if let (Some(locality), Some(area)) = (&row.locality, &row.area) {
                if locality != area {
                    warn!(taxon_id = row.taxon_id, locality, area, "vernacular locality and area disagree, preferring locality");
                }
            }

            index_batch.push(VernacularStringIndex {
                data_source_id: source_id,
                record_id: row.taxon_id.to_string(),
                language: row.language.clone().unwrap_or_default(),
                vernacular_string_id: vernacular_string_id(&row.name),
                lang_code: row.language.as_deref().map(normalize_language_code),
                locality: row.locality.or(row.area),
                country_code: row.country,
                is_preferred: false,
            });

            if index_batch.len() >= self.batch_size {
                self.flush_indices(&mut index_batch)?;
                total += self.batch_size;
                progress.emit(ProgressEvent::new("vernaculars", Some(source_id), total as u64, start.elapsed()));
            }

            Ok(())
        })?;

        total += index_batch.len();
        self.flush_indices(&mut index_batch)?;
        progress.emit(ProgressEvent::new("vernaculars", Some(source_id), total as u64, start.elapsed()));

        info!(source_id, total, "vernacular ingestion finished");
        Ok(total)
    }

    fn flush_strings(&self, batch: &mut Vec<VernacularString>) -> Result<(), Error> {
        if batch.is_empty() {
            return Ok(());
        }

        use schema::vernacular_strings::dsl::id;

        let mut conn = self.operator.connection()?;
        diesel::insert_into(schema::vernacular_strings::table)
            .values(batch.as_slice())
            .on_conflict(id)
            .do_nothing()
            .execute(&mut conn)?;

        batch.clear();
        Ok(())
    }

    fn flush_indices(&self, batch: &mut Vec<VernacularStringIndex>) -> Result<(), Error> {
        if batch.is_empty() {
            return Ok(());
        }
        self.operator.copy_vernacular_string_indices(batch)?;
        batch.clear();
        Ok(())
    }
}

/// Best-effort normalization: lower-case the original language code. The
/// real ISO-639 validation/lookup lives outside this crate's scope; this
/// mirrors what the Optimizer's step 2 does to `lang_code` after populate
/// (spec §4.10 item 2), applied here too so a fresh populate already has a
/// normalized value before optimize ever runs.
fn normalize_language_code(language: &str) -> String {
    language.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_name_text_yields_the_same_string_id_across_locales() {
        let a = vernacular_string_id("Common plantain");
        let b = vernacular_string_id("Common plantain");
        assert_eq!(a, b);
    }

    #[test]
    fn normalize_language_code_lower_cases_and_trims() {
        assert_eq!(normalize_language_code(" ENG "), "eng");
    }

    #[test]
    fn locality_falls_back_to_area_when_locality_column_is_absent() {
        let locality: Option<String> = None;
        let area = Some("Europe".to_string());
        assert_eq!(locality.or(area), Some("Europe".to_string()));
    }

    #[test]
    fn locality_wins_over_area_when_both_are_present_and_disagree() {
        let locality = Some("London".to_string());
        let area = Some("Europe".to_string());
        assert_eq!(locality.clone().or(area), Some("London".to_string()));
        assert_ne!(locality, Some("Europe".to_string()));
    }
}

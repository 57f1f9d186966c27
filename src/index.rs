use std::collections::HashSet;

use tracing::info;

use crate::cancel::CancellationToken;
use crate::classification::ClassificationEncoder;
use crate::db::models::NameStringIndex;
use crate::db::Operator;
use crate::errors::Error;
use crate::hierarchy::{rank_name, status_name, Hierarchy};
use crate::ids::name_string_id;
use crate::progress::{ProgressEvent, ProgressReporter};
use crate::sfga::{FlatClassification, SfgaArchive};

pub const TAXONOMIC_STATUS_BARE_NAME: &str = "bare name";
pub const TAXONOMIC_STATUS_SYNONYM: &str = "synonym";
pub const TAXONOMIC_STATUS_DEFAULT_ACCEPTED: &str = "accepted";

/// The Index Writer (spec §4.6). Produces one `name_string_indices` row per
/// occurrence of a name in a source, across three query passes: accepted
/// taxa, synonyms, and bare names.
pub struct IndexWriter<'a> {
    operator: &'a Operator,
    hierarchy: &'a Hierarchy,
    batch_size: usize,
    with_flat_classification: bool,
}

impl<'a> IndexWriter<'a> {
    pub fn new(
        operator: &'a Operator,
        hierarchy: &'a Hierarchy,
        batch_size: usize,
        with_flat_classification: bool,
    ) -> IndexWriter<'a> {
        IndexWriter {
            operator,
            hierarchy,
            batch_size,
            with_flat_classification,
        }
    }

    /// Deletes every existing row for `source_id`, then writes fresh rows
    /// from all three passes over `archive`. Returns the total row count
    /// written (spec §3 invariant 4/5, used by the Source-Metadata Writer).
    pub fn write(
        &self,
        source_id: i32,
        archive: &SfgaArchive,
        cancel: &CancellationToken,
        progress: &ProgressReporter,
    ) -> Result<usize, Error> {
        let start = std::time::Instant::now();
        self.operator.delete_name_string_indices_for_source(source_id)?;

        let encoder = ClassificationEncoder::new(self.hierarchy, self.with_flat_classification);
        let mut batch: Vec<NameStringIndex> = Vec::with_capacity(self.batch_size);
        let mut total = 0usize;
        let mut referenced_name_ids: HashSet<i64> = HashSet::new();

        // Pass 1: accepted taxa.
        archive.for_each_taxon_with_name(|record| {
            cancel.check()?;
            let breadcrumbs = encoder.encode(record.id, &record.flat);

            batch.push(NameStringIndex {
                data_source_id: source_id,
                record_id: record.id.to_string(),
                name_string_id: name_string_id(&record.scientific_name),
                outlink_id: None,
                local_id: None,
                global_id: None,
                code_id: record.code_id,
                rank: rank_name(record.rank_id),
                taxonomic_status: status_name(record.status_id)
                    .unwrap_or_else(|| TAXONOMIC_STATUS_DEFAULT_ACCEPTED.to_string()),
                accepted_record_id: Some(record.id.to_string()),
                classification: breadcrumbs.classification,
                classification_ranks: breadcrumbs.classification_ranks,
                classification_ids: breadcrumbs.classification_ids,
            });

            self.flush_if_full(&mut batch, &mut total, start, progress, source_id)
        })?;

        // Pass 2: synonyms, breadcrumbs rooted at the accepted taxon.
        archive.for_each_synonym_with_name(|record| {
            cancel.check()?;
            let flat = archive.flat_classification(record.taxon_id)?;
            let breadcrumbs = encoder.encode(record.taxon_id, &flat);

            batch.push(NameStringIndex {
                data_source_id: source_id,
                record_id: record.id.to_string(),
                name_string_id: name_string_id(&record.scientific_name),
                outlink_id: None,
                local_id: None,
                global_id: None,
                code_id: record.code_id,
                rank: rank_name(record.rank_id),
                taxonomic_status: status_name(record.status_id)
                    .unwrap_or_else(|| TAXONOMIC_STATUS_SYNONYM.to_string()),
                accepted_record_id: Some(record.taxon_id.to_string()),
                classification: breadcrumbs.classification,
                classification_ranks: breadcrumbs.classification_ranks,
                classification_ids: breadcrumbs.classification_ids,
            });

            self.flush_if_full(&mut batch, &mut total, start, progress, source_id)
        })?;

        // Collect the name ids referenced by taxon/synonym rows so the bare
        // name pass below can skip them.
        archive.for_each_taxon(|row| {
            referenced_name_ids.insert(row.name_id);
            Ok(())
        })?;
        archive.for_each_synonym(|row| {
            referenced_name_ids.insert(row.name_id);
            Ok(())
        })?;

        // Pass 3: bare names -- any name never reached by taxon or synonym.
        archive.for_each_name(|row| {
            cancel.check()?;
            if referenced_name_ids.contains(&row.id) {
                return Ok(());
            }

            let name_text = row.preferred_text().to_string();

            batch.push(NameStringIndex {
                data_source_id: source_id,
                record_id: format!("bare-name-{}", row.id),
                name_string_id: name_string_id(&name_text),
                outlink_id: None,
                local_id: None,
                global_id: None,
                code_id: row.code_id,
                rank: rank_name(row.rank_id),
                taxonomic_status: TAXONOMIC_STATUS_BARE_NAME.to_string(),
                accepted_record_id: None,
                classification: String::new(),
                classification_ranks: String::new(),
                classification_ids: String::new(),
            });

            self.flush_if_full(&mut batch, &mut total, start, progress, source_id)
        })?;

        total += batch.len();
        self.flush(&batch)?;
        progress.emit(ProgressEvent::new("indices", Some(source_id), total as u64, start.elapsed()));

        info!(source_id, total, "index write finished");
        Ok(total)
    }

    fn flush_if_full(
        &self,
        batch: &mut Vec<NameStringIndex>,
        total: &mut usize,
        start: std::time::Instant,
        progress: &ProgressReporter,
        source_id: i32,
    ) -> Result<(), Error> {
        if batch.len() < self.batch_size {
            return Ok(());
        }

        self.flush(batch)?;
        *total += batch.len();
        batch.clear();
        progress.emit(ProgressEvent::new("indices", Some(source_id), *total as u64, start.elapsed()));
        Ok(())
    }

    fn flush(&self, batch: &[NameStringIndex]) -> Result<(), Error> {
        if batch.is_empty() {
            return Ok(());
        }
        self.operator.copy_name_string_indices(batch)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_name_record_ids_carry_the_fixed_prefix() {
        let record_id = format!("bare-name-{}", 42);
        assert_eq!(record_id, "bare-name-42");
    }

    #[test]
    fn default_accepted_status_is_used_when_taxon_status_is_unrecognized() {
        assert_eq!(status_name(Some(999)), None);
        let fallback = status_name(Some(999)).unwrap_or_else(|| TAXONOMIC_STATUS_DEFAULT_ACCEPTED.to_string());
        assert_eq!(fallback, "accepted");
    }

    #[test]
    fn empty_breadcrumb_columns_have_zero_fields_each() {
        let row = NameStringIndex {
            data_source_id: 1,
            record_id: "bare-name-1".to_string(),
            name_string_id: name_string_id("Plantago major"),
            outlink_id: None,
            local_id: None,
            global_id: None,
            code_id: None,
            rank: None,
            taxonomic_status: TAXONOMIC_STATUS_BARE_NAME.to_string(),
            accepted_record_id: None,
            classification: String::new(),
            classification_ranks: String::new(),
            classification_ids: String::new(),
        };
        assert!(row.classification.is_empty());
        assert!(row.classification_ranks.is_empty());
        assert!(row.classification_ids.is_empty());
    }
}

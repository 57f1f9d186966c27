use std::collections::HashSet;
use std::sync::Mutex;

use diesel::prelude::*;
use tracing::{info, warn};

use crate::cancel::CancellationToken;
use crate::db::models::NameString;
use crate::db::{schema, Operator};
use crate::errors::Error;
use crate::ids::name_string_id;
use crate::progress::{ProgressEvent, ProgressReporter};
use crate::sfga::SfgaArchive;

/// The Name-String Ingestor (spec §4.3). Streams every row from the SFGA
/// `name` table, computes a deterministic id, and upserts into
/// `name_strings` with conflict-ignore semantics -- duplicate names across
/// sources cost only an index probe.
pub struct NameIngestor<'a> {
    pub operator: &'a Operator,
    pub batch_size: usize,
    warned_missing_gn_column: Mutex<bool>,
}

impl<'a> NameIngestor<'a> {
    pub fn new(operator: &'a Operator, batch_size: usize) -> NameIngestor<'a> {
        NameIngestor {
            operator,
            batch_size,
            warned_missing_gn_column: Mutex::new(false),
        }
    }

    /// Returns the set of distinct name texts encountered, keyed by their
    /// deterministic id, so the Index Writer (C6) can look up a name's id
    /// without a second pass over the archive.
    pub fn ingest(
        &self,
        archive: &SfgaArchive,
        cancel: &CancellationToken,
        progress: &ProgressReporter,
    ) -> Result<HashSet<uuid::Uuid>, Error> {
        let start = std::time::Instant::now();
        let mut batch: Vec<NameString> = Vec::with_capacity(self.batch_size);
        let mut seen_ids = HashSet::new();
        let mut total = 0u64;

        archive.for_each_name(|row| {
            cancel.check()?;

            if !matches!(&row.gn_scientific_name_string, Some(text) if !text.is_empty()) {
                self.warn_missing_gn_column_once();
            }
            let name_text = row.preferred_text().to_string();

            let id = name_string_id(&name_text);
            seen_ids.insert(id);
            batch.push(NameString::unparsed(id, name_text));

            if batch.len() >= self.batch_size {
                self.flush(&mut batch)?;
                total += self.batch_size as u64;
                progress.emit(ProgressEvent::new("names", None, total, start.elapsed()));
            }

            Ok(())
        })?;

        total += batch.len() as u64;
        self.flush(&mut batch)?;
        progress.emit(ProgressEvent::new("names", None, total, start.elapsed()));

        info!(total, "name string ingestion finished");
        Ok(seen_ids)
    }

    fn warn_missing_gn_column_once(&self) {
        let mut warned = self.warned_missing_gn_column.lock().unwrap();
        if !*warned {
            warn!("gn__scientific_name_string column not present, falling back to col__scientific_name");
            *warned = true;
        }
    }

    fn flush(&self, batch: &mut Vec<NameString>) -> Result<(), Error> {
        if batch.is_empty() {
            return Ok(());
        }

        use schema::name_strings::dsl::id;

        let mut conn = self.operator.connection()?;
        diesel::insert_into(schema::name_strings::table)
            .values(batch.as_slice())
            .on_conflict(id)
            .do_nothing()
            .execute(&mut conn)?;

        batch.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // The gn__scientific_name_string-vs-col__scientific_name fallback
    // itself is exercised at the SFGA reader level
    // (`falls_back_to_col_scientific_name_without_gn_column` in sfga.rs);
    // here we only check the pieces that are local to this module.

    #[test]
    fn unparsed_name_strings_have_null_parse_columns() {
        let row = NameString::unparsed(name_string_id("Plantago major"), "Plantago major".to_string());
        assert!(row.canonical_id.is_none());
        assert!(row.parse_quality.is_none());
        assert!(!row.virus);
    }

    #[test]
    fn distinct_names_collect_into_distinct_seen_ids() {
        let mut seen = HashSet::new();
        seen.insert(name_string_id("Plantago major"));
        seen.insert(name_string_id("Plantago major"));
        seen.insert(name_string_id("Plantago minor"));
        assert_eq!(seen.len(), 2);
    }
}

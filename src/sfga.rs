use rusqlite::{Connection, OptionalExtension, Row};

use crate::errors::Error;

/// A thin read-only wrapper around an opened SFGA SQLite file (spec §6
/// "SFGA archive layout"). Missing tables are tolerated and treated as
/// empty; unknown extra columns are ignored, per spec.
pub struct SfgaArchive {
    conn: Connection,
}

#[derive(Debug, Clone)]
pub struct MetadataRow {
    pub title: Option<String>,
    pub description: Option<String>,
    pub doi: Option<String>,
    pub version: Option<String>,
    pub release_date: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NameRow {
    pub id: i64,
    pub scientific_name: String,
    pub gn_scientific_name_string: Option<String>,
    pub rank_id: Option<i64>,
    pub code_id: Option<i16>,
}

impl NameRow {
    /// The text every id-computing consumer must agree on: the
    /// pre-normalized `gn__scientific_name_string` when present and
    /// non-empty, `col__scientific_name` otherwise (spec §4.3). Kept as one
    /// method so the Name-String Ingestor and the Index Writer's bare-name
    /// pass can never disagree on which text a given row's id is derived
    /// from.
    pub fn preferred_text(&self) -> &str {
        match &self.gn_scientific_name_string {
            Some(text) if !text.is_empty() => text,
            _ => &self.scientific_name,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FlatClassification {
    pub kingdom: Option<(String, i64)>,
    pub phylum: Option<(String, i64)>,
    pub subphylum: Option<(String, i64)>,
    pub class: Option<(String, i64)>,
    pub order: Option<(String, i64)>,
    pub suborder: Option<(String, i64)>,
    pub superfamily: Option<(String, i64)>,
    pub family: Option<(String, i64)>,
    pub subfamily: Option<(String, i64)>,
    pub tribe: Option<(String, i64)>,
    pub subtribe: Option<(String, i64)>,
    pub genus: Option<(String, i64)>,
    pub subgenus: Option<(String, i64)>,
    pub section: Option<(String, i64)>,
    pub species: Option<(String, i64)>,
}

impl FlatClassification {
    /// The fixed rank order the Classification Encoder synthesizes a path
    /// from when no taxon-tree path is available (spec §4.5).
    pub fn ordered(&self) -> Vec<(&'static str, &(String, i64))> {
        let slots: [(&'static str, &Option<(String, i64)>); 15] = [
            ("kingdom", &self.kingdom),
            ("phylum", &self.phylum),
            ("subphylum", &self.subphylum),
            ("class", &self.class),
            ("order", &self.order),
            ("suborder", &self.suborder),
            ("superfamily", &self.superfamily),
            ("family", &self.family),
            ("subfamily", &self.subfamily),
            ("tribe", &self.tribe),
            ("subtribe", &self.subtribe),
            ("genus", &self.genus),
            ("subgenus", &self.subgenus),
            ("section", &self.section),
            ("species", &self.species),
        ];

        slots
            .into_iter()
            .filter_map(|(rank, value)| value.as_ref().map(|v| (rank, v)))
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct TaxonRow {
    pub id: i64,
    pub name_id: i64,
    pub parent_id: Option<i64>,
    pub status_id: Option<i64>,
    pub flat: FlatClassification,
}

#[derive(Debug, Clone)]
pub struct SynonymRow {
    pub id: i64,
    pub name_id: i64,
    pub taxon_id: i64,
    pub status_id: Option<i64>,
}

/// One row of `taxon JOIN name ON taxon.name_id = name.id` (spec §4.4), the
/// raw record the Hierarchy Builder's worker pool consumes.
#[derive(Debug, Clone)]
pub struct TaxonWithNameRow {
    pub id: i64,
    pub parent_id: Option<i64>,
    pub status_id: Option<i64>,
    pub scientific_name: String,
    pub rank_id: Option<i64>,
    pub code_id: Option<i16>,
    pub flat: FlatClassification,
}

/// The same join, scoped to `synonym` instead of `taxon` -- the Index
/// Writer's synonym pass (spec §4.6 item 2) needs the synonym's own name
/// text alongside the accepted taxon it points at.
#[derive(Debug, Clone)]
pub struct SynonymWithNameRow {
    pub id: i64,
    pub taxon_id: i64,
    pub status_id: Option<i64>,
    pub scientific_name: String,
    pub rank_id: Option<i64>,
    pub code_id: Option<i16>,
}

#[derive(Debug, Clone)]
pub struct VernacularRow {
    pub taxon_id: i64,
    pub name: String,
    pub language: Option<String>,
    pub area: Option<String>,
    pub locality: Option<String>,
    pub country: Option<String>,
}

impl SfgaArchive {
    pub fn open(path: &std::path::Path) -> Result<SfgaArchive, Error> {
        let conn = Connection::open_with_flags(path, rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        Ok(SfgaArchive { conn })
    }

    fn table_exists(&self, name: &str) -> Result<bool, Error> {
        let exists: Option<String> = self
            .conn
            .query_row(
                "select name from sqlite_master where type = 'table' and name = ?1",
                [name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(exists.is_some())
    }

    fn column_exists(&self, table: &str, column: &str) -> Result<bool, Error> {
        let mut stmt = self.conn.prepare(&format!("pragma table_info(\"{table}\")"))?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let name: String = row.get(1)?;
            if name == column {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Reads the schema version advertised by the archive's `metadata`
    /// table, if any (spec §4.2 step 4).
    pub fn schema_version(&self) -> Result<Option<u32>, Error> {
        if !self.table_exists("metadata")? {
            return Ok(None);
        }
        if !self.column_exists("metadata", "version")? {
            return Ok(None);
        }

        let version: Option<String> = self
            .conn
            .query_row("select version from metadata limit 1", [], |row| row.get(0))
            .optional()?;

        Ok(version.and_then(|v| v.trim_start_matches('v').parse::<u32>().ok()))
    }

    pub fn metadata(&self) -> Result<Option<MetadataRow>, Error> {
        if !self.table_exists("metadata")? {
            return Ok(None);
        }

        let row = self
            .conn
            .query_row("select title, description, doi, version, release_date from metadata limit 1", [], |row| {
                Ok(MetadataRow {
                    title: row.get(0)?,
                    description: row.get(1)?,
                    doi: row.get(2)?,
                    version: row.get(3)?,
                    release_date: row.get(4)?,
                })
            })
            .optional()?;

        Ok(row)
    }

    /// Streams `name` rows, invoking `visit` for each. Preferring
    /// `gn__scientific_name_string` when present, falling back to
    /// `col__scientific_name` (spec §4.3) is the caller's job -- this just
    /// exposes both columns.
    pub fn for_each_name<F>(&self, mut visit: F) -> Result<(), Error>
    where
        F: FnMut(NameRow) -> Result<(), Error>,
    {
        if !self.table_exists("name")? {
            return Ok(());
        }

        let has_gn_column = self.column_exists("name", "gn__scientific_name_string")?;
        let select = if has_gn_column {
            "select id, col__scientific_name, gn__scientific_name_string, rank_id, code_id from name"
        }
        else {
            "select id, col__scientific_name, null, rank_id, code_id from name"
        };

        let mut stmt = self.conn.prepare(select)?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            visit(NameRow {
                id: row.get(0)?,
                scientific_name: row.get(1)?,
                gn_scientific_name_string: row.get(2)?,
                rank_id: row.get(3)?,
                code_id: row.get(4)?,
            })?;
        }

        Ok(())
    }

    pub fn has_taxon_table(&self) -> Result<bool, Error> {
        self.table_exists("taxon")
    }

    pub fn for_each_taxon<F>(&self, mut visit: F) -> Result<(), Error>
    where
        F: FnMut(TaxonRow) -> Result<(), Error>,
    {
        if !self.table_exists("taxon")? {
            return Ok(());
        }

        let flat_columns = Self::flat_rank_columns();
        let has_flat = self.has_flat_columns(&flat_columns);

        let mut stmt = self.conn.prepare("select id, name_id, parent_id, status_id from taxon")?;
        let mut rows = stmt.query([])?;

        while let Some(row) = rows.next()? {
            let id: i64 = row.get(0)?;
            let flat = if has_flat {
                self.flat_classification_for_taxon(id, &flat_columns)?
            }
            else {
                FlatClassification::default()
            };

            visit(TaxonRow {
                id,
                name_id: row.get(1)?,
                parent_id: row.get(2)?,
                status_id: row.get(3)?,
                flat,
            })?;
        }

        Ok(())
    }

    fn flat_classification_for_taxon(&self, taxon_id: i64, columns: &[&str]) -> Result<FlatClassification, Error> {
        let select_list = columns
            .iter()
            .map(|c| format!("\"{c}\", \"{c}_id\""))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!("select {select_list} from taxon where id = ?1");

        let mut flat = FlatClassification::default();
        self.conn.query_row(&sql, [taxon_id], |row| {
            let get_pair = |row: &Row, index: usize| -> rusqlite::Result<Option<(String, i64)>> {
                let name: Option<String> = row.get(index)?;
                let id: Option<i64> = row.get(index + 1)?;
                Ok(match (name, id) {
                    (Some(name), Some(id)) => Some((name, id)),
                    _ => None,
                })
            };

            flat.kingdom = get_pair(row, 0)?;
            flat.phylum = get_pair(row, 2)?;
            flat.subphylum = get_pair(row, 4)?;
            flat.class = get_pair(row, 6)?;
            flat.order = get_pair(row, 8)?;
            flat.suborder = get_pair(row, 10)?;
            flat.superfamily = get_pair(row, 12)?;
            flat.family = get_pair(row, 14)?;
            flat.subfamily = get_pair(row, 16)?;
            flat.tribe = get_pair(row, 18)?;
            flat.subtribe = get_pair(row, 20)?;
            flat.genus = get_pair(row, 22)?;
            flat.subgenus = get_pair(row, 24)?;
            flat.section = get_pair(row, 26)?;
            flat.species = get_pair(row, 28)?;

            Ok(())
        })?;

        Ok(flat)
    }

    /// Same join as [`for_each_taxon`], enriched with the referenced
    /// `name` row's text, rank and nomenclatural code -- what the
    /// Hierarchy Builder (spec §4.4) and the Index Writer's accepted-taxa
    /// pass (spec §4.6 item 1) both need without re-querying per row.
    pub fn for_each_taxon_with_name<F>(&self, mut visit: F) -> Result<(), Error>
    where
        F: FnMut(TaxonWithNameRow) -> Result<(), Error>,
    {
        if !self.table_exists("taxon")? || !self.table_exists("name")? {
            return Ok(());
        }

        let flat_columns = Self::flat_rank_columns();
        let has_flat = self.has_flat_columns(&flat_columns);
        let has_gn_column = self.column_exists("name", "gn__scientific_name_string")?;

        let name_expr = if has_gn_column {
            "coalesce(nullif(name.gn__scientific_name_string, ''), name.col__scientific_name)"
        }
        else {
            "name.col__scientific_name"
        };
        let sql = format!(
            "select taxon.id, taxon.parent_id, taxon.status_id, {name_expr}, name.rank_id, name.code_id \
             from taxon join name on taxon.name_id = name.id"
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let id: i64 = row.get(0)?;
            let flat = if has_flat {
                self.flat_classification_for_taxon(id, &flat_columns)?
            }
            else {
                FlatClassification::default()
            };

            visit(TaxonWithNameRow {
                id,
                parent_id: row.get(1)?,
                status_id: row.get(2)?,
                scientific_name: row.get(3)?,
                rank_id: row.get(4)?,
                code_id: row.get(5)?,
                flat,
            })?;
        }

        Ok(())
    }

    /// Same idea as [`for_each_taxon_with_name`] but rooted at `synonym`
    /// (spec §4.6 item 2).
    pub fn for_each_synonym_with_name<F>(&self, mut visit: F) -> Result<(), Error>
    where
        F: FnMut(SynonymWithNameRow) -> Result<(), Error>,
    {
        if !self.table_exists("synonym")? || !self.table_exists("name")? {
            return Ok(());
        }

        let has_gn_column = self.column_exists("name", "gn__scientific_name_string")?;
        let name_expr = if has_gn_column {
            "coalesce(nullif(name.gn__scientific_name_string, ''), name.col__scientific_name)"
        }
        else {
            "name.col__scientific_name"
        };
        let sql = format!(
            "select synonym.id, synonym.taxon_id, synonym.status_id, {name_expr}, name.rank_id, name.code_id \
             from synonym join name on synonym.name_id = name.id"
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            visit(SynonymWithNameRow {
                id: row.get(0)?,
                taxon_id: row.get(1)?,
                status_id: row.get(2)?,
                scientific_name: row.get(3)?,
                rank_id: row.get(4)?,
                code_id: row.get(5)?,
            })?;
        }

        Ok(())
    }

    /// The flat classification for a single taxon id, public so the Index
    /// Writer's synonym pass can look up the *accepted* taxon's flat
    /// columns (breadcrumbs are rooted there, not at the synonym row).
    pub fn flat_classification(&self, taxon_id: i64) -> Result<FlatClassification, Error> {
        let flat_columns = Self::flat_rank_columns();
        if !self.has_flat_columns(&flat_columns) {
            return Ok(FlatClassification::default());
        }
        self.flat_classification_for_taxon(taxon_id, &flat_columns)
    }

    fn flat_rank_columns() -> [&'static str; 15] {
        [
            "kingdom",
            "phylum",
            "subphylum",
            "class",
            "order",
            "suborder",
            "superfamily",
            "family",
            "subfamily",
            "tribe",
            "subtribe",
            "genus",
            "subgenus",
            "section",
            "species",
        ]
    }

    fn has_flat_columns(&self, columns: &[&str]) -> bool {
        columns.iter().all(|c| self.column_exists("taxon", c).unwrap_or(false))
            && columns
                .iter()
                .all(|c| self.column_exists("taxon", &format!("{c}_id")).unwrap_or(false))
    }

    pub fn for_each_synonym<F>(&self, mut visit: F) -> Result<(), Error>
    where
        F: FnMut(SynonymRow) -> Result<(), Error>,
    {
        if !self.table_exists("synonym")? {
            return Ok(());
        }

        let mut stmt = self.conn.prepare("select id, name_id, taxon_id, status_id from synonym")?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            visit(SynonymRow {
                id: row.get(0)?,
                name_id: row.get(1)?,
                taxon_id: row.get(2)?,
                status_id: row.get(3)?,
            })?;
        }

        Ok(())
    }

    pub fn for_each_vernacular<F>(&self, mut visit: F) -> Result<(), Error>
    where
        F: FnMut(VernacularRow) -> Result<(), Error>,
    {
        if !self.table_exists("vernacular")? {
            return Ok(());
        }

        let has_locality = self.column_exists("vernacular", "locality")?;
        let select = if has_locality {
            "select taxon_id, name, language, area, locality, country from vernacular"
        }
        else {
            "select taxon_id, name, language, area, null, country from vernacular"
        };

        let mut stmt = self.conn.prepare(select)?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            visit(VernacularRow {
                taxon_id: row.get(0)?,
                name: row.get(1)?,
                language: row.get(2)?,
                area: row.get(3)?,
                locality: row.get(4)?,
                country: row.get(5)?,
            })?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "create table metadata (title text, description text, doi text, version text, release_date text);
             insert into metadata values ('Ruhoff 1980', 'desc', null, 'v1', '1980-01-01');

             create table name (id integer primary key, col__scientific_name text, rank_id integer, code_id integer);
             insert into name (id, col__scientific_name, rank_id, code_id) values (1, 'Plantago major L.', 1, 1);
             insert into name (id, col__scientific_name, rank_id, code_id) values (2, 'Plantago halophila', 1, 1);

             create table taxon (id integer primary key, name_id integer, parent_id integer, status_id integer);
             insert into taxon values (1, 1, null, 1);

             create table synonym (id integer primary key, name_id integer, taxon_id integer, status_id integer);
             insert into synonym values (1, 2, 1, 2);

             create table vernacular (taxon_id integer, name text, language text, area text, country text);
             insert into vernacular values (1, 'Common plantain', 'eng', 'Europe', 'GB');
             insert into vernacular values (1, 'Common plantain', 'fra', 'Europe', 'FR');",
        )
        .unwrap();
        conn
    }

    #[test]
    fn reads_metadata() {
        let archive = SfgaArchive { conn: fixture() };
        let meta = archive.metadata().unwrap().unwrap();
        assert_eq!(meta.title.as_deref(), Some("Ruhoff 1980"));
        assert_eq!(meta.version.as_deref(), Some("v1"));
    }

    #[test]
    fn falls_back_to_col_scientific_name_without_gn_column() {
        let archive = SfgaArchive { conn: fixture() };
        let mut names = Vec::new();
        archive
            .for_each_name(|row| {
                names.push(row);
                Ok(())
            })
            .unwrap();
        assert_eq!(names.len(), 2);
        assert!(names[0].gn_scientific_name_string.is_none());
    }

    #[test]
    fn reads_taxa_and_synonyms() {
        let archive = SfgaArchive { conn: fixture() };
        let mut taxa = Vec::new();
        archive
            .for_each_taxon(|row| {
                taxa.push(row);
                Ok(())
            })
            .unwrap();
        assert_eq!(taxa.len(), 1);

        let mut synonyms = Vec::new();
        archive
            .for_each_synonym(|row| {
                synonyms.push(row);
                Ok(())
            })
            .unwrap();
        assert_eq!(synonyms.len(), 1);
        assert_eq!(synonyms[0].taxon_id, 1);
    }

    #[test]
    fn vernacular_rows_are_not_deduped_at_read_time() {
        let archive = SfgaArchive { conn: fixture() };
        let mut rows = Vec::new();
        archive
            .for_each_vernacular(|row| {
                rows.push(row);
                Ok(())
            })
            .unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn taxon_with_name_join_carries_the_joined_name_text() {
        let archive = SfgaArchive { conn: fixture() };
        let mut rows = Vec::new();
        archive
            .for_each_taxon_with_name(|row| {
                rows.push(row);
                Ok(())
            })
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].scientific_name, "Plantago major L.");
    }

    #[test]
    fn synonym_with_name_join_carries_the_accepted_taxon_id() {
        let archive = SfgaArchive { conn: fixture() };
        let mut rows = Vec::new();
        archive
            .for_each_synonym_with_name(|row| {
                rows.push(row);
                Ok(())
            })
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].taxon_id, 1);
        assert_eq!(rows[0].scientific_name, "Plantago halophila");
    }

    #[test]
    fn missing_tables_are_treated_as_empty() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("create table metadata (title text, description text, doi text, version text, release_date text);")
            .unwrap();
        let archive = SfgaArchive { conn };

        let mut count = 0;
        archive.for_each_name(|_| { count += 1; Ok(()) }).unwrap();
        assert_eq!(count, 0);

        let mut synonym_count = 0;
        archive.for_each_synonym(|_| { synonym_count += 1; Ok(()) }).unwrap();
        assert_eq!(synonym_count, 0);
    }
}

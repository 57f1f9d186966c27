pub mod models;
pub mod schema;

use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};
use diesel::sql_query;
use diesel::sql_types::{Int2, Nullable, Text, Uuid as SqlUuid};
use diesel::upsert::excluded;
use uuid::Uuid;

use crate::cancel::CancellationToken;
use crate::config::DatabaseConfig;
use crate::errors::{ConnectionError, Error, SchemaError};

pub type PgPool = Pool<ConnectionManager<PgConnection>>;
pub type PgPooledConnection = PooledConnection<ConnectionManager<PgConnection>>;

/// Text columns that must carry byte-wise ("C") collation so that
/// lexicographic order and `=`-semantics are deterministic and
/// locale-independent (spec §3 invariant 7, design note "Collation
/// discipline").
pub const COLLATION_COLUMNS: &[(&str, &str)] = &[
    ("name_strings", "name"),
    ("canonicals", "name"),
    ("canonical_fulls", "name"),
    ("canonical_stems", "name"),
    ("vernacular_strings", "name"),
    ("words", "normalized"),
];

/// The DB Operator (spec §4.1). Owns the connection pool and every SQL
/// entrypoint the rest of the pipeline uses: nothing in this crate opens a
/// `PgConnection` directly.
pub struct Operator {
    pool: PgPool,
}

#[derive(QueryableByName, Debug)]
struct TableName {
    #[diesel(sql_type = Text)]
    table_name: String,
}

/// One `name_strings` row as seen by the Optimizer's reparse step, with the
/// best nomenclatural-code hint available from any of its
/// `name_string_indices` rows (spec §4.10 item 1).
#[derive(QueryableByName, Debug, Clone)]
pub struct NameForReparse {
    #[diesel(sql_type = SqlUuid)]
    pub id: Uuid,
    #[diesel(sql_type = Text)]
    pub name: String,
    #[diesel(sql_type = Nullable<Int2>)]
    pub code_id: Option<i16>,
}

/// One name string with a canonical form, as seen by the word-index step
/// (spec §4.10 item 4). Names with no canonical (unparsable) are excluded
/// by the join.
#[derive(QueryableByName, Debug, Clone)]
pub struct NameWithCanonical {
    #[diesel(sql_type = SqlUuid)]
    pub id: Uuid,
    #[diesel(sql_type = SqlUuid)]
    pub canonical_id: Uuid,
    #[diesel(sql_type = Text)]
    pub canonical: String,
}

impl Operator {
    /// Builds a pooled connection and pings it once. Fails with a typed
    /// `ConnectionError` rather than letting an opaque pool error escape
    /// (spec §4.1 contract).
    pub fn connect(config: &DatabaseConfig) -> Result<Operator, Error> {
        let manager = ConnectionManager::<PgConnection>::new(config.connection_url());
        let pool = Pool::builder()
            .max_size(config.max_connections)
            .min_idle(Some(config.min_connections))
            .idle_timeout(Some(std::time::Duration::from_secs(config.max_conn_idle_minutes * 60)))
            .max_lifetime(Some(std::time::Duration::from_secs(config.max_conn_lifetime_minutes * 60)))
            .build(manager)
            .map_err(|err| ConnectionError::PoolBuild(err.to_string()))?;

        let mut conn = pool.get().map_err(|err| ConnectionError::PoolBuild(err.to_string()))?;
        conn.batch_execute("select 1")
            .map_err(|err| ConnectionError::PingFailed(err.to_string()))?;

        Ok(Operator { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn connection(&self) -> Result<PgPooledConnection, Error> {
        Ok(self.pool.get()?)
    }

    /// Runs a cheap statement; used for DDL-ish one-off operations
    /// (`SetCollation`, `DropAllTables`) where a typed query builder adds no
    /// value.
    pub fn exec(&self, sql: &str) -> Result<(), Error> {
        let mut conn = self.connection()?;
        conn.batch_execute(sql)?;
        Ok(())
    }

    pub fn list_tables(&self) -> Result<Vec<String>, Error> {
        let mut conn = self.connection()?;
        let rows = sql_query(
            "select table_name from information_schema.tables \
             where table_schema = 'public' and table_type = 'BASE TABLE'",
        )
        .load::<TableName>(&mut conn)?;

        Ok(rows.into_iter().map(|row| row.table_name).collect())
    }

    pub fn has_tables(&self) -> Result<bool, Error> {
        Ok(!self.list_tables()?.is_empty())
    }

    pub fn table_exists(&self, name: &str) -> Result<bool, Error> {
        Ok(self.list_tables()?.iter().any(|table| table == name))
    }

    /// Fails fast if any of the ten core tables (spec §3) are missing --
    /// this is the "Schema absent" fatal error from §7, checked before any
    /// write happens.
    pub fn require_schema(&self) -> Result<(), Error> {
        let existing = self.list_tables()?;
        if existing.is_empty() {
            return Err(SchemaError::Empty.into());
        }

        const REQUIRED: &[&str] = &[
            "data_sources",
            "name_strings",
            "canonicals",
            "canonical_fulls",
            "canonical_stems",
            "name_string_indices",
            "vernacular_strings",
            "vernacular_string_indices",
            "words",
            "word_name_strings",
        ];

        for table in REQUIRED {
            if !existing.iter().any(|t| t == table) {
                return Err(SchemaError::TableMissing(table.to_string()).into());
            }
        }

        Ok(())
    }

    /// Discovers every table in the public schema and drops each with
    /// cascade (spec §4.1 contract). Used by the drop-tables path mentioned
    /// in spec §3 "Lifecycles" and tested by §8's drop/recreate scenario.
    pub fn drop_all_tables(&self) -> Result<(), Error> {
        let tables = self.list_tables()?;
        let mut conn = self.connection()?;

        for table in tables {
            let sql = format!("drop table if exists \"{table}\" cascade");
            conn.batch_execute(&sql)?;
        }

        Ok(())
    }

    /// Idempotently rewrites the declared collation of the fixed list of
    /// comparison columns to byte-wise `"C"` (spec §3 invariant 7, §4.1
    /// contract "SetCollation ... is idempotent").
    pub fn set_collation(&self) -> Result<(), Error> {
        let mut conn = self.connection()?;

        for (table, column) in COLLATION_COLUMNS {
            let sql = format!("alter table \"{table}\" alter column \"{column}\" type text collate \"C\"");
            conn.batch_execute(&sql)?;
        }

        Ok(())
    }

    /// Runs `body` inside a transaction, checking `cancel` before commit so
    /// an in-flight batch never outlives a cancellation request (spec §5
    /// "Cancellation and timeouts").
    pub fn transaction<F, T>(&self, cancel: &CancellationToken, body: F) -> Result<T, Error>
    where
        F: FnOnce(&mut PgConnection) -> Result<T, Error>,
    {
        use diesel::Connection;

        let mut conn = self.connection()?;
        cancel.check()?;

        conn.transaction(|conn| -> Result<T, Error> { body(conn) })
    }

    pub fn vacuum_analyze(&self) -> Result<(), Error> {
        // VACUUM cannot run inside a transaction block, so this uses a raw
        // batch_execute on its own connection rather than `transaction`.
        self.exec("vacuum analyze")
    }

    /// Streams `rows` over the binary COPY protocol (spec §4.1 contract).
    /// Used only where duplicates are impossible by construction -- the
    /// per-source index tables (C6/C7) and the optimize-phase word index
    /// (C10), all of which are truncated or delete-by-source'd before this
    /// is called. Name/vernacular string dedup instead goes through a
    /// batched `INSERT ... ON CONFLICT DO NOTHING` (spec §4.3).
    pub fn copy_name_string_indices(&self, rows: &[models::NameStringIndex]) -> Result<usize, Error> {
        let mut conn = self.connection()?;
        let copied = diesel::copy_from(schema::name_string_indices::table)
            .from_insertable(rows)
            .execute(&mut conn)?;
        Ok(copied)
    }

    pub fn copy_vernacular_string_indices(&self, rows: &[models::VernacularStringIndex]) -> Result<usize, Error> {
        let mut conn = self.connection()?;
        let copied = diesel::copy_from(schema::vernacular_string_indices::table)
            .from_insertable(rows)
            .execute(&mut conn)?;
        Ok(copied)
    }

    pub fn copy_words(&self, rows: &[models::Word]) -> Result<usize, Error> {
        let mut conn = self.connection()?;
        let copied = diesel::copy_from(schema::words::table).from_insertable(rows).execute(&mut conn)?;
        Ok(copied)
    }

    pub fn copy_word_name_strings(&self, rows: &[models::WordNameString]) -> Result<usize, Error> {
        let mut conn = self.connection()?;
        let copied = diesel::copy_from(schema::word_name_strings::table)
            .from_insertable(rows)
            .execute(&mut conn)?;
        Ok(copied)
    }

    pub fn delete_name_string_indices_for_source(&self, source_id: i32) -> Result<usize, Error> {
        use schema::name_string_indices::dsl::*;

        let mut conn = self.connection()?;
        let deleted = diesel::delete(name_string_indices.filter(data_source_id.eq(source_id))).execute(&mut conn)?;
        Ok(deleted)
    }

    pub fn delete_vernacular_string_indices_for_source(&self, source_id: i32) -> Result<usize, Error> {
        use schema::vernacular_string_indices::dsl::*;

        let mut conn = self.connection()?;
        let deleted =
            diesel::delete(vernacular_string_indices.filter(data_source_id.eq(source_id))).execute(&mut conn)?;
        Ok(deleted)
    }

    pub fn count_name_string_indices_for_source(&self, source_id: i32) -> Result<i64, Error> {
        use schema::name_string_indices::dsl::*;

        let mut conn = self.connection()?;
        let count = name_string_indices
            .filter(data_source_id.eq(source_id))
            .count()
            .get_result(&mut conn)?;
        Ok(count)
    }

    pub fn count_vernacular_string_indices_for_source(&self, source_id: i32) -> Result<i64, Error> {
        use schema::vernacular_string_indices::dsl::*;

        let mut conn = self.connection()?;
        let count = vernacular_string_indices
            .filter(data_source_id.eq(source_id))
            .count()
            .get_result(&mut conn)?;
        Ok(count)
    }

    /// Every `name_strings` row paired with the first non-null
    /// `code_id` among its `name_string_indices` rows, one row per name
    /// string (spec §4.10 item 1). A name string referenced by indices with
    /// conflicting codes just takes whichever non-null one sorts first --
    /// the parser only uses it as a disambiguation hint, not ground truth.
    pub fn names_for_reparse(&self) -> Result<Vec<NameForReparse>, Error> {
        let mut conn = self.connection()?;
        let rows = sql_query(
            "select distinct on (ns.id) ns.id as id, ns.name as name, nsi.code_id as code_id \
             from name_strings ns \
             left join name_string_indices nsi on nsi.name_string_id = ns.id \
             order by ns.id, nsi.code_id nulls last",
        )
        .load::<NameForReparse>(&mut conn)?;
        Ok(rows)
    }

    /// Bulk inserts-or-updates `name_strings` rows whose parsed attributes
    /// have just been recomputed. Uses `INSERT ... ON CONFLICT (id) DO
    /// UPDATE SET col = excluded.col` rather than a per-row `UPDATE`, so one
    /// batch becomes one statement (spec §4.10 item 1, same "batched over
    /// per-row" idiom as the rest of this module's writes).
    pub fn upsert_reparsed_name_strings(&self, rows: &[models::NameString]) -> Result<usize, Error> {
        use schema::name_strings::dsl::*;

        if rows.is_empty() {
            return Ok(0);
        }

        let mut conn = self.connection()?;
        let updated = diesel::insert_into(schema::name_strings::table)
            .values(rows)
            .on_conflict(id)
            .do_update()
            .set((
                year.eq(excluded(year)),
                cardinality.eq(excluded(cardinality)),
                virus.eq(excluded(virus)),
                bacteria.eq(excluded(bacteria)),
                surrogate.eq(excluded(surrogate)),
                parse_quality.eq(excluded(parse_quality)),
                canonical_id.eq(excluded(canonical_id)),
                canonical_full_id.eq(excluded(canonical_full_id)),
                canonical_stem_id.eq(excluded(canonical_stem_id)),
            ))
            .execute(&mut conn)?;
        Ok(updated)
    }

    pub fn insert_canonicals(&self, rows: &[models::Canonical]) -> Result<(), Error> {
        use schema::canonicals::dsl::id;

        if rows.is_empty() {
            return Ok(());
        }
        let mut conn = self.connection()?;
        diesel::insert_into(schema::canonicals::table)
            .values(rows)
            .on_conflict(id)
            .do_nothing()
            .execute(&mut conn)?;
        Ok(())
    }

    pub fn insert_canonical_fulls(&self, rows: &[models::CanonicalFull]) -> Result<(), Error> {
        use schema::canonical_fulls::dsl::id;

        if rows.is_empty() {
            return Ok(());
        }
        let mut conn = self.connection()?;
        diesel::insert_into(schema::canonical_fulls::table)
            .values(rows)
            .on_conflict(id)
            .do_nothing()
            .execute(&mut conn)?;
        Ok(())
    }

    pub fn insert_canonical_stems(&self, rows: &[models::CanonicalStem]) -> Result<(), Error> {
        use schema::canonical_stems::dsl::id;

        if rows.is_empty() {
            return Ok(());
        }
        let mut conn = self.connection()?;
        diesel::insert_into(schema::canonical_stems::table)
            .values(rows)
            .on_conflict(id)
            .do_nothing()
            .execute(&mut conn)?;
        Ok(())
    }

    /// Deletes `canonicals`/`canonical_fulls`/`canonical_stems` rows no
    /// `name_strings` row references any more, the reparse step's half of
    /// spec §3 "Lifecycles": canonicals are rebuilt from scratch by
    /// optimize, any prior content discarded. A literal `TRUNCATE` before
    /// reparsing would leave `name_strings.canonical_id` dangling against a
    /// live foreign key for the window between the truncate and the
    /// reparse's own upsert, so this instead prunes by reference after
    /// every name string has been re-pointed at its freshly computed
    /// canonical -- same "delete what nothing points at" idiom as
    /// `remove_orphan_name_strings`, applied one layer up.
    pub fn remove_orphan_canonicals(&self) -> Result<usize, Error> {
        let mut conn = self.connection()?;
        let deleted = sql_query(
            "delete from canonicals where not exists \
             (select 1 from name_strings where name_strings.canonical_id = canonicals.id)",
        )
        .execute(&mut conn)?;

        let deleted = deleted
            + sql_query(
                "delete from canonical_fulls where not exists \
                 (select 1 from name_strings where name_strings.canonical_full_id = canonical_fulls.id)",
            )
            .execute(&mut conn)?;

        let deleted = deleted
            + sql_query(
                "delete from canonical_stems where not exists \
                 (select 1 from name_strings where name_strings.canonical_stem_id = canonical_stems.id)",
            )
            .execute(&mut conn)?;

        Ok(deleted)
    }

    /// Lower-cases every `vernacular_string_indices.lang_code` in place
    /// (spec §4.10 item 2). Sequential: a single `UPDATE` touches every row
    /// at once, there is nothing to parallelize.
    pub fn normalize_vernacular_lang_codes(&self) -> Result<(), Error> {
        self.exec("update vernacular_string_indices set lang_code = lower(lang_code) where lang_code is not null")
    }

    /// Deletes `name_strings` rows no `name_string_indices` row references
    /// any more (spec §4.10 item 3) -- the cleanup half of the "orphan
    /// removal" step, run after a populate that may have replaced a
    /// source's indices with a smaller set.
    pub fn remove_orphan_name_strings(&self) -> Result<usize, Error> {
        let mut conn = self.connection()?;
        let deleted = sql_query(
            "delete from name_strings where not exists \
             (select 1 from name_string_indices where name_string_indices.name_string_id = name_strings.id)",
        )
        .execute(&mut conn)?;
        Ok(deleted)
    }

    /// Every `name_strings` row that has a canonical form, paired with that
    /// canonical's text (spec §4.10 item 4's tokenization input).
    pub fn names_with_canonical(&self) -> Result<Vec<NameWithCanonical>, Error> {
        let mut conn = self.connection()?;
        let rows = sql_query(
            "select ns.id as id, ns.canonical_id as canonical_id, c.name as canonical \
             from name_strings ns \
             join canonicals c on c.id = ns.canonical_id",
        )
        .load::<NameWithCanonical>(&mut conn)?;
        Ok(rows)
    }

    /// Empties the word index so the Optimizer's word-index step can
    /// rebuild it from scratch (spec §4.10 item 4) -- cheaper than trying to
    /// diff an old index against a new one.
    pub fn truncate_word_tables(&self) -> Result<(), Error> {
        self.exec("truncate table word_name_strings, words cascade")
    }

    /// Drops and recreates the verification materialized view plus its
    /// supporting indexes (spec §4.10 item 5, §3 "Verification view"). Run
    /// last in the optimize sequence so the view reflects every prior step.
    pub fn rebuild_verification_view(&self) -> Result<(), Error> {
        self.exec(
            "drop materialized view if exists verification;
             create materialized view verification as
             select
                 ns.id as name_string_id,
                 ns.name as name,
                 ns.year as year,
                 ns.cardinality as cardinality,
                 ns.canonical_id as canonical_id,
                 c.name as canonical,
                 cf.name as canonical_full,
                 cs.name as canonical_stem,
                 nsi.data_source_id as data_source_id,
                 nsi.record_id as record_id,
                 nsi.taxonomic_status as taxonomic_status,
                 nsi.classification as classification,
                 ds.title as data_source_title
             from name_strings ns
             join name_string_indices nsi on nsi.name_string_id = ns.id
             join data_sources ds on ds.id = nsi.data_source_id
             left join canonicals c on c.id = ns.canonical_id
             left join canonical_fulls cf on cf.id = ns.canonical_full_id
             left join canonical_stems cs on cs.id = ns.canonical_stem_id;
             create index on verification (canonical_id);
             create index on verification (name_string_id);
             create index on verification (year);",
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collation_columns_cover_every_comparison_surface() {
        let tables: Vec<&str> = COLLATION_COLUMNS.iter().map(|(table, _)| *table).collect();
        assert!(tables.contains(&"name_strings"));
        assert!(tables.contains(&"words"));
        assert_eq!(COLLATION_COLUMNS.len(), 6);
    }
}

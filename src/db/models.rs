use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use super::schema::*;

#[derive(Debug, Clone, Queryable, Insertable, AsChangeset, Selectable)]
#[diesel(table_name = data_sources)]
pub struct DataSource {
    pub id: i32,
    pub title: Option<String>,
    pub title_short: String,
    pub website_url: Option<String>,
    pub doi: Option<String>,
    pub description: Option<String>,
    pub is_curated: bool,
    pub is_auto_curated: bool,
    pub has_taxon_data: bool,
    pub record_count: i32,
    pub vern_record_count: i32,
    pub release_version: Option<String>,
    pub release_date: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Insertable, Selectable)]
#[diesel(table_name = name_strings)]
pub struct NameString {
    pub id: Uuid,
    pub name: String,
    pub year: Option<i16>,
    pub cardinality: Option<i16>,
    pub virus: bool,
    pub bacteria: bool,
    pub surrogate: bool,
    pub parse_quality: Option<i16>,
    pub canonical_id: Option<Uuid>,
    pub canonical_full_id: Option<Uuid>,
    pub canonical_stem_id: Option<Uuid>,
}

impl NameString {
    /// A freshly streamed name string before the optimize phase has had a
    /// chance to parse it -- invariant: parse-quality columns stay null
    /// until then (spec §4.3).
    pub fn unparsed(id: Uuid, name: String) -> NameString {
        NameString {
            id,
            name,
            year: None,
            cardinality: None,
            virus: false,
            bacteria: false,
            surrogate: false,
            parse_quality: None,
            canonical_id: None,
            canonical_full_id: None,
            canonical_stem_id: None,
        }
    }
}

#[derive(Debug, Clone, Queryable, Insertable, Selectable)]
#[diesel(table_name = canonicals)]
pub struct Canonical {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Queryable, Insertable, Selectable)]
#[diesel(table_name = canonical_fulls)]
pub struct CanonicalFull {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Queryable, Insertable, Selectable)]
#[diesel(table_name = canonical_stems)]
pub struct CanonicalStem {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Queryable, Insertable, Selectable)]
#[diesel(table_name = name_string_indices)]
pub struct NameStringIndex {
    pub data_source_id: i32,
    pub record_id: String,
    pub name_string_id: Uuid,
    pub outlink_id: Option<String>,
    pub local_id: Option<String>,
    pub global_id: Option<String>,
    pub code_id: Option<i16>,
    pub rank: Option<String>,
    pub taxonomic_status: String,
    pub accepted_record_id: Option<String>,
    pub classification: String,
    pub classification_ranks: String,
    pub classification_ids: String,
}

#[derive(Debug, Clone, Queryable, Insertable, Selectable)]
#[diesel(table_name = vernacular_strings)]
pub struct VernacularString {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Queryable, Insertable, Selectable)]
#[diesel(table_name = vernacular_string_indices)]
pub struct VernacularStringIndex {
    pub data_source_id: i32,
    pub record_id: String,
    pub language: String,
    pub vernacular_string_id: Uuid,
    pub lang_code: Option<String>,
    pub locality: Option<String>,
    pub country_code: Option<String>,
    pub is_preferred: bool,
}

#[derive(Debug, Clone, Queryable, Insertable, Selectable)]
#[diesel(table_name = words)]
pub struct Word {
    pub id: Uuid,
    pub normalized: String,
}

#[derive(Debug, Clone, Queryable, Insertable, Selectable)]
#[diesel(table_name = word_name_strings)]
pub struct WordNameString {
    pub word_id: Uuid,
    pub name_string_id: Uuid,
    pub canonical_id: Uuid,
}

//! Hand-maintained mirror of the schema created by the excluded
//! object-relational-mapping migration step (spec §1). These `table!`
//! definitions describe the ten core tables from spec §3; they do not
//! create them -- `diesel migration run` (or whatever the excluded
//! collaborator uses) is assumed to have already run.

diesel::table! {
    data_sources (id) {
        id -> Int4,
        title -> Nullable<Text>,
        title_short -> Text,
        website_url -> Nullable<Text>,
        doi -> Nullable<Text>,
        description -> Nullable<Text>,
        is_curated -> Bool,
        is_auto_curated -> Bool,
        has_taxon_data -> Bool,
        record_count -> Int4,
        vern_record_count -> Int4,
        release_version -> Nullable<Text>,
        release_date -> Nullable<Text>,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    name_strings (id) {
        id -> Uuid,
        name -> Text,
        year -> Nullable<Int2>,
        cardinality -> Nullable<Int2>,
        virus -> Bool,
        bacteria -> Bool,
        surrogate -> Bool,
        parse_quality -> Nullable<Int2>,
        canonical_id -> Nullable<Uuid>,
        canonical_full_id -> Nullable<Uuid>,
        canonical_stem_id -> Nullable<Uuid>,
    }
}

diesel::table! {
    canonicals (id) {
        id -> Uuid,
        name -> Text,
    }
}

diesel::table! {
    canonical_fulls (id) {
        id -> Uuid,
        name -> Text,
    }
}

diesel::table! {
    canonical_stems (id) {
        id -> Uuid,
        name -> Text,
    }
}

diesel::table! {
    name_string_indices (data_source_id, record_id) {
        data_source_id -> Int4,
        record_id -> Text,
        name_string_id -> Uuid,
        outlink_id -> Nullable<Text>,
        local_id -> Nullable<Text>,
        global_id -> Nullable<Text>,
        code_id -> Nullable<Int2>,
        rank -> Nullable<Text>,
        taxonomic_status -> Text,
        accepted_record_id -> Nullable<Text>,
        classification -> Text,
        classification_ranks -> Text,
        classification_ids -> Text,
    }
}

diesel::table! {
    vernacular_strings (id) {
        id -> Uuid,
        name -> Text,
    }
}

diesel::table! {
    vernacular_string_indices (data_source_id, record_id, language) {
        data_source_id -> Int4,
        record_id -> Text,
        language -> Text,
        vernacular_string_id -> Uuid,
        lang_code -> Nullable<Text>,
        locality -> Nullable<Text>,
        country_code -> Nullable<Text>,
        is_preferred -> Bool,
    }
}

diesel::table! {
    words (id) {
        id -> Uuid,
        normalized -> Text,
    }
}

diesel::table! {
    word_name_strings (word_id, name_string_id) {
        word_id -> Uuid,
        name_string_id -> Uuid,
        canonical_id -> Uuid,
    }
}

diesel::joinable!(name_strings -> canonicals (canonical_id));
diesel::joinable!(name_string_indices -> name_strings (name_string_id));
diesel::joinable!(name_string_indices -> data_sources (data_source_id));
diesel::joinable!(vernacular_string_indices -> vernacular_strings (vernacular_string_id));
diesel::joinable!(vernacular_string_indices -> data_sources (data_source_id));
diesel::joinable!(word_name_strings -> words (word_id));
diesel::joinable!(word_name_strings -> name_strings (name_string_id));

diesel::allow_tables_to_appear_in_same_query!(
    data_sources,
    name_strings,
    canonicals,
    canonical_fulls,
    canonical_stems,
    name_string_indices,
    vernacular_strings,
    vernacular_string_indices,
    words,
    word_name_strings,
);

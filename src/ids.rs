use uuid::Uuid;

/// Fixed namespaces for the content-addressed ids described in spec §3
/// invariant 3 and the "Deterministic ids" design note. Using UUIDv5 over a
/// constant namespace makes `NameString`/`VernacularString` ids a pure
/// function of their text: no sequence, no coordination between sources.
const NAME_STRING_NAMESPACE: Uuid = Uuid::from_bytes([
    0x8c, 0x1f, 0x2b, 0x5e, 0x9a, 0x34, 0x5d, 0x1c, 0xae, 0x0b, 0x6f, 0x2d, 0x3e, 0x91, 0x4a, 0x77,
]);

const VERNACULAR_STRING_NAMESPACE: Uuid = Uuid::from_bytes([
    0x4b, 0x6e, 0x0d, 0x2a, 0x7c, 0x18, 0x4f, 0x3d, 0x92, 0xaf, 0x1e, 0x5b, 0x8d, 0x6c, 0x23, 0xf0,
]);

const CANONICAL_NAMESPACE: Uuid = Uuid::from_bytes([
    0x1a, 0x2b, 0x3c, 0x4d, 0x5e, 0x6f, 0x70, 0x81, 0x92, 0xa3, 0xb4, 0xc5, 0xd6, 0xe7, 0xf8, 0x09,
]);

const CANONICAL_FULL_NAMESPACE: Uuid = Uuid::from_bytes([
    0x2b, 0x3c, 0x4d, 0x5e, 0x6f, 0x70, 0x81, 0x92, 0xa3, 0xb4, 0xc5, 0xd6, 0xe7, 0xf8, 0x09, 0x1a,
]);

const CANONICAL_STEM_NAMESPACE: Uuid = Uuid::from_bytes([
    0x3c, 0x4d, 0x5e, 0x6f, 0x70, 0x81, 0x92, 0xa3, 0xb4, 0xc5, 0xd6, 0xe7, 0xf8, 0x09, 0x1a, 0x2b,
]);

const WORD_NAMESPACE: Uuid = Uuid::from_bytes([
    0x4d, 0x5e, 0x6f, 0x70, 0x81, 0x92, 0xa3, 0xb4, 0xc5, 0xd6, 0xe7, 0xf8, 0x09, 0x1a, 0x2b, 0x3c,
]);

pub fn name_string_id(name: &str) -> Uuid {
    Uuid::new_v5(&NAME_STRING_NAMESPACE, name.as_bytes())
}

pub fn vernacular_string_id(name: &str) -> Uuid {
    Uuid::new_v5(&VERNACULAR_STRING_NAMESPACE, name.as_bytes())
}

pub fn canonical_id(name: &str) -> Uuid {
    Uuid::new_v5(&CANONICAL_NAMESPACE, name.as_bytes())
}

pub fn canonical_full_id(name: &str) -> Uuid {
    Uuid::new_v5(&CANONICAL_FULL_NAMESPACE, name.as_bytes())
}

pub fn canonical_stem_id(name: &str) -> Uuid {
    Uuid::new_v5(&CANONICAL_STEM_NAMESPACE, name.as_bytes())
}

pub fn word_id(normalized: &str) -> Uuid {
    Uuid::new_v5(&WORD_NAMESPACE, normalized.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_string_id_is_a_pure_function_of_the_text() {
        let a = name_string_id("Plantago major");
        let b = name_string_id("Plantago major");
        assert_eq!(a, b);
    }

    #[test]
    fn different_text_yields_different_ids() {
        assert_ne!(name_string_id("Plantago major"), name_string_id("Plantago minor"));
    }

    #[test]
    fn name_and_vernacular_namespaces_are_distinct() {
        assert_ne!(name_string_id("Common plantain"), vernacular_string_id("Common plantain"));
    }
}

use regex::Regex;

/// The nomenclatural code used to disambiguate name structure. Spec §4.4
/// notes the Hierarchy Builder always hints "botanical" to avoid
/// misinterpreting names like `Aus (Bus)`; the Optimizer (§4.10) instead
/// hints per-name from `name_string_indices.code_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NomenclaturalCode {
    Botanical,
    Zoological,
    Bacterial,
    Viral,
    Unknown,
}

impl NomenclaturalCode {
    pub fn from_code_id(code_id: Option<i16>) -> NomenclaturalCode {
        match code_id {
            Some(1) => NomenclaturalCode::Botanical,
            Some(2) => NomenclaturalCode::Zoological,
            Some(3) => NomenclaturalCode::Bacterial,
            Some(4) => NomenclaturalCode::Viral,
            _ => NomenclaturalCode::Unknown,
        }
    }
}

/// A parsed name as the capability returns it. Only the fields the rest of
/// the pipeline consumes are modeled (spec §3 NameString "optional parsed
/// attributes").
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedName {
    pub canonical: Option<String>,
    pub canonical_full: Option<String>,
    pub canonical_stem: Option<String>,
    pub authorship: Option<String>,
    pub year: Option<i16>,
    /// Number of name-bearing words in the canonical (1 = uninomial, 2 =
    /// binomial, 3 = trinomial, 0 = unparsable).
    pub cardinality: u8,
    pub quality: u8,
    pub virus: bool,
    pub bacteria: bool,
    pub surrogate: bool,
}

/// The parser is a capability this crate does not own the implementation
/// of -- see spec §1 Non-goals and the "Parser as collaborator" design
/// note. It is abstracted behind a single operation so a production
/// deployment can swap in the real scientific-name parser without touching
/// any caller.
pub trait NameParser: Send + Sync {
    fn parse(&self, name: &str, code: NomenclaturalCode) -> ParsedName;
}

/// A reference implementation good enough to drive canonical-form
/// extraction, cardinality and year detection in tests and in the demo
/// binary. It is deliberately conservative: anything it can't confidently
/// classify is returned with `quality = 0` and `cardinality = 0` rather than
/// guessed.
pub struct RegexNameParser {
    year_re: Regex,
    virus_re: Regex,
    bacteria_re: Regex,
    hybrid_marker_re: Regex,
}

impl Default for RegexNameParser {
    fn default() -> Self {
        RegexNameParser {
            year_re: Regex::new(r"\b(1[5-9]\d{2}|20\d{2})\b").unwrap(),
            virus_re: Regex::new(r"(?i)\bvirus\b|\bviroid\b|\bphage\b").unwrap(),
            bacteria_re: Regex::new(r"(?i)\bbacterium\b|\bbacillus\b|\bcoccus\b").unwrap(),
            hybrid_marker_re: Regex::new(r"[×xX]\s").unwrap(),
        }
    }
}

impl RegexNameParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Strips a trailing authorship + year block, returning the bare
    /// canonical words. This is a heuristic, not a grammar: it looks for the
    /// first word that starts with an uppercase letter (the genus) followed
    /// by as many lowercase words as follow it directly, under the
    /// botanical-subgenus-aware rule from spec §4.4 ("Aus (Bus)" keeps the
    /// parenthesised subgenus instead of dropping it).
    fn canonical_words<'a>(&self, name: &'a str, code: NomenclaturalCode) -> Vec<&'a str> {
        let mut words = Vec::new();

        for (index, word) in name.split_whitespace().enumerate() {
            let stripped = word.trim_matches(|c: char| c == ',' || c == '.');
            if stripped.is_empty() {
                continue;
            }

            let starts_upper = stripped.chars().next().map(|c| c.is_uppercase()).unwrap_or(false);
            let is_parenthesised = stripped.starts_with('(') && stripped.ends_with(')');

            if index == 0 {
                if starts_upper {
                    words.push(stripped);
                    continue;
                }
                else {
                    break;
                }
            }

            if is_parenthesised {
                // Under a botanical code a parenthesised segment after the
                // genus is treated as an infrageneric marker and kept; under
                // other codes it is a subgenus marker and also kept here
                // since we cannot reliably disambiguate without a real
                // parser -- we keep it rather than silently dropping data.
                let _ = code;
                words.push(stripped);
                continue;
            }

            if stripped.chars().next().map(|c| c.is_lowercase()).unwrap_or(false) {
                words.push(stripped);
                continue;
            }

            break;
        }

        words
    }
}

impl NameParser for RegexNameParser {
    fn parse(&self, name: &str, code: NomenclaturalCode) -> ParsedName {
        let name = name.trim();
        if name.is_empty() {
            return ParsedName::default();
        }

        let words = self.canonical_words(name, code);
        if words.is_empty() {
            return ParsedName {
                quality: 0,
                ..ParsedName::default()
            };
        }

        let canonical_full = words.join(" ");
        // the "stem" canonical drops parenthesised infrageneric/subgenus
        // markers and authorship-adjacent punctuation.
        let canonical: String = words
            .iter()
            .filter(|w| !(w.starts_with('(') && w.ends_with(')')))
            .cloned()
            .collect::<Vec<_>>()
            .join(" ");
        let canonical_stem = stem(&canonical);

        let cardinality = words
            .iter()
            .filter(|w| !(w.starts_with('(') && w.ends_with(')')))
            .count()
            .min(3) as u8;

        let year = self
            .year_re
            .find(name)
            .and_then(|m| m.as_str().parse::<i16>().ok());

        let authorship = if name.len() > canonical_full.len() {
            Some(name[canonical_full.len()..].trim().trim_start_matches(',').trim().to_string())
                .filter(|s| !s.is_empty())
        }
        else {
            None
        };

        ParsedName {
            canonical: Some(canonical.clone()),
            canonical_full: Some(canonical_full),
            canonical_stem: Some(canonical_stem),
            authorship,
            year,
            cardinality,
            quality: if cardinality > 0 { 1 } else { 0 },
            virus: self.virus_re.is_match(name),
            bacteria: self.bacteria_re.is_match(name),
            surrogate: self.hybrid_marker_re.is_match(name),
        }
    }
}

/// A minimal, deterministic stemmer: lower-cases and strips a short list of
/// common Latin suffixes one at a time. Not linguistically complete, but
/// stable and good enough to deduplicate near-identical canonical forms the
/// way `canonical_stem` is meant to (spec §3 glossary "Stem").
fn stem(canonical: &str) -> String {
    const SUFFIXES: &[&str] = &["us", "a", "um", "is", "ii", "ae", "orum", "arum"];

    canonical
        .split_whitespace()
        .map(|word| {
            let lower = word.to_lowercase();
            for suffix in SUFFIXES {
                if lower.len() > suffix.len() + 2 && lower.ends_with(suffix) {
                    return lower[..lower.len() - suffix.len()].to_string();
                }
            }
            lower
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_binomial_with_author_and_year() {
        let parser = RegexNameParser::new();
        let parsed = parser.parse("Plantago major L. 1753", NomenclaturalCode::Botanical);
        assert_eq!(parsed.canonical.as_deref(), Some("Plantago major"));
        assert_eq!(parsed.cardinality, 2);
        assert_eq!(parsed.year, Some(1753));
        assert!(parsed.authorship.is_some());
    }

    #[test]
    fn keeps_parenthesised_subgenus_under_botanical_code() {
        let parser = RegexNameParser::new();
        let parsed = parser.parse("Aus (Bus) canus", NomenclaturalCode::Botanical);
        assert_eq!(parsed.canonical_full.as_deref(), Some("Aus (Bus) canus"));
        assert_eq!(parsed.canonical.as_deref(), Some("Aus canus"));
    }

    #[test]
    fn uninomial_has_cardinality_one() {
        let parser = RegexNameParser::new();
        let parsed = parser.parse("Plantaginaceae", NomenclaturalCode::Botanical);
        assert_eq!(parsed.cardinality, 1);
    }

    #[test]
    fn unparsable_input_has_zero_quality() {
        let parser = RegexNameParser::new();
        let parsed = parser.parse("lowercase start", NomenclaturalCode::Botanical);
        assert_eq!(parsed.quality, 0);
        assert_eq!(parsed.cardinality, 0);
    }

    #[test]
    fn detects_virus_names() {
        let parser = RegexNameParser::new();
        let parsed = parser.parse("Tobacco mosaic virus", NomenclaturalCode::Viral);
        assert!(parsed.virus);
    }
}

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use rayon::prelude::*;
use tracing::info;
use uuid::Uuid;

use crate::cancel::CancellationToken;
use crate::db::models::{Canonical, CanonicalFull, CanonicalStem, NameString, Word, WordNameString};
use crate::db::Operator;
use crate::errors::{Error, OptimizeError};
use crate::ids::{canonical_full_id, canonical_id, canonical_stem_id, word_id};
use crate::parser::{NameParser, NomenclaturalCode, ParsedName};
use crate::progress::{ProgressEvent, ProgressReporter};

/// Splits a canonical form into indexable words: whitespace and hyphens are
/// both word boundaries, parenthesised infrageneric/subgenus markers are
/// unwrapped rather than discarded (spec §4.10 item 4, SPEC_FULL §2 "Word
/// tokenization"). Empty segments (from doubled separators) are dropped.
pub fn tokenize(canonical: &str) -> Vec<String> {
    canonical
        .split(|c: char| c.is_whitespace() || c == '-')
        .map(|word| word.trim_matches(|c: char| c == '(' || c == ')'))
        .filter(|word| !word.is_empty())
        .map(|word| word.to_lowercase())
        .collect()
}

/// The Optimizer (spec §4.10). Runs after populate, in a fixed order, and is
/// safe to re-run: every step either truncates-and-rebuilds or upserts by
/// content-derived id.
pub struct Optimizer<'a> {
    operator: &'a Operator,
    parser: &'a dyn NameParser,
    batch_size: usize,
    jobs: usize,
}

impl<'a> Optimizer<'a> {
    pub fn new(operator: &'a Operator, parser: &'a dyn NameParser, batch_size: usize, jobs: usize) -> Optimizer<'a> {
        Optimizer {
            operator,
            parser,
            batch_size,
            jobs: jobs.max(1),
        }
    }

    pub fn run(&self, cancel: &CancellationToken, progress: &ProgressReporter) -> Result<(), Error> {
        self.reparse_names(cancel, progress)
            .map_err(|err| Error::Optimize(OptimizeError::Reparse(err.to_string())))?;

        self.operator
            .normalize_vernacular_lang_codes()
            .map_err(|err| Error::Optimize(OptimizeError::VernacularNormalize(err.to_string())))?;
        info!("vernacular language codes normalized");

        let removed = self
            .operator
            .remove_orphan_name_strings()
            .map_err(|err| Error::Optimize(OptimizeError::RemoveOrphans(err.to_string())))?;
        info!(removed, "orphan name strings removed");

        self.build_word_index(cancel, progress)
            .map_err(|err| Error::Optimize(OptimizeError::WordIndex(err.to_string())))?;

        self.operator
            .rebuild_verification_view()
            .map_err(|err| Error::Optimize(OptimizeError::VerificationView(err.to_string())))?;
        info!("verification view rebuilt");

        self.operator
            .vacuum_analyze()
            .map_err(|err| Error::Optimize(OptimizeError::VacuumAnalyze(err.to_string())))?;
        info!("vacuum/analyze finished");

        Ok(())
    }

    /// Spec §4.10 item 1: reparse every name string, with per-name
    /// nomenclatural-code hints pulled from `name_string_indices.code_id`,
    /// rebuilding the three canonical tables and each name string's parsed
    /// attributes. Parsing runs across `jobs` worker threads; the writes
    /// that follow are batched upserts, same as every other write path in
    /// this crate.
    fn reparse_names(&self, cancel: &CancellationToken, progress: &ProgressReporter) -> Result<usize, Error> {
        let start = Instant::now();
        let rows = self.operator.names_for_reparse()?;
        cancel.check()?;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.jobs)
            .build()
            .map_err(|err| Error::Optimize(OptimizeError::Reparse(err.to_string())))?;

        let names_by_id: HashMap<Uuid, String> = rows.iter().map(|row| (row.id, row.name.clone())).collect();

        let parsed: Vec<(Uuid, ParsedName)> = pool.install(|| {
            rows.par_iter()
                .map(|row| {
                    let code = NomenclaturalCode::from_code_id(row.code_id);
                    (row.id, self.parser.parse(&row.name, code))
                })
                .collect()
        });

        let mut canonicals: HashMap<Uuid, Canonical> = HashMap::new();
        let mut canonical_fulls: HashMap<Uuid, CanonicalFull> = HashMap::new();
        let mut canonical_stems: HashMap<Uuid, CanonicalStem> = HashMap::new();
        let mut name_batch: Vec<NameString> = Vec::with_capacity(self.batch_size);
        let mut total = 0usize;

        for (id, parsed) in parsed {
            cancel.check()?;

            let canonical_id = parsed.canonical.as_deref().map(|text| {
                let cid = canonical_id(text);
                canonicals.entry(cid).or_insert_with(|| Canonical {
                    id: cid,
                    name: text.to_string(),
                });
                cid
            });
            let canonical_full_id = parsed.canonical_full.as_deref().map(|text| {
                let cid = canonical_full_id(text);
                canonical_fulls.entry(cid).or_insert_with(|| CanonicalFull {
                    id: cid,
                    name: text.to_string(),
                });
                cid
            });
            let canonical_stem_id = parsed.canonical_stem.as_deref().map(|text| {
                let cid = canonical_stem_id(text);
                canonical_stems.entry(cid).or_insert_with(|| CanonicalStem {
                    id: cid,
                    name: text.to_string(),
                });
                cid
            });

            name_batch.push(NameString {
                id,
                name: names_by_id.get(&id).cloned().unwrap_or_default(),
                year: parsed.year,
                cardinality: Some(parsed.cardinality as i16),
                virus: parsed.virus,
                bacteria: parsed.bacteria,
                surrogate: parsed.surrogate,
                parse_quality: Some(parsed.quality as i16),
                canonical_id,
                canonical_full_id,
                canonical_stem_id,
            });

            if name_batch.len() >= self.batch_size {
                self.flush_reparse_batch(&mut canonicals, &mut canonical_fulls, &mut canonical_stems, &mut name_batch)?;
                total += self.batch_size;
                progress.emit(ProgressEvent::new("optimize:reparse", None, total as u64, start.elapsed()));
            }
        }

        total += name_batch.len();
        self.flush_reparse_batch(&mut canonicals, &mut canonical_fulls, &mut canonical_stems, &mut name_batch)?;
        progress.emit(ProgressEvent::new("optimize:reparse", None, total as u64, start.elapsed()));

        // every name string now points at the canonical this run computed
        // for it; anything the prior run left behind that nothing points at
        // any more is stale and discarded here (spec §3 "Lifecycles").
        let orphaned = self.operator.remove_orphan_canonicals()?;
        info!(total, orphaned, "name reparse finished");
        Ok(total)
    }

    fn flush_reparse_batch(
        &self,
        canonicals: &mut HashMap<Uuid, Canonical>,
        canonical_fulls: &mut HashMap<Uuid, CanonicalFull>,
        canonical_stems: &mut HashMap<Uuid, CanonicalStem>,
        name_batch: &mut Vec<NameString>,
    ) -> Result<(), Error> {
        if !canonicals.is_empty() {
            let rows: Vec<Canonical> = canonicals.drain().map(|(_, v)| v).collect();
            self.operator.insert_canonicals(&rows)?;
        }
        if !canonical_fulls.is_empty() {
            let rows: Vec<CanonicalFull> = canonical_fulls.drain().map(|(_, v)| v).collect();
            self.operator.insert_canonical_fulls(&rows)?;
        }
        if !canonical_stems.is_empty() {
            let rows: Vec<CanonicalStem> = canonical_stems.drain().map(|(_, v)| v).collect();
            self.operator.insert_canonical_stems(&rows)?;
        }
        if !name_batch.is_empty() {
            self.operator.upsert_reparsed_name_strings(name_batch)?;
            name_batch.clear();
        }
        Ok(())
    }

    /// Spec §4.10 item 4: truncate and rebuild the word index from every
    /// canonical currently on `name_strings`. Tokenizing and id-computation
    /// run across `jobs` worker threads; `words` is deduplicated in memory
    /// before the COPY since two different canonicals can share a word.
    fn build_word_index(&self, cancel: &CancellationToken, progress: &ProgressReporter) -> Result<(), Error> {
        let start = Instant::now();
        self.operator.truncate_word_tables()?;
        cancel.check()?;

        let rows = self.operator.names_with_canonical()?;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.jobs)
            .build()
            .map_err(|err| Error::Optimize(OptimizeError::WordIndex(err.to_string())))?;

        let tokenized: Vec<(Uuid, Uuid, Vec<String>)> = pool.install(|| {
            rows.par_iter()
                .map(|row| (row.id, row.canonical_id, tokenize(&row.canonical)))
                .collect()
        });

        // `word_id` is content-addressed, so the same word recurs across
        // many canonicals; COPY has no on-conflict clause, so each id must
        // be written at most once across the whole rebuild, not just once
        // per batch. `seen_words` tracks that globally while `words` only
        // ever holds the current batch's first-sighting rows.
        let mut seen_words: HashSet<Uuid> = HashSet::new();
        let mut words: HashMap<Uuid, Word> = HashMap::new();
        let mut links: Vec<WordNameString> = Vec::with_capacity(self.batch_size);
        let mut total = 0usize;

        for (name_string_id, canonical_id, tokens) in tokenized {
            cancel.check()?;

            // A canonical can repeat a word (e.g. a genus echoed in its own
            // subgenus marker); `(word_id, name_string_id)` is the table's
            // primary key, so only the first occurrence within a name
            // string is kept.
            let mut linked_words = HashSet::new();
            for token in tokens {
                let wid = word_id(&token);
                if seen_words.insert(wid) {
                    words.insert(wid, Word { id: wid, normalized: token.clone() });
                }
                if !linked_words.insert(wid) {
                    continue;
                }
                links.push(WordNameString {
                    word_id: wid,
                    name_string_id,
                    canonical_id,
                });
            }

            if links.len() >= self.batch_size {
                self.flush_word_batch(&mut words, &mut links)?;
                total += self.batch_size;
                progress.emit(ProgressEvent::new("optimize:words", None, total as u64, start.elapsed()));
            }
        }

        total += links.len();
        self.flush_word_batch(&mut words, &mut links)?;
        progress.emit(ProgressEvent::new("optimize:words", None, total as u64, start.elapsed()));

        info!(total, words = seen_words.len(), "word index rebuilt");
        Ok(())
    }

    fn flush_word_batch(&self, words: &mut HashMap<Uuid, Word>, links: &mut Vec<WordNameString>) -> Result<(), Error> {
        if !words.is_empty() {
            let rows: Vec<Word> = words.drain().map(|(_, v)| v).collect();
            self.operator.copy_words(&rows)?;
        }
        if !links.is_empty() {
            self.operator.copy_word_name_strings(links)?;
            links.clear();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_splits_on_whitespace_and_hyphen() {
        assert_eq!(tokenize("Plantago major"), vec!["plantago", "major"]);
        assert_eq!(tokenize("Cortinarius semi-sanguineus"), vec!["cortinarius", "semi", "sanguineus"]);
    }

    #[test]
    fn tokenize_unwraps_parenthesised_markers() {
        assert_eq!(tokenize("Aus (Bus) canus"), vec!["aus", "bus", "canus"]);
    }

    #[test]
    fn tokenize_drops_empty_segments_from_doubled_separators() {
        assert_eq!(tokenize("Aus  canus"), vec!["aus", "canus"]);
    }

    #[test]
    fn tokenize_empty_input_is_empty() {
        assert!(tokenize("").is_empty());
    }

    #[test]
    fn repeated_word_within_one_canonical_only_links_once() {
        // e.g. a canonical that happens to repeat a token -- the
        // (word_id, name_string_id) primary key must only be written once
        // per name string, even though the word occurs twice.
        let tokens = tokenize("Aus aus");
        assert_eq!(tokens, vec!["aus", "aus"]);

        let mut linked = HashSet::new();
        let mut link_count = 0;
        for token in &tokens {
            let wid = word_id(token);
            if linked.insert(wid) {
                link_count += 1;
            }
        }
        assert_eq!(link_count, 1);
    }
}

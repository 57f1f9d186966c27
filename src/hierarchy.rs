use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crossbeam_channel::bounded;
use tracing::{info, warn};

use crate::cancel::CancellationToken;
use crate::errors::Error;
use crate::parser::{NameParser, NomenclaturalCode};
use crate::sfga::{SfgaArchive, TaxonWithNameRow};

/// Bound on the raw-record and parsed-node channels (spec §5
/// "Backpressure": "queue length of order 10 000").
const CHANNEL_CAPACITY: usize = 10_000;

/// A GBIF/Catalogue-of-Life-style rank vocabulary is owned by the excluded
/// parser collaborator; this is a small, deterministic stand-in good enough
/// to populate the `rank` attribute the hierarchy map and index rows carry.
pub(crate) fn rank_name(rank_id: Option<i64>) -> Option<String> {
    let name = match rank_id? {
        10 => "kingdom",
        15 => "phylum",
        20 => "class",
        25 => "order",
        30 => "family",
        35 => "genus",
        40 => "species",
        45 => "subspecies",
        _ => return None,
    };
    Some(name.to_string())
}

pub(crate) fn status_name(status_id: Option<i64>) -> Option<String> {
    let name = match status_id? {
        1 => "accepted",
        2 => "provisionally accepted",
        3 => "synonym",
        4 => "ambiguous synonym",
        _ => return None,
    };
    Some(name.to_string())
}

/// One node of the in-memory hierarchy map built by the Hierarchy Builder
/// (spec §4.4).
#[derive(Debug, Clone)]
pub struct HierarchyNode {
    pub parent_id: Option<i64>,
    pub rank: Option<String>,
    pub canonical_name: String,
    pub taxonomic_status: Option<String>,
}

/// The `id → node` map, plus the shared "already warned" set used by the
/// Classification Encoder while walking it (spec §5 "Shared mutable
/// state").
pub struct Hierarchy {
    nodes: HashMap<i64, HierarchyNode>,
    warned: Mutex<HashSet<i64>>,
}

impl Hierarchy {
    pub fn empty() -> Hierarchy {
        Hierarchy::from_nodes(HashMap::new())
    }

    pub fn get(&self, id: i64) -> Option<&HierarchyNode> {
        self.nodes.get(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Logs `message` for `id` at most once across the lifetime of this
    /// hierarchy (spec §4.4: "a shared set guards against duplicate
    /// warnings").
    pub fn warn_once(&self, id: i64, message: &str) {
        let mut warned = self.warned.lock().unwrap();
        if warned.insert(id) {
            warn!(taxon_id = id, "{message}");
        }
    }

    /// Builds a hierarchy directly from an already-collected map. Used by
    /// [`HierarchyBuilder::build`] and, in tests, by the Classification
    /// Encoder's fixtures which want full control over node shape without
    /// spinning up a parser and worker pool.
    pub(crate) fn from_nodes(nodes: HashMap<i64, HierarchyNode>) -> Hierarchy {
        Hierarchy {
            nodes,
            warned: Mutex::new(HashSet::new()),
        }
    }
}

/// The Hierarchy Builder (spec §4.4). Farms `taxon JOIN name` rows out to a
/// worker pool that parses each name under the botanical code hint, then
/// collects the results into a single in-memory [`Hierarchy`].
pub struct HierarchyBuilder<'a> {
    parser: &'a dyn NameParser,
    jobs: usize,
}

impl<'a> HierarchyBuilder<'a> {
    pub fn new(parser: &'a dyn NameParser, jobs: usize) -> HierarchyBuilder<'a> {
        HierarchyBuilder { parser, jobs: jobs.max(1) }
    }

    pub fn build(&self, archive: &SfgaArchive, cancel: &CancellationToken) -> Result<Hierarchy, Error> {
        let (raw_tx, raw_rx) = bounded::<TaxonWithNameRow>(CHANNEL_CAPACITY);
        let (sink_tx, sink_rx) = bounded::<(i64, HierarchyNode)>(CHANNEL_CAPACITY);

        let result = std::thread::scope(|scope| -> Result<HashMap<i64, HierarchyNode>, Error> {
            for _ in 0..self.jobs {
                let raw_rx = raw_rx.clone();
                let sink_tx = sink_tx.clone();
                let cancel = cancel.clone();
                let parser = self.parser;

                scope.spawn(move || {
                    for record in raw_rx.iter() {
                        if cancel.is_cancelled() {
                            break;
                        }

                        let parsed = parser.parse(&record.scientific_name, NomenclaturalCode::Botanical);
                        let canonical_name = parsed
                            .canonical_full
                            .or(parsed.canonical)
                            .unwrap_or_else(|| record.scientific_name.clone());

                        let parent_id = if record.parent_id == Some(record.id) { None } else { record.parent_id };

                        let node = HierarchyNode {
                            parent_id,
                            rank: rank_name(record.rank_id),
                            canonical_name,
                            taxonomic_status: status_name(record.status_id),
                        };

                        if sink_tx.send((record.id, node)).is_err() {
                            break;
                        }
                    }
                });
            }
            drop(sink_tx);

            let collector = scope.spawn(move || {
                let mut nodes = HashMap::new();
                for (id, node) in sink_rx.iter() {
                    nodes.insert(id, node);
                }
                nodes
            });

            let mut produce_err = None;
            let outcome = archive.for_each_taxon_with_name(|record| {
                cancel.check()?;
                // A full channel applies backpressure by blocking here,
                // exactly the "readers block when consumers fall behind"
                // behavior spec §5 describes.
                raw_tx.send(record).map_err(|_| Error::Cancelled)
            });
            if let Err(err) = outcome {
                produce_err = Some(err);
            }
            drop(raw_tx);

            let nodes = collector.join().expect("hierarchy collector thread panicked");
            if let Some(err) = produce_err {
                return Err(err);
            }
            Ok(nodes)
        });

        let nodes = result?;
        info!(nodes = nodes.len(), "hierarchy build finished");
        Ok(Hierarchy::from_nodes(nodes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ParsedName;

    struct StubParser;
    impl NameParser for StubParser {
        fn parse(&self, name: &str, _code: NomenclaturalCode) -> ParsedName {
            ParsedName {
                canonical: Some(name.to_string()),
                ..ParsedName::default()
            }
        }
    }

    fn fixture_archive() -> (tempfile::TempDir, SfgaArchive) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fixture.sqlite");
        {
            let conn = rusqlite::Connection::open(&path).unwrap();
            conn.execute_batch(
                "create table name (id integer primary key, col__scientific_name text, rank_id integer, code_id integer);
                 insert into name values (1, 'Plantae', 10, 1);
                 insert into name values (2, 'Plantaginaceae', 30, 1);
                 insert into name values (3, 'Plantago major', 40, 1);
                 insert into name values (4, 'Self Referential', 40, 1);

                 create table taxon (id integer primary key, name_id integer, parent_id integer, status_id integer);
                 insert into taxon values (1, 1, null, 1);
                 insert into taxon values (2, 2, 1, 1);
                 insert into taxon values (3, 3, 2, 1);
                 insert into taxon values (4, 4, 4, 1);",
            )
            .unwrap();
        }
        let archive = SfgaArchive::open(&path).unwrap();
        (dir, archive)
    }

    #[test]
    fn builds_a_parent_linked_map() {
        let (_dir, archive) = fixture_archive();
        let parser = StubParser;
        let builder = HierarchyBuilder::new(&parser, 2);
        let hierarchy = builder.build(&archive, &CancellationToken::new()).unwrap();

        assert_eq!(hierarchy.len(), 4);
        let leaf = hierarchy.get(3).unwrap();
        assert_eq!(leaf.canonical_name, "Plantago major");
        assert_eq!(leaf.parent_id, Some(2));
        assert_eq!(leaf.rank.as_deref(), Some("species"));
    }

    #[test]
    fn self_referential_parent_is_rewritten_to_none() {
        let (_dir, archive) = fixture_archive();
        let parser = StubParser;
        let builder = HierarchyBuilder::new(&parser, 1);
        let hierarchy = builder.build(&archive, &CancellationToken::new()).unwrap();

        let node = hierarchy.get(4).unwrap();
        assert_eq!(node.parent_id, None);
    }

    #[test]
    fn rank_name_maps_known_ids_and_rejects_unknown() {
        assert_eq!(rank_name(Some(40)).as_deref(), Some("species"));
        assert_eq!(rank_name(Some(9999)), None);
        assert_eq!(rank_name(None), None);
    }

    #[test]
    fn warn_once_only_logs_an_id_a_single_time() {
        let hierarchy = Hierarchy::empty();
        hierarchy.warn_once(1, "missing parent");
        hierarchy.warn_once(1, "missing parent");
        assert!(hierarchy.warned.lock().unwrap().contains(&1));
        assert_eq!(hierarchy.warned.lock().unwrap().len(), 1);
    }
}

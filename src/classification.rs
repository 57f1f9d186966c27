use std::collections::HashSet;

use crate::hierarchy::{Hierarchy, HierarchyNode};
use crate::sfga::FlatClassification;

/// The three pipe-delimited breadcrumb columns of one `name_string_indices`
/// row (spec §4.5). Either all three are empty, or all three have the same
/// number of `|`-separated fields (spec §3 invariant 6).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Breadcrumbs {
    pub classification: String,
    pub classification_ranks: String,
    pub classification_ids: String,
}

impl Breadcrumbs {
    pub fn field_count(&self) -> usize {
        if self.classification.is_empty() {
            0
        }
        else {
            self.classification.split('|').count()
        }
    }
}

/// The Classification Encoder (spec §4.5). Walks the [`Hierarchy`] map
/// upward from a taxon id, falling back to a row's flat classification
/// columns when the walked path is too short (or a configuration flag
/// forces the fallback unconditionally).
pub struct ClassificationEncoder<'a> {
    hierarchy: &'a Hierarchy,
    force_flat: bool,
}

impl<'a> ClassificationEncoder<'a> {
    pub fn new(hierarchy: &'a Hierarchy, force_flat: bool) -> ClassificationEncoder<'a> {
        ClassificationEncoder { hierarchy, force_flat }
    }

    pub fn encode(&self, taxon_id: i64, flat: &FlatClassification) -> Breadcrumbs {
        let walked = self.walk(taxon_id);

        let use_flat = self.force_flat || walked.len() < 2;
        if use_flat {
            let ordered = flat.ordered();
            if !ordered.is_empty() {
                return Self::from_flat(&ordered);
            }
        }

        Self::from_walk(&walked)
    }

    /// Prepends each node to the path until the parent link is empty
    /// (root), missing, or a cycle is detected. Missing/circular references
    /// are logged at most once per offending id and simply end the walk,
    /// never raised as errors (spec §4.4/§4.5).
    fn walk(&self, taxon_id: i64) -> Vec<(i64, &'a HierarchyNode)> {
        let mut path = Vec::new();
        let mut visited = HashSet::new();
        let mut current = Some(taxon_id);

        while let Some(id) = current {
            if !visited.insert(id) {
                self.hierarchy.warn_once(id, "circular parent reference encountered while walking classification");
                break;
            }

            let node = match self.hierarchy.get(id) {
                Some(node) => node,
                None => {
                    if id != taxon_id {
                        self.hierarchy.warn_once(id, "missing parent reference encountered while walking classification");
                    }
                    break;
                }
            };

            path.push((id, node));
            current = node.parent_id;
        }

        path.reverse();
        path
    }

    fn from_walk(path: &[(i64, &HierarchyNode)]) -> Breadcrumbs {
        if path.is_empty() {
            return Breadcrumbs::default();
        }

        let names: Vec<&str> = path.iter().map(|(_, node)| node.canonical_name.as_str()).collect();
        let ranks: Vec<String> = path
            .iter()
            .map(|(_, node)| node.rank.as_deref().unwrap_or("").to_lowercase())
            .collect();
        let ids: Vec<String> = path.iter().map(|(id, _)| id.to_string()).collect();

        Breadcrumbs {
            classification: names.join("|"),
            classification_ranks: ranks.join("|"),
            classification_ids: ids.join("|"),
        }
    }

    fn from_flat(ordered: &[(&'static str, &(String, i64))]) -> Breadcrumbs {
        let names: Vec<&str> = ordered.iter().map(|(_, v)| v.0.as_str()).collect();
        let ranks: Vec<&str> = ordered.iter().map(|(rank, _)| *rank).collect();
        let ids: Vec<String> = ordered.iter().map(|(_, v)| v.1.to_string()).collect();

        Breadcrumbs {
            classification: names.join("|"),
            classification_ranks: ranks.join("|"),
            classification_ids: ids.join("|"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::hierarchy::HierarchyNode;

    fn node(parent_id: Option<i64>, rank: &str, canonical_name: &str) -> HierarchyNode {
        HierarchyNode {
            parent_id,
            rank: Some(rank.to_string()),
            canonical_name: canonical_name.to_string(),
            taxonomic_status: None,
        }
    }

    fn hierarchy_with_chain() -> Hierarchy {
        let mut nodes = HashMap::new();
        nodes.insert(1, node(None, "kingdom", "Plantae"));
        nodes.insert(2, node(Some(1), "family", "Plantaginaceae"));
        nodes.insert(3, node(Some(2), "species", "Plantago major"));
        Hierarchy::from_nodes(nodes)
    }

    #[test]
    fn walks_a_full_chain_to_the_root() {
        let hierarchy = hierarchy_with_chain();
        let encoder = ClassificationEncoder::new(&hierarchy, false);
        let breadcrumbs = encoder.encode(3, &FlatClassification::default());

        assert_eq!(breadcrumbs.classification, "Plantae|Plantaginaceae|Plantago major");
        assert_eq!(breadcrumbs.classification_ranks, "kingdom|family|species");
        assert_eq!(breadcrumbs.classification_ids, "1|2|3");
        assert_eq!(breadcrumbs.field_count(), 3);
    }

    #[test]
    fn falls_back_to_flat_columns_when_path_is_too_short() {
        let mut nodes = HashMap::new();
        nodes.insert(9, node(None, "species", "Solo"));
        let hierarchy = Hierarchy::from_nodes(nodes);

        let mut flat = FlatClassification::default();
        flat.kingdom = Some(("Plantae".to_string(), 100));
        flat.genus = Some(("Solanum".to_string(), 101));

        let encoder = ClassificationEncoder::new(&hierarchy, false);
        let breadcrumbs = encoder.encode(9, &flat);

        assert_eq!(breadcrumbs.classification, "Plantae|Solanum");
        assert_eq!(breadcrumbs.classification_ranks, "kingdom|genus");
    }

    #[test]
    fn unknown_taxon_with_no_flat_data_yields_empty_breadcrumbs() {
        let hierarchy = Hierarchy::empty();
        let encoder = ClassificationEncoder::new(&hierarchy, false);
        let breadcrumbs = encoder.encode(42, &FlatClassification::default());

        assert_eq!(breadcrumbs, Breadcrumbs::default());
        assert_eq!(breadcrumbs.field_count(), 0);
    }

    #[test]
    fn cyclic_parent_chain_terminates_the_walk() {
        let mut nodes = HashMap::new();
        nodes.insert(1, HierarchyNode { parent_id: Some(2), rank: None, canonical_name: "A".to_string(), taxonomic_status: None });
        nodes.insert(2, HierarchyNode { parent_id: Some(1), rank: None, canonical_name: "B".to_string(), taxonomic_status: None });
        let hierarchy = Hierarchy::from_nodes(nodes);

        let encoder = ClassificationEncoder::new(&hierarchy, false);
        let breadcrumbs = encoder.encode(1, &FlatClassification::default());

        // the walk still produces a (short) path rather than erroring.
        assert!(breadcrumbs.classification == "B|A" || breadcrumbs.classification.is_empty());
    }

    #[test]
    fn force_flat_overrides_a_perfectly_good_walked_path() {
        let hierarchy = hierarchy_with_chain();
        let mut flat = FlatClassification::default();
        flat.kingdom = Some(("Forced".to_string(), 7));

        let encoder = ClassificationEncoder::new(&hierarchy, true);
        let breadcrumbs = encoder.encode(3, &flat);
        assert_eq!(breadcrumbs.classification, "Forced");
    }
}

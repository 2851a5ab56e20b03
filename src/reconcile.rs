//! Record reconciliation: composite-key merge/remove and preferred-id
//! ranking.
//!
//! Everything here operates on in-memory record sequences only. The merge
//! engine matches on a caller-chosen composite key (case/whitespace
//! insensitive) and never sees the network; the ranking pass restores the
//! single-preferred invariant after every existing-id mutation.

use std::collections::HashMap;

use crate::types::{ExistingId, Synonym};

/// Curie-prefix priority used when the caller supplies no ranking.
/// Unrecognized prefixes rank after every listed one.
pub const DEFAULT_RANKING: &[&str] = &[
    "CHEBI", "NCBITaxon", "COGPO", "CAO", "DICOM", "UBERON", "FMA", "NLX", "NLXANAT", "NLXCELL",
    "NLXFUNC", "NLXINV", "NLXORG", "NLXRES", "NLXSUB", "BIRNLEX", "SAO", "NDA.CDE", "PR", "IAO",
    "NIFEXT", "OEN", "MESH", "NCIM", "ILX",
];

/// Field access by key, the seam between the generic merge engine and the
/// concrete record types.
pub trait KeyedRecord {
    fn get(&self, key: &str) -> Option<&str>;
    fn set(&mut self, key: &str, value: &str);
}

impl KeyedRecord for Synonym {
    fn get(&self, key: &str) -> Option<&str> {
        match key {
            "literal" => Some(&self.literal),
            "type" => Some(&self.kind),
            _ => None,
        }
    }

    fn set(&mut self, key: &str, value: &str) {
        match key {
            "literal" => self.literal = value.to_string(),
            "type" => self.kind = value.to_string(),
            _ => {}
        }
    }
}

impl KeyedRecord for ExistingId {
    fn get(&self, key: &str) -> Option<&str> {
        match key {
            "iri" => Some(&self.iri),
            "curie" => Some(&self.curie),
            _ => None,
        }
    }

    fn set(&mut self, key: &str, value: &str) {
        match key {
            "iri" => self.iri = value.to_string(),
            "curie" => self.curie = value.to_string(),
            _ => {}
        }
    }
}

fn norm(value: &str) -> String {
    value.trim().to_lowercase()
}

/// True when every `on` field of both records is equal after
/// case/whitespace normalization. An empty `on` set never matches:
/// with no keys configured, no two records are ever considered the same.
fn fields_match<R: KeyedRecord>(reference: &R, candidate: &R, on: &[&str]) -> bool {
    !on.is_empty()
        && on
            .iter()
            .all(|key| match (reference.get(key), candidate.get(key)) {
                (Some(a), Some(b)) => norm(a) == norm(b),
                _ => false,
            })
}

/// Merge `new` into `refs` on a composite key.
///
/// Candidates with no `on` match are appended. A match with no `alt` keys
/// is a pure duplicate and is dropped. A match with `alt` keys fills the
/// reference's empty alt fields in place from the candidate (candidate
/// dropped) — unless `passive`, in which case the candidate is appended as
/// a sibling instead. A match where no alt field qualifies is dropped as a
/// duplicate. Reference order is preserved; survivors append in input
/// order.
pub fn merge_records<R: KeyedRecord>(
    mut refs: Vec<R>,
    new: Vec<R>,
    on: &[&str],
    alt: &[&str],
    passive: bool,
) -> Vec<R> {
    let mut survivors: Vec<R> = Vec::new();
    'candidates: for candidate in new {
        for reference in refs.iter_mut() {
            if !fields_match(reference, &candidate, on) {
                continue;
            }
            if !alt.is_empty() {
                let fillable = alt.iter().any(|key| {
                    let ref_value = reference.get(key).unwrap_or("");
                    let new_value = candidate.get(key).unwrap_or("");
                    ref_value.is_empty() && norm(ref_value) != norm(new_value)
                });
                if fillable {
                    if passive {
                        survivors.push(candidate);
                        continue 'candidates;
                    }
                    for key in alt {
                        let ref_empty = reference.get(key).map_or(true, str::is_empty);
                        let new_value = candidate.get(key).unwrap_or("").to_string();
                        if ref_empty && !new_value.is_empty() {
                            reference.set(key, &new_value);
                        }
                    }
                }
            }
            // matched: merged into the reference or dropped as a duplicate
            continue 'candidates;
        }
        survivors.push(candidate);
    }
    refs.extend(survivors);
    refs
}

/// Remove from `refs` every record whose `on` fields exactly equal (after
/// normalization) any record in `to_remove`. Indexes are dropped
/// highest-first so earlier removals never shift later ones.
pub fn remove_records<R: KeyedRecord>(mut refs: Vec<R>, to_remove: &[R], on: &[&str]) -> Vec<R> {
    let doomed: Vec<usize> = refs
        .iter()
        .enumerate()
        .filter(|(_, reference)| {
            to_remove
                .iter()
                .any(|record| fields_match(*reference, record, on))
        })
        .map(|(index, _)| index)
        .collect();
    for index in doomed.into_iter().rev() {
        refs.remove(index);
    }
    refs
}

/// Re-rank existing ids and restore the single-preferred invariant.
///
/// Stable ascending sort by the rank of each curie prefix (unrecognized
/// prefixes tie at the list length, so ties keep their relative input
/// order), then `preferred = 1` on the first element and 0 on the rest.
/// Idempotent; must be re-run after every add/remove of existing ids.
pub fn rank_existing_ids(ids: Vec<ExistingId>, ranking: Option<&[&str]>) -> Vec<ExistingId> {
    let ranking = ranking.unwrap_or(DEFAULT_RANKING);
    let default_rank = ranking.len();
    let table: HashMap<String, usize> = ranking
        .iter()
        .enumerate()
        .map(|(rank, prefix)| (prefix.to_uppercase(), rank))
        .collect();
    let mut ranked: Vec<(usize, ExistingId)> = ids
        .into_iter()
        .map(|id| {
            let prefix = id.curie.split(':').next().unwrap_or("").to_uppercase();
            (table.get(&prefix).copied().unwrap_or(default_rank), id)
        })
        .collect();
    ranked.sort_by_key(|(rank, _)| *rank);
    let mut out: Vec<ExistingId> = ranked.into_iter().map(|(_, id)| id).collect();
    for (index, id) in out.iter_mut().enumerate() {
        id.preferred = u8::from(index == 0);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synonym(literal: &str, kind: &str) -> Synonym {
        Synonym {
            literal: literal.to_string(),
            kind: kind.to_string(),
        }
    }

    fn existing_id(curie: &str, preferred: u8) -> ExistingId {
        ExistingId {
            iri: format!("http://example.org/{}", curie.replace(':', "_")),
            curie: curie.to_string(),
            preferred,
        }
    }

    #[test]
    fn test_merge_identity() {
        let refs = vec![synonym("Brain", "obo:x"), synonym("Spine", "")];
        let merged = merge_records(refs.clone(), vec![], &["literal"], &["type"], false);
        assert_eq!(merged, refs);
    }

    #[test]
    fn test_merge_appends_new() {
        let merged = merge_records(
            vec![synonym("Brain", "")],
            vec![synonym("Encephalon", ""), synonym("Cerebro", "")],
            &["literal"],
            &["type"],
            false,
        );
        assert_eq!(
            merged,
            vec![
                synonym("Brain", ""),
                synonym("Encephalon", ""),
                synonym("Cerebro", ""),
            ]
        );
    }

    #[test]
    fn test_merge_drops_case_insensitive_duplicate() {
        let merged = merge_records(
            vec![synonym("Brain", "obo:x")],
            vec![synonym("brain", "")],
            &["literal"],
            &["type"],
            false,
        );
        assert_eq!(merged, vec![synonym("Brain", "obo:x")]);
    }

    #[test]
    fn test_merge_fills_empty_alt_field_in_place() {
        let merged = merge_records(
            vec![synonym("Brain", "")],
            vec![synonym("Brain", "obo:x")],
            &["literal"],
            &["type"],
            false,
        );
        assert_eq!(merged, vec![synonym("Brain", "obo:x")]);
    }

    #[test]
    fn test_merge_passive_appends_sibling() {
        let merged = merge_records(
            vec![synonym("Brain", "")],
            vec![synonym("Brain", "obo:x")],
            &["literal"],
            &["type"],
            true,
        );
        assert_eq!(merged, vec![synonym("Brain", ""), synonym("Brain", "obo:x")]);
    }

    #[test]
    fn test_merge_match_without_alt_keys_drops() {
        let merged = merge_records(
            vec![existing_id("ILX:123", 1)],
            vec![existing_id("ilx:123", 0)],
            &["curie", "iri"],
            &[],
            false,
        );
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].curie, "ILX:123");
    }

    #[test]
    fn test_merge_empty_on_appends_everything() {
        // Permissive default: no keys configured means nothing ever matches.
        let merged = merge_records(
            vec![synonym("Brain", "")],
            vec![synonym("Brain", "")],
            &[],
            &[],
            false,
        );
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn test_remove_exact_composite_match() {
        let removed = remove_records(
            vec![synonym("Brain", "x"), synonym("Spine", "y")],
            &[synonym("Brain", "x")],
            &["literal", "type"],
        );
        assert_eq!(removed, vec![synonym("Spine", "y")]);
    }

    #[test]
    fn test_remove_requires_all_keys_to_match() {
        let removed = remove_records(
            vec![synonym("Brain", "x"), synonym("Spine", "y")],
            &[synonym("Brain", "z")],
            &["literal", "type"],
        );
        assert_eq!(removed.len(), 2);
    }

    #[test]
    fn test_remove_multiple_highest_index_first() {
        let removed = remove_records(
            vec![
                synonym("a", ""),
                synonym("b", ""),
                synonym("c", ""),
                synonym("b", ""),
            ],
            &[synonym("b", "")],
            &["literal", "type"],
        );
        assert_eq!(removed, vec![synonym("a", ""), synonym("c", "")]);
    }

    #[test]
    fn test_rank_single_preferred_invariant() {
        let ranked = rank_existing_ids(
            vec![
                existing_id("ILX:0101431", 0),
                existing_id("UBERON:0000955", 0),
                existing_id("BIRNLEX:796", 1),
            ],
            None,
        );
        assert_eq!(ranked.iter().filter(|id| id.preferred == 1).count(), 1);
        // UBERON outranks BIRNLEX outranks ILX in the default table
        assert_eq!(ranked[0].curie, "UBERON:0000955");
        assert_eq!(ranked[0].preferred, 1);
        assert_eq!(ranked[2].curie, "ILX:0101431");
    }

    #[test]
    fn test_rank_is_a_fixed_point() {
        let once = rank_existing_ids(
            vec![
                existing_id("MESH:D001921", 0),
                existing_id("CHEBI:15377", 0),
                existing_id("ILX:0101431", 1),
            ],
            None,
        );
        let twice = rank_existing_ids(once.clone(), None);
        assert_eq!(once, twice);
        assert_eq!(once[0].curie, "CHEBI:15377");
    }

    #[test]
    fn test_rank_unrecognized_prefixes_keep_input_order() {
        let ranked = rank_existing_ids(
            vec![
                existing_id("AAA:1", 0),
                existing_id("BBB:2", 0),
                existing_id("ILX:3", 0),
            ],
            None,
        );
        // ILX is ranked; the two unknowns tie last in input order
        assert_eq!(ranked[0].curie, "ILX:3");
        assert_eq!(ranked[1].curie, "AAA:1");
        assert_eq!(ranked[2].curie, "BBB:2");
    }

    #[test]
    fn test_rank_custom_ranking() {
        let ranked = rank_existing_ids(
            vec![existing_id("CHEBI:1", 1), existing_id("ILX:2", 0)],
            Some(&["ILX", "CHEBI"]),
        );
        assert_eq!(ranked[0].curie, "ILX:2");
        assert_eq!(ranked[0].preferred, 1);
        assert_eq!(ranked[1].preferred, 0);
    }

    #[test]
    fn test_rank_empty_input() {
        assert!(rank_existing_ids(vec![], None).is_empty());
    }
}

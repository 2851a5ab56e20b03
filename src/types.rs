//! Wire types for the InterLex registry API.
//!
//! The registry is inconsistent about numeric vs string encodings of row
//! ids, version tokens, and the `preferred` flag, so the deserializers here
//! accept both and canonicalize to strings (ids, versions) or 0/1
//! (`preferred`). Records round-trip through `serde` because updates are
//! whole-record replaces, not field patches.

use serde::de::{Deserializer, Error as DeError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The fixed enumeration of entity kinds the registry accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityKind {
    #[serde(rename = "term")]
    Term,
    #[serde(rename = "TermSet")]
    TermSet,
    #[serde(rename = "cde")]
    Cde,
    #[serde(rename = "pde")]
    Pde,
    #[serde(rename = "fde")]
    Fde,
    #[serde(rename = "relationship")]
    Relationship,
    #[serde(rename = "annotation")]
    Annotation,
}

/// An alternate name for an entity. Merge identity is the literal,
/// case/whitespace-insensitively; `kind` (the wire `type` predicate) is the
/// fill-in-if-missing field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Synonym {
    pub literal: String,
    #[serde(rename = "type", default, deserialize_with = "de_nullable_string")]
    pub kind: String,
}

/// An alternate external identifier attached to an entity. Exactly one
/// element of any `existing_ids` sequence carries `preferred = 1`; the
/// ranking pass in [`crate::reconcile`] enforces that.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExistingId {
    pub iri: String,
    pub curie: String,
    #[serde(default, deserialize_with = "de_preferred")]
    pub preferred: u8,
}

/// Superclass reference as the registry exchanges it.
///
/// Fetched records carry `id` + `ilx`; a new entity registration submits
/// only `ilx`; edits always re-submit the superclass as a `superclass_tid`
/// row, whether retained or newly assigned (the edit endpoint wants the
/// registry row id, not the fragment).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Superclass {
    #[serde(
        default,
        deserialize_with = "de_opt_tolerant",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ilx: Option<String>,
    #[serde(
        default,
        deserialize_with = "de_opt_tolerant",
        skip_serializing_if = "Option::is_none"
    )]
    pub superclass_tid: Option<String>,
}

/// A registry-held entity record.
///
/// The client only ever holds a transient copy of this between a fetch and
/// the matching whole-record replace; it is never cached across operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityRecord {
    /// Opaque server row id, distinct from the public `ilx` fragment.
    #[serde(default, deserialize_with = "de_opt_tolerant")]
    pub id: Option<String>,
    #[serde(default)]
    pub ilx: String,
    #[serde(default)]
    pub label: String,
    #[serde(rename = "type")]
    pub kind: EntityKind,
    #[serde(default, deserialize_with = "de_opt_tolerant")]
    pub definition: Option<String>,
    #[serde(default, deserialize_with = "de_opt_tolerant")]
    pub comment: Option<String>,
    #[serde(default)]
    pub superclasses: Vec<Superclass>,
    #[serde(default)]
    pub synonyms: Vec<Synonym>,
    #[serde(default)]
    pub existing_ids: Vec<ExistingId>,
    /// Owner user id.
    #[serde(default, deserialize_with = "de_opt_tolerant")]
    pub uid: Option<String>,
    /// Community id.
    #[serde(default, deserialize_with = "de_opt_tolerant")]
    pub cid: Option<String>,
    /// 0 active, -1 hidden, -2 deleted.
    #[serde(default, deserialize_with = "de_opt_tolerant")]
    pub status: Option<String>,
    /// Monotonic version token, used for optimistic concurrency on
    /// annotation/relationship writes.
    #[serde(default, deserialize_with = "de_opt_tolerant")]
    pub version: Option<String>,
}

/// Stored annotation fact: `(tid, annotation_tid, value)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnotationRecord {
    #[serde(default, deserialize_with = "de_opt_tolerant")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "de_opt_tolerant")]
    pub tid: Option<String>,
    #[serde(default, deserialize_with = "de_opt_tolerant")]
    pub annotation_tid: Option<String>,
    #[serde(default, deserialize_with = "de_nullable_string")]
    pub value: String,
    #[serde(default, deserialize_with = "de_opt_tolerant")]
    pub annotation_term_ilx: Option<String>,
    #[serde(default, deserialize_with = "de_opt_tolerant")]
    pub term_ilx: Option<String>,
}

/// Stored relationship fact: `(term1_id, relationship_tid, term2_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipRecord {
    #[serde(default, deserialize_with = "de_opt_tolerant")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "de_opt_tolerant")]
    pub term1_id: Option<String>,
    #[serde(default, deserialize_with = "de_opt_tolerant")]
    pub term2_id: Option<String>,
    #[serde(default, deserialize_with = "de_opt_tolerant")]
    pub relationship_tid: Option<String>,
    #[serde(default, deserialize_with = "de_opt_tolerant")]
    pub relationship_term_ilx: Option<String>,
    #[serde(default, deserialize_with = "de_opt_tolerant")]
    pub term1_ilx: Option<String>,
    #[serde(default, deserialize_with = "de_opt_tolerant")]
    pub term2_ilx: Option<String>,
}

/// String-or-number wire field canonicalized to `Option<String>`.
fn de_opt_tolerant<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(D::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

/// Nullable wire string canonicalized to `String` (null becomes empty).
fn de_nullable_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// `preferred` arrives as int, string, or bool; canonicalize to 0/1.
fn de_preferred<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(0),
        Some(Value::Number(n)) => Ok(if n.as_i64() == Some(1) { 1 } else { 0 }),
        Some(Value::String(s)) => Ok(if s.trim() == "1" { 1 } else { 0 }),
        Some(Value::Bool(b)) => Ok(u8::from(b)),
        Some(other) => Err(D::Error::custom(format!(
            "expected 0/1 preferred flag, got {other}"
        ))),
    }
}

/// Tolerant string view of a loose JSON value (same rules as the record
/// deserializers), for code that inspects raw `data` payloads.
pub(crate) fn value_to_string(value: Option<&Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entity_record_tolerates_numeric_fields() {
        let record: EntityRecord = serde_json::from_value(json!({
            "id": 304713,
            "ilx": "ilx_0101431",
            "label": "Brain",
            "type": "term",
            "definition": null,
            "synonyms": [{"literal": "Encephalon", "type": null}],
            "existing_ids": [
                {"iri": "http://uri.interlex.org/base/ilx_0101431",
                 "curie": "ILX:0101431", "preferred": "1"},
                {"iri": "http://purl.obolibrary.org/obo/UBERON_0000955",
                 "curie": "UBERON:0000955", "preferred": 0}
            ],
            "uid": 34142,
            "version": 3
        }))
        .unwrap();
        assert_eq!(record.id.as_deref(), Some("304713"));
        assert_eq!(record.kind, EntityKind::Term);
        assert_eq!(record.synonyms[0].kind, "");
        assert_eq!(record.existing_ids[0].preferred, 1);
        assert_eq!(record.existing_ids[1].preferred, 0);
        assert_eq!(record.uid.as_deref(), Some("34142"));
        assert_eq!(record.version.as_deref(), Some("3"));
    }

    #[test]
    fn test_entity_kind_wire_names() {
        for (kind, wire) in [
            (EntityKind::Term, "\"term\""),
            (EntityKind::TermSet, "\"TermSet\""),
            (EntityKind::Cde, "\"cde\""),
            (EntityKind::Pde, "\"pde\""),
            (EntityKind::Fde, "\"fde\""),
            (EntityKind::Relationship, "\"relationship\""),
            (EntityKind::Annotation, "\"annotation\""),
        ] {
            assert_eq!(serde_json::to_string(&kind).unwrap(), wire);
        }
    }

    #[test]
    fn test_superclass_serializes_only_present_keys() {
        let fresh = Superclass {
            ilx: Some("ilx_0108124".into()),
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_value(&fresh).unwrap(),
            json!({"ilx": "ilx_0108124"})
        );
        let retained = Superclass {
            superclass_tid: Some("12345".into()),
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_value(&retained).unwrap(),
            json!({"superclass_tid": "12345"})
        );
    }
}

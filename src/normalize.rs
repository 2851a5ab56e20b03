//! Field normalizers.
//!
//! Pure functions that validate and canonicalize loosely-typed caller input
//! into the wire shapes in [`crate::types`]. All failures are
//! [`ValidationError`]s raised before anything touches the network.

use serde_json::Value;

use crate::error::ValidationError;
use crate::ids;
use crate::types::{ExistingId, Superclass, Synonym};

/// Loose synonym input: a bare literal or a literal with its predicate.
#[derive(Debug, Clone)]
pub enum SynonymInput {
    Literal(String),
    Typed { literal: String, kind: String },
}

impl From<&str> for SynonymInput {
    fn from(literal: &str) -> Self {
        SynonymInput::Literal(literal.to_string())
    }
}

impl From<String> for SynonymInput {
    fn from(literal: String) -> Self {
        SynonymInput::Literal(literal)
    }
}

impl From<Synonym> for SynonymInput {
    fn from(synonym: Synonym) -> Self {
        SynonymInput::Typed {
            literal: synonym.literal,
            kind: synonym.kind,
        }
    }
}

/// Canonicalize synonym inputs. Bare strings are promoted to
/// `{literal, type: ""}`; an absent or empty literal fails.
pub fn normalize_synonyms(inputs: &[SynonymInput]) -> Result<Vec<Synonym>, ValidationError> {
    let mut out = Vec::with_capacity(inputs.len());
    for input in inputs {
        let (literal, kind) = match input {
            SynonymInput::Literal(literal) => (literal.clone(), String::new()),
            SynonymInput::Typed { literal, kind } => (literal.clone(), kind.clone()),
        };
        if literal.trim().is_empty() {
            return Err(ValidationError::EmptySynonymLiteral);
        }
        out.push(Synonym { literal, kind });
    }
    Ok(out)
}

/// Canonicalize raw existing-id input.
///
/// Both `curie` and `iri` are required; any other key besides the optional
/// `preferred` flag is rejected. The error names exactly the offending key
/// so the caller can self-correct.
pub fn normalize_existing_ids(raw: &[Value]) -> Result<Vec<ExistingId>, ValidationError> {
    let mut out = Vec::with_capacity(raw.len());
    for (index, value) in raw.iter().enumerate() {
        let context = format!("existing_ids[{index}]");
        let object = value
            .as_object()
            .ok_or_else(|| ValidationError::NotAnObject {
                context: context.clone(),
            })?;
        for key in object.keys() {
            if !matches!(key.as_str(), "iri" | "curie" | "preferred") {
                return Err(ValidationError::UnexpectedKey {
                    key: key.clone(),
                    context,
                });
            }
        }
        let require = |key: &str| -> Result<String, ValidationError> {
            object
                .get(key)
                .and_then(Value::as_str)
                .map(str::to_string)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| ValidationError::MissingKey {
                    key: key.to_string(),
                    context: context.clone(),
                })
        };
        let iri = require("iri")?;
        let curie = require("curie")?;
        let preferred = match object.get("preferred") {
            Some(Value::Number(n)) if n.as_i64() == Some(1) => 1,
            Some(Value::String(s)) if s.trim() == "1" => 1,
            Some(Value::Bool(true)) => 1,
            _ => 0,
        };
        out.push(ExistingId {
            iri,
            curie,
            preferred,
        });
    }
    Ok(out)
}

/// Canonicalize a superclass reference (IRI, curie, or fragment) to the
/// single-element superclass list the add endpoint expects.
pub fn normalize_superclass(reference: &str) -> Result<Vec<Superclass>, ValidationError> {
    let fragment = ids::to_fragment(reference)?;
    Ok(vec![Superclass {
        ilx: Some(fragment),
        ..Default::default()
    }])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bare_string_promoted() {
        let synonyms = normalize_synonyms(&["Encephalon".into(), "Cerebro".into()]).unwrap();
        assert_eq!(
            synonyms,
            vec![
                Synonym {
                    literal: "Encephalon".into(),
                    kind: String::new()
                },
                Synonym {
                    literal: "Cerebro".into(),
                    kind: String::new()
                },
            ]
        );
    }

    #[test]
    fn test_typed_synonym_kept() {
        let synonyms = normalize_synonyms(&[SynonymInput::Typed {
            literal: "Brains".into(),
            kind: "obo:hasExactSynonym".into(),
        }])
        .unwrap();
        assert_eq!(synonyms[0].kind, "obo:hasExactSynonym");
    }

    #[test]
    fn test_empty_literal_rejected() {
        assert_eq!(
            normalize_synonyms(&["".into()]),
            Err(ValidationError::EmptySynonymLiteral)
        );
        assert_eq!(
            normalize_synonyms(&[SynonymInput::Typed {
                literal: "   ".into(),
                kind: "exact".into()
            }]),
            Err(ValidationError::EmptySynonymLiteral)
        );
    }

    #[test]
    fn test_existing_ids_ok() {
        let ids = normalize_existing_ids(&[json!({
            "iri": "http://uri.neuinfo.org/nif/nifstd/birnlex_796",
            "curie": "BIRNLEX:796",
        })])
        .unwrap();
        assert_eq!(ids[0].curie, "BIRNLEX:796");
        assert_eq!(ids[0].preferred, 0);
        let ids = normalize_existing_ids(&[json!({
            "iri": "http://uri.interlex.org/base/ilx_123",
            "curie": "ILX:123",
            "preferred": "1",
        })])
        .unwrap();
        assert_eq!(ids[0].preferred, 1);
    }

    #[test]
    fn test_existing_ids_missing_key_named() {
        let err = normalize_existing_ids(&[json!({"curie": "BIRNLEX:796"})]).unwrap_err();
        assert_eq!(
            err,
            ValidationError::MissingKey {
                key: "iri".into(),
                context: "existing_ids[0]".into()
            }
        );
    }

    #[test]
    fn test_existing_ids_unexpected_key_named() {
        let err = normalize_existing_ids(&[json!({
            "iri": "http://x.org/1",
            "curie": "X:1",
            "iris": "extra_key",
        })])
        .unwrap_err();
        assert_eq!(
            err,
            ValidationError::UnexpectedKey {
                key: "iris".into(),
                context: "existing_ids[0]".into()
            }
        );
    }

    #[test]
    fn test_superclass_canonicalized() {
        for reference in [
            "http://uri.interlex.org/base/ilx_0108124",
            "ILX:0108124",
            "ilx_0108124",
        ] {
            let superclasses = normalize_superclass(reference).unwrap();
            assert_eq!(superclasses[0].ilx.as_deref(), Some("ilx_0108124"));
            assert!(superclasses[0].id.is_none());
        }
        assert!(normalize_superclass("OBO:123").is_err());
    }
}

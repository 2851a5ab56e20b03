//! InterLex identifier encodings.
//!
//! A registry identifier has three textual forms that must interconvert
//! losslessly: the bare fragment (`ilx_0101431`), the curie (`ILX:0101431`),
//! and the full IRI (`http://uri.interlex.org/base/ilx_0101431`). Two
//! namespaces exist: `ilx`/`ILX` for permanent ids and `tmp`/`TMP` for
//! temporary ones. Everything here is pure and tested without network.

use crate::error::ValidationError;

/// Base IRI under which all registry fragments live.
pub const BASE_IRI: &str = "http://uri.interlex.org/base/";

/// Canonicalize any identifier form to the bare fragment (`ilx_…`/`tmp_…`).
///
/// Accepts an IRI (only the last path segment matters), a curie, or a
/// fragment that is already canonical.
pub fn to_fragment(id: &str) -> Result<String, ValidationError> {
    if id.trim().is_empty() {
        return Err(ValidationError::EmptyIdentifier);
    }
    let tail = id.rsplit('/').next().unwrap_or(id);
    if tail.starts_with("ilx_") || tail.starts_with("tmp_") {
        Ok(tail.to_string())
    } else if let Some(rest) = tail.strip_prefix("ILX:") {
        Ok(format!("ilx_{rest}"))
    } else if let Some(rest) = tail.strip_prefix("TMP:") {
        Ok(format!("tmp_{rest}"))
    } else {
        Err(ValidationError::BadIdentifier {
            value: tail.to_string(),
        })
    }
}

/// Convert any identifier form to the curie encoding (`ILX:…`/`TMP:…`).
pub fn to_curie(id: &str) -> Result<String, ValidationError> {
    let fragment = to_fragment(id)?;
    if let Some(rest) = fragment.strip_prefix("ilx_") {
        Ok(format!("ILX:{rest}"))
    } else {
        // to_fragment only emits the two known prefixes
        let rest = fragment.trim_start_matches("tmp_");
        Ok(format!("TMP:{rest}"))
    }
}

/// Convert any identifier form to the full IRI.
pub fn to_iri(id: &str) -> Result<String, ValidationError> {
    Ok(format!("{BASE_IRI}{}", to_fragment(id)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_fragment() {
        let cases = [
            ("ILX:123", "ilx_123"),
            ("ilx_123", "ilx_123"),
            ("TMP:123", "tmp_123"),
            ("tmp_123", "tmp_123"),
            ("http://uri.interlex.org/base/tmp_123", "tmp_123"),
            ("http://fake_url.org/tmp_123", "tmp_123"),
            ("http://uri.interlex.org/base/ilx_0101431", "ilx_0101431"),
        ];
        for (input, expected) in cases {
            assert_eq!(to_fragment(input).unwrap(), expected, "input {input}");
        }
    }

    #[test]
    fn test_to_fragment_rejects_unknown_prefix() {
        assert!(matches!(
            to_fragment("OBO:123"),
            Err(ValidationError::BadIdentifier { .. })
        ));
        assert!(matches!(
            to_fragment("http://example.org/UBERON_0000955"),
            Err(ValidationError::BadIdentifier { .. })
        ));
        assert_eq!(to_fragment(""), Err(ValidationError::EmptyIdentifier));
        assert_eq!(to_fragment("   "), Err(ValidationError::EmptyIdentifier));
    }

    #[test]
    fn test_to_curie() {
        assert_eq!(to_curie("ilx_0101431").unwrap(), "ILX:0101431");
        assert_eq!(to_curie("tmp_123").unwrap(), "TMP:123");
        assert_eq!(
            to_curie("http://uri.interlex.org/base/ilx_0101431").unwrap(),
            "ILX:0101431"
        );
        assert_eq!(to_curie("ILX:0101431").unwrap(), "ILX:0101431");
    }

    #[test]
    fn test_to_iri() {
        assert_eq!(
            to_iri("ILX:0101431").unwrap(),
            "http://uri.interlex.org/base/ilx_0101431"
        );
        assert_eq!(
            to_iri("TMP:123").unwrap(),
            "http://uri.interlex.org/base/tmp_123"
        );
    }

    #[test]
    fn test_round_trips() {
        for id in ["ilx_0101431", "tmp_0738406"] {
            assert_eq!(to_fragment(&to_curie(id).unwrap()).unwrap(), id);
            assert_eq!(to_fragment(&to_iri(id).unwrap()).unwrap(), id);
            assert_eq!(
                to_curie(&to_iri(id).unwrap()).unwrap(),
                to_curie(id).unwrap()
            );
        }
    }
}

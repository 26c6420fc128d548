use crate::condition::Operator;
use crate::parameters::SearchModifier;
use serde::{Deserialize, Serialize};

/// Match semantics chosen for a single parameter occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchOperator {
    /// Default equality; case-insensitive for string parameters.
    Equals,
    /// Case-sensitive equality requested through `:exact`.
    ExactEquals,
    Contains,
    StartsWith,
    EndsWith,
}

impl MatchOperator {
    pub fn to_operator(self) -> Operator {
        match self {
            Self::Equals | Self::ExactEquals => Operator::Eq,
            Self::Contains => Operator::Contains,
            Self::StartsWith => Operator::StartsWith,
            Self::EndsWith => Operator::EndsWith,
        }
    }

    /// Whether the match compares text verbatim regardless of parameter type.
    pub fn is_case_sensitive(self) -> bool {
        matches!(self, Self::ExactEquals)
    }
}

/// Resolve the match operator for a modifier.
///
/// The modifier is honoured only when the parameter lists it as supported;
/// anything else falls back to equality.
pub fn resolve_operator(
    modifier: Option<SearchModifier>,
    supported: &[SearchModifier],
) -> MatchOperator {
    let Some(modifier) = modifier.filter(|m| supported.contains(m)) else {
        return MatchOperator::Equals;
    };
    match modifier {
        SearchModifier::Contains => MatchOperator::Contains,
        SearchModifier::StartsWith => MatchOperator::StartsWith,
        SearchModifier::EndsWith => MatchOperator::EndsWith,
        SearchModifier::Exact => MatchOperator::ExactEquals,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supported_modifiers_resolve() {
        let supported = SearchModifier::STRING_MODIFIERS;
        assert_eq!(
            resolve_operator(Some(SearchModifier::Contains), &supported),
            MatchOperator::Contains
        );
        assert_eq!(
            resolve_operator(Some(SearchModifier::StartsWith), &supported),
            MatchOperator::StartsWith
        );
        assert_eq!(
            resolve_operator(Some(SearchModifier::EndsWith), &supported),
            MatchOperator::EndsWith
        );
        assert_eq!(
            resolve_operator(Some(SearchModifier::Exact), &supported),
            MatchOperator::ExactEquals
        );
    }

    #[test]
    fn test_unsupported_or_missing_modifier_degrades_to_equality() {
        assert_eq!(resolve_operator(None, &SearchModifier::STRING_MODIFIERS), MatchOperator::Equals);
        assert_eq!(
            resolve_operator(Some(SearchModifier::Contains), &[]),
            MatchOperator::Equals
        );
        assert_eq!(
            resolve_operator(Some(SearchModifier::Contains), &[SearchModifier::Exact]),
            MatchOperator::Equals
        );
    }

    #[test]
    fn test_operator_mapping() {
        assert_eq!(MatchOperator::ExactEquals.to_operator(), Operator::Eq);
        assert_eq!(MatchOperator::Contains.to_operator(), Operator::Contains);
        assert!(MatchOperator::ExactEquals.is_case_sensitive());
        assert!(!MatchOperator::Equals.is_case_sensitive());
    }
}

use serde::{Deserialize, Serialize};
use std::fmt;

/// Search parameter types supported by the translation layer.
///
/// See <https://hl7.org/fhir/search.html#ptypes>.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchParameterType {
    /// Free text, matched case-insensitively unless `:exact` is used.
    String,
    /// Coded value or identifier, matched exactly.
    Token,
    /// FHIR `date` at year, month or day precision.
    Date,
}

impl SearchParameterType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Token => "token",
            Self::Date => "date",
        }
    }

    /// Parse from the FHIR type code.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "string" => Some(Self::String),
            "token" => Some(Self::Token),
            "date" => Some(Self::Date),
            _ => None,
        }
    }
}

impl fmt::Display for SearchParameterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Modifiers that may follow a parameter name, e.g. `given:contains`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SearchModifier {
    Contains,
    StartsWith,
    EndsWith,
    Exact,
}

impl SearchModifier {
    /// Every modifier a string parameter accepts.
    pub const STRING_MODIFIERS: [SearchModifier; 4] =
        [Self::Contains, Self::StartsWith, Self::EndsWith, Self::Exact];

    /// Parse a modifier suffix. Unknown modifiers yield `None`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "contains" => Some(Self::Contains),
            "starts-with" => Some(Self::StartsWith),
            "ends-with" => Some(Self::EndsWith),
            "exact" => Some(Self::Exact),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Contains => "contains",
            Self::StartsWith => "starts-with",
            Self::EndsWith => "ends-with",
            Self::Exact => "exact",
        }
    }
}

impl fmt::Display for SearchModifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Split a query key into the parameter name and its modifier suffix.
///
/// Only the first `:` is structural.
pub fn split_name_and_modifier(key: &str) -> (&str, Option<&str>) {
    match key.split_once(':') {
        Some((name, modifier)) => (name, Some(modifier)),
        None => (key, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modifier_roundtrip() {
        for modifier in SearchModifier::STRING_MODIFIERS {
            assert_eq!(SearchModifier::parse(modifier.as_str()), Some(modifier));
        }
        assert_eq!(SearchModifier::parse("missing"), None);
        assert_eq!(SearchModifier::parse(""), None);
    }

    #[test]
    fn test_split_name_and_modifier() {
        assert_eq!(split_name_and_modifier("given"), ("given", None));
        assert_eq!(
            split_name_and_modifier("given:starts-with"),
            ("given", Some("starts-with"))
        );
        assert_eq!(
            split_name_and_modifier("subject:identifier:x"),
            ("subject", Some("identifier:x"))
        );
    }

    #[test]
    fn test_parameter_type_parse() {
        assert_eq!(SearchParameterType::parse("date"), Some(SearchParameterType::Date));
        assert_eq!(SearchParameterType::parse("quantity"), None);
        assert_eq!(SearchParameterType::Token.to_string(), "token");
    }
}

//! Turns validated parameters into [`SearchCondition`]s.

use crate::condition::{SearchCondition, SqlValue};
use crate::filter;
use crate::operators::{MatchOperator, resolve_operator};
use crate::parameters::{SearchModifier, SearchParameterType};
use crate::query::NormalizedQuery;
use crate::registry::{FILTER_PARAM, ResourceDescriptorSet, SearchParameterDescriptor, guarded};
use crate::validation::SearchIssue;

/// Build the condition for one parameter occurrence.
///
/// The operator comes from the descriptor's override hook when present,
/// otherwise from the modifier. Hook failures are returned as messages.
pub fn build_field_condition(
    descriptor: &SearchParameterDescriptor,
    value: &SqlValue,
    modifier: Option<SearchModifier>,
) -> Result<SearchCondition, String> {
    let op = match descriptor.resolve_operator {
        Some(hook) => guarded(|| Ok(hook(value)))?,
        None => resolve_operator(modifier, &descriptor.modifiers),
    };
    build_with_operator(descriptor, value, op, modifier)
}

/// Build the condition for an already chosen operator.
pub fn build_with_operator(
    descriptor: &SearchParameterDescriptor,
    value: &SqlValue,
    op: MatchOperator,
    modifier: Option<SearchModifier>,
) -> Result<SearchCondition, String> {
    if let Some(hook) = descriptor.build_condition {
        return guarded(|| Ok(hook(&descriptor.target, value, op, modifier)));
    }

    let case_insensitive = descriptor.kind == SearchParameterType::String
        && matches!(value, SqlValue::Text(_))
        && !op.is_case_sensitive();
    let value = if case_insensitive {
        value.to_uppercase()
    } else {
        value.clone()
    };

    let leaves = descriptor
        .target
        .fields()
        .iter()
        .map(|field| SearchCondition::Compare {
            field: field.clone(),
            op: op.to_operator(),
            value: value.clone(),
            case_insensitive,
        })
        .collect();
    Ok(SearchCondition::or(leaves))
}

/// Exact equality used for identity lookups; hooks and case folding are skipped.
pub fn build_identity_condition(
    descriptor: &SearchParameterDescriptor,
    value: &SqlValue,
) -> SearchCondition {
    SearchCondition::or(
        descriptor
            .target
            .fields()
            .iter()
            .map(|field| SearchCondition::eq(field.clone(), value.clone()))
            .collect(),
    )
}

/// Conjoin every parameter condition of a query.
///
/// Identity lookups come first so that a missing identity short-circuits
/// the remaining predicates.
pub fn build_query_condition(
    query: &NormalizedQuery,
    set: &ResourceDescriptorSet,
) -> Result<SearchCondition, Vec<SearchIssue>> {
    let mut identity = Vec::new();
    let mut rest = Vec::new();
    let mut issues = Vec::new();

    for param in &query.params {
        let Some(descriptor) = set.get(&param.name) else {
            issues.push(SearchIssue::not_supported(&param.key));
            continue;
        };
        if descriptor.identity_lookup {
            identity.push(build_identity_condition(descriptor, &param.value));
            continue;
        }
        match build_field_condition(descriptor, &param.value, param.modifier) {
            Ok(condition) => rest.push(condition),
            Err(message) => issues.push(SearchIssue::invalid(&param.key, message)),
        }
    }

    if let Some(expression) = &query.filter {
        match filter::to_condition(expression, set) {
            Ok(condition) => rest.push(condition),
            Err(err) => issues.push(SearchIssue::invalid(FILTER_PARAM, err.to_string())),
        }
    }

    if !issues.is_empty() {
        return Err(issues);
    }
    identity.extend(rest);
    Ok(SearchCondition::and(identity))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::Operator;
    use crate::registry::FieldTarget;

    fn given() -> SearchParameterDescriptor {
        SearchParameterDescriptor::new(
            "given",
            SearchParameterType::String,
            FieldTarget::single("first_name"),
        )
        .with_modifiers(&SearchModifier::STRING_MODIFIERS)
    }

    fn leaf(field: &str, op: Operator, value: &str, ci: bool) -> SearchCondition {
        SearchCondition::Compare {
            field: field.to_string(),
            op,
            value: SqlValue::text(value),
            case_insensitive: ci,
        }
    }

    #[test]
    fn test_string_default_is_case_insensitive_equality() {
        let condition = build_field_condition(&given(), &SqlValue::text("Anna"), None).unwrap();
        assert_eq!(condition, leaf("first_name", Operator::Eq, "ANNA", true));
    }

    #[test]
    fn test_exact_modifier_keeps_case() {
        let condition = build_field_condition(
            &given(),
            &SqlValue::text("Anna"),
            Some(SearchModifier::Exact),
        )
        .unwrap();
        assert_eq!(condition, leaf("first_name", Operator::Eq, "Anna", false));
    }

    #[test]
    fn test_contains_modifier() {
        let condition = build_field_condition(
            &given(),
            &SqlValue::text("nn"),
            Some(SearchModifier::Contains),
        )
        .unwrap();
        assert_eq!(condition, leaf("first_name", Operator::Contains, "NN", true));
    }

    #[test]
    fn test_token_parameters_ignore_modifiers_and_case() {
        let gender = SearchParameterDescriptor::new(
            "gender",
            SearchParameterType::Token,
            FieldTarget::single("sex"),
        );
        let condition = build_field_condition(
            &gender,
            &SqlValue::text("female"),
            Some(SearchModifier::Contains),
        )
        .unwrap();
        assert_eq!(condition, leaf("sex", Operator::Eq, "female", false));
    }

    #[test]
    fn test_multi_field_fans_out_with_or() {
        let address = SearchParameterDescriptor::new(
            "address",
            SearchParameterType::String,
            FieldTarget::any_of(["city", "street"]),
        )
        .with_modifiers(&SearchModifier::STRING_MODIFIERS);
        let condition = build_field_condition(
            &address,
            &SqlValue::text("Suva"),
            Some(SearchModifier::StartsWith),
        )
        .unwrap();
        assert_eq!(
            condition,
            SearchCondition::Or(vec![
                leaf("city", Operator::StartsWith, "SUVA", true),
                leaf("street", Operator::StartsWith, "SUVA", true),
            ])
        );
    }

    #[test]
    fn test_operator_override_bypasses_modifier() {
        fn always_prefix(_: &SqlValue) -> MatchOperator {
            MatchOperator::StartsWith
        }
        let birthdate = SearchParameterDescriptor::new(
            "birthdate",
            SearchParameterType::Date,
            FieldTarget::single("date_of_birth"),
        )
        .with_operator_override(always_prefix);
        let condition =
            build_field_condition(&birthdate, &SqlValue::Date("1990".into()), None).unwrap();
        assert_eq!(
            condition,
            SearchCondition::compare(
                "date_of_birth",
                Operator::StartsWith,
                SqlValue::Date("1990".into())
            )
        );
    }

    #[test]
    fn test_panicking_override_is_reported() {
        fn broken(
            _: &FieldTarget,
            _: &SqlValue,
            _: MatchOperator,
            _: Option<SearchModifier>,
        ) -> SearchCondition {
            panic!("broken predicate")
        }
        let descriptor = given().with_condition_override(broken);
        let err = build_field_condition(&descriptor, &SqlValue::text("x"), None).unwrap_err();
        assert_eq!(err, "broken predicate");
    }
}

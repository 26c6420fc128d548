//! Built-in searchable resources.

use crate::condition::{Operator, SearchCondition, SqlValue};
use crate::operators::MatchOperator;
use crate::parameters::{SearchModifier, SearchParameterType};
use crate::registry::{
    BaseParameters, FieldTarget, ResourceDescriptorSet, SearchParameterDescriptor, SearchRegistry,
    ValidationRule,
};
use crate::settings::SearchSettings;
use clinfhir_core::{FhirDate, decode_identifier};

/// Visibility status of a patient record that is in use.
pub const ACTIVE_VISIBILITY: &str = "current";

/// Lab request status a `final` report corresponds to.
pub const PUBLISHED_STATUS: &str = "published";

/// Registry holding every built-in resource, configured from settings.
pub fn default_registry(settings: &SearchSettings) -> SearchRegistry {
    SearchRegistry::new(&settings.cursor_param)
        .with_resource(patient(settings))
        .with_resource(diagnostic_report(settings))
}

pub fn patient(settings: &SearchSettings) -> ResourceDescriptorSet {
    let (default_count, max_count) = settings.count_limits("Patient");
    let all_modifiers = &SearchModifier::STRING_MODIFIERS;

    ResourceDescriptorSet::new("Patient", "patients")
        .with_base(BaseParameters {
            default_count,
            max_count,
            ..BaseParameters::default()
        })
        .with_parameter(
            SearchParameterDescriptor::new(
                "identifier",
                SearchParameterType::Token,
                FieldTarget::single("display_id"),
            )
            .with_rule(ValidationRule::NamespacedIdentifier {
                namespace: settings.identifier_namespace.clone(),
            })
            .with_transform(identifier_value)
            .identity_lookup()
            .with_description("Patient display id as <namespace>|<id>"),
        )
        .with_parameter(
            SearchParameterDescriptor::new(
                "given",
                SearchParameterType::String,
                FieldTarget::single("first_name"),
            )
            .with_modifiers(all_modifiers)
            .sortable(),
        )
        .with_parameter(
            SearchParameterDescriptor::new(
                "family",
                SearchParameterType::String,
                FieldTarget::single("last_name"),
            )
            .with_modifiers(all_modifiers)
            .sortable(),
        )
        .with_parameter(
            SearchParameterDescriptor::new(
                "gender",
                SearchParameterType::Token,
                FieldTarget::single("sex"),
            )
            .with_rule(ValidationRule::one_of(["male", "female", "other"])),
        )
        .with_parameter(
            SearchParameterDescriptor::new(
                "birthdate",
                SearchParameterType::Date,
                FieldTarget::single("date_of_birth"),
            )
            .with_rule(ValidationRule::Date)
            .with_transform(fhir_date)
            .with_operator_override(date_precision_operator)
            .sortable()
            .with_description("Partial dates match every day they cover"),
        )
        .with_parameter(
            SearchParameterDescriptor::new(
                "address",
                SearchParameterType::String,
                FieldTarget::any_of([
                    "additional_data.city_town",
                    "additional_data.street_village",
                ]),
            )
            .with_modifiers(all_modifiers)
            .sortable(),
        )
        .with_parameter(
            SearchParameterDescriptor::new(
                "address-city",
                SearchParameterType::String,
                FieldTarget::single("additional_data.city_town"),
            )
            .with_modifiers(all_modifiers)
            .sortable(),
        )
        .with_parameter(
            SearchParameterDescriptor::new(
                "telecom",
                SearchParameterType::Token,
                FieldTarget::any_of([
                    "additional_data.primary_contact_number",
                    "additional_data.secondary_contact_number",
                ]),
            )
            .sortable(),
        )
        .with_parameter(
            SearchParameterDescriptor::new(
                "deceased",
                SearchParameterType::Token,
                FieldTarget::single("date_of_death"),
            )
            .with_rule(ValidationRule::Boolean)
            .with_transform(boolean)
            .with_condition_override(deceased_condition),
        )
        .with_parameter(
            SearchParameterDescriptor::new(
                "active",
                SearchParameterType::Token,
                FieldTarget::single("visibility_status"),
            )
            .with_rule(ValidationRule::Boolean)
            .with_transform(boolean)
            .with_condition_override(active_condition),
        )
}

pub fn diagnostic_report(settings: &SearchSettings) -> ResourceDescriptorSet {
    let (default_count, max_count) = settings.count_limits("DiagnosticReport");

    ResourceDescriptorSet::new("DiagnosticReport", "diagnostic_reports")
        .with_base(BaseParameters {
            default_count,
            max_count,
            default_sort: Some("-issued".to_string()),
            required: vec!["subject:identifier".to_string()],
            includes: vec![
                "DiagnosticReport:result".to_string(),
                "DiagnosticReport:result.device:Device".to_string(),
            ],
            filter: false,
            ..BaseParameters::default()
        })
        .with_parameter(
            SearchParameterDescriptor::new(
                "subject:identifier",
                SearchParameterType::Token,
                FieldTarget::single("patient.display_id"),
            )
            .with_rule(ValidationRule::NamespacedIdentifier {
                namespace: settings.identifier_namespace.clone(),
            })
            .with_transform(identifier_value)
            .identity_lookup(),
        )
        .with_parameter(
            SearchParameterDescriptor::new(
                "status",
                SearchParameterType::Token,
                FieldTarget::single("lab_request.status"),
            )
            .with_rule(ValidationRule::one_of(["final"]))
            .with_transform(report_status),
        )
        .with_parameter(
            SearchParameterDescriptor::new(
                "issued",
                SearchParameterType::Date,
                FieldTarget::single("lab_request.published_date"),
            )
            .with_rule(ValidationRule::Date)
            .with_transform(fhir_date)
            .with_operator_override(date_prefix_operator)
            .sortable(),
        )
}

fn identifier_value(raw: &str) -> Result<SqlValue, String> {
    match decode_identifier(raw) {
        (_, Some(value)) => Ok(SqlValue::text(value)),
        _ => Err(format!("identifier \"{raw}\" has no value")),
    }
}

fn fhir_date(raw: &str) -> Result<SqlValue, String> {
    raw.parse::<FhirDate>()
        .map(|date| SqlValue::Date(date.to_string()))
        .map_err(|_| format!("Invalid date/time format: {raw}"))
}

fn boolean(raw: &str) -> Result<SqlValue, String> {
    raw.parse::<bool>()
        .map(SqlValue::Boolean)
        .map_err(|_| format!("expected true or false, got \"{raw}\""))
}

fn report_status(raw: &str) -> Result<SqlValue, String> {
    match raw {
        "final" => Ok(SqlValue::text(PUBLISHED_STATUS)),
        other => Err(format!("unsupported report status \"{other}\"")),
    }
}

/// Partial dates match by prefix; full dates match exactly.
fn date_precision_operator(value: &SqlValue) -> MatchOperator {
    match value {
        SqlValue::Date(date) if date.len() < 10 => MatchOperator::StartsWith,
        _ => MatchOperator::Equals,
    }
}

/// Date-time columns always match by prefix.
fn date_prefix_operator(_: &SqlValue) -> MatchOperator {
    MatchOperator::StartsWith
}

fn deceased_condition(
    target: &FieldTarget,
    value: &SqlValue,
    _: MatchOperator,
    _: Option<SearchModifier>,
) -> SearchCondition {
    let deceased = matches!(value, SqlValue::Boolean(true));
    let fields = target.fields().iter();
    if deceased {
        SearchCondition::or(fields.map(|f| SearchCondition::IsNotNull(f.clone())).collect())
    } else {
        SearchCondition::and(fields.map(|f| SearchCondition::IsNull(f.clone())).collect())
    }
}

fn active_condition(
    target: &FieldTarget,
    value: &SqlValue,
    _: MatchOperator,
    _: Option<SearchModifier>,
) -> SearchCondition {
    let active = matches!(value, SqlValue::Boolean(true));
    let current = SqlValue::text(ACTIVE_VISIBILITY);
    let per_field = target.fields().iter().map(|field| {
        if active {
            SearchCondition::eq(field.clone(), current.clone())
        } else {
            SearchCondition::or(vec![
                SearchCondition::compare(field.clone(), Operator::Ne, current.clone()),
                SearchCondition::IsNull(field.clone()),
            ])
        }
    });
    SearchCondition::and(per_field.collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predicate::{build_field_condition, build_query_condition};
    use crate::query::RawQuery;
    use crate::validation::validate_query;

    fn registry() -> SearchRegistry {
        default_registry(&SearchSettings::default())
    }

    #[test]
    fn test_partial_birthdate_matches_by_prefix() {
        let registry = registry();
        let birthdate = registry.lookup("Patient", "birthdate").unwrap();
        let condition =
            build_field_condition(birthdate, &SqlValue::Date("1990-05".into()), None).unwrap();
        assert_eq!(
            condition,
            SearchCondition::compare(
                "date_of_birth",
                Operator::StartsWith,
                SqlValue::Date("1990-05".into())
            )
        );

        let condition =
            build_field_condition(birthdate, &SqlValue::Date("1990-05-20".into()), None).unwrap();
        assert_eq!(
            condition,
            SearchCondition::eq("date_of_birth", SqlValue::Date("1990-05-20".into()))
        );
    }

    #[test]
    fn test_deceased_and_active_overrides() {
        let registry = registry();
        let deceased = registry.lookup("Patient", "deceased").unwrap();
        assert_eq!(
            build_field_condition(deceased, &SqlValue::Boolean(true), None).unwrap(),
            SearchCondition::IsNotNull("date_of_death".into())
        );
        assert_eq!(
            build_field_condition(deceased, &SqlValue::Boolean(false), None).unwrap(),
            SearchCondition::IsNull("date_of_death".into())
        );

        let active = registry.lookup("Patient", "active").unwrap();
        assert_eq!(
            build_field_condition(active, &SqlValue::Boolean(true), None).unwrap(),
            SearchCondition::eq("visibility_status", SqlValue::text("current"))
        );
    }

    #[test]
    fn test_report_status_is_translated() {
        let settings = SearchSettings::default();
        let raw = RawQuery::from_pairs([
            (
                "subject:identifier".to_string(),
                format!("{}|P-1", settings.identifier_namespace),
            ),
            ("status".to_string(), "final".to_string()),
        ]);
        let registry = default_registry(&settings);
        let query = validate_query(&registry, "DiagnosticReport", &raw).unwrap();
        let set = registry.describe("DiagnosticReport").unwrap();
        let condition = build_query_condition(&query, set).unwrap();
        assert_eq!(
            condition,
            SearchCondition::And(vec![
                SearchCondition::eq("patient.display_id", SqlValue::text("P-1")),
                SearchCondition::eq("lab_request.status", SqlValue::text("published")),
            ])
        );
    }

    #[test]
    fn test_identity_lookup_comes_first() {
        let settings = SearchSettings::default();
        let raw = RawQuery::from_pairs([
            ("given".to_string(), "Anna".to_string()),
            (
                "identifier".to_string(),
                format!("{}|P-1", settings.identifier_namespace),
            ),
        ]);
        let registry = default_registry(&settings);
        let query = validate_query(&registry, "Patient", &raw).unwrap();
        let condition = build_query_condition(&query, registry.describe("Patient").unwrap()).unwrap();
        let SearchCondition::And(parts) = condition else {
            panic!("expected conjunction");
        };
        assert_eq!(parts[0], SearchCondition::eq("display_id", SqlValue::text("P-1")));
    }

    #[test]
    fn test_count_limits_follow_settings() {
        let mut settings = SearchSettings {
            default_count: 10,
            max_count: 100,
            ..SearchSettings::default()
        };
        settings.resources.insert(
            "DiagnosticReport".into(),
            crate::settings::ResourceSettings {
                default_count: None,
                max_count: Some(20),
            },
        );
        let registry = default_registry(&settings);
        assert_eq!(registry.describe("Patient").unwrap().base.max_count, 100);
        assert_eq!(registry.describe("DiagnosticReport").unwrap().base.max_count, 20);
        assert_eq!(registry.describe("DiagnosticReport").unwrap().base.default_count, 10);
    }
}

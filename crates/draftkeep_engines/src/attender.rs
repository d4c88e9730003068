#![forbid(unsafe_code)]

//! The attender (local guide) application: six steps, the last being a consent gate.

use draftkeep_kernel_contracts::form::{FieldValue, FormRecord};
use draftkeep_kernel_contracts::ContractViolation;

use crate::progress::{ChecklistItem, EmptinessRule, StepCatalog, StepDefinition};
use crate::validation::{FieldRule, RuleSetValidator};

pub const ATTENDER_APPLICATION_FORM_KEY: &str = "attender_application";
pub const ATTENDER_APPLICATION_SCHEMA_VERSION: &str = "1.0";

pub const LOCATION_SUBFIELDS: [&str; 3] = ["city", "country", "address"];

fn location_subfields() -> Vec<String> {
    LOCATION_SUBFIELDS.iter().map(|s| s.to_string()).collect()
}

pub fn attender_application_initial_record() -> FormRecord {
    FormRecord::from_pairs([
        ("first_name", FieldValue::text("")),
        ("last_name", FieldValue::text("")),
        ("email", FieldValue::text("")),
        ("phone", FieldValue::text("")),
        (
            "location",
            FieldValue::object(LOCATION_SUBFIELDS.map(|s| (s, FieldValue::text("")))),
        ),
        ("bio", FieldValue::text("")),
        ("languages", FieldValue::List(Vec::new())),
        ("specialties", FieldValue::List(Vec::new())),
        ("years_experience", FieldValue::Null),
        ("weekdays", FieldValue::List(Vec::new())),
        ("max_group_size", FieldValue::Null),
        ("hourly_rate", FieldValue::Null),
        ("id_document", FieldValue::Null),
        ("profile_photo", FieldValue::Null),
        ("terms_accepted", FieldValue::Null),
        ("background_check_consent", FieldValue::Null),
    ])
}

pub fn attender_application_v1() -> Result<StepCatalog, ContractViolation> {
    StepCatalog::v1(vec![
        StepDefinition::v1(
            "personal_info",
            true,
            vec![
                ChecklistItem::new("first_name", EmptinessRule::NonBlankText),
                ChecklistItem::new("last_name", EmptinessRule::NonBlankText),
                ChecklistItem::new("email", EmptinessRule::NonBlankText),
                ChecklistItem::new("phone", EmptinessRule::NonBlankText),
            ],
        )?,
        StepDefinition::v1(
            "location",
            true,
            vec![ChecklistItem::new(
                "location",
                EmptinessRule::Subfields(location_subfields()),
            )],
        )?,
        StepDefinition::v1(
            "experience",
            true,
            vec![
                ChecklistItem::new("bio", EmptinessRule::NonBlankText),
                ChecklistItem::new("languages", EmptinessRule::NonEmptyList),
                ChecklistItem::new("years_experience", EmptinessRule::Defined),
            ],
        )?
        .with_extra_fields(["specialties"]),
        StepDefinition::v1(
            "availability",
            true,
            vec![
                ChecklistItem::new("weekdays", EmptinessRule::NonEmptyList),
                ChecklistItem::new("max_group_size", EmptinessRule::Defined),
                ChecklistItem::new("hourly_rate", EmptinessRule::Defined),
            ],
        )?,
        StepDefinition::v1(
            "documents",
            false,
            vec![
                ChecklistItem::new("id_document", EmptinessRule::FilePresent),
                ChecklistItem::new("profile_photo", EmptinessRule::FilePresent),
            ],
        )?,
        StepDefinition::v1(
            "agreement",
            true,
            vec![
                ChecklistItem::new("terms_accepted", EmptinessRule::Defined),
                ChecklistItem::new("background_check_consent", EmptinessRule::Defined),
            ],
        )?,
    ])
}

pub fn attender_application_validator() -> RuleSetValidator {
    RuleSetValidator::new()
        .rule("first_name", FieldRule::Required, "First name is required")
        .rule("first_name", FieldRule::MaxLength(60), "First name is too long")
        .rule("last_name", FieldRule::Required, "Last name is required")
        .rule("last_name", FieldRule::MaxLength(60), "Last name is too long")
        .rule("email", FieldRule::Required, "Email is required")
        .rule("email", FieldRule::Email, "Enter a valid email address")
        .rule("phone", FieldRule::Required, "Phone number is required")
        .rule(
            "phone",
            FieldRule::Phone { min_digits: 7 },
            "Enter a valid phone number",
        )
        .rule(
            "location",
            FieldRule::RequiredSubfields(location_subfields()),
            "This field is required",
        )
        .rule("bio", FieldRule::Required, "Tell travellers about yourself")
        .rule(
            "bio",
            FieldRule::MinLength(50),
            "Bio must be at least 50 characters",
        )
        .rule("bio", FieldRule::MaxLength(2_000), "Bio is too long")
        .rule("languages", FieldRule::MinItems(1), "Select at least one language")
        .rule("years_experience", FieldRule::Required, "Years of experience is required")
        .rule("weekdays", FieldRule::MinItems(1), "Select at least one day")
        .rule("max_group_size", FieldRule::Required, "Group size is required")
        .rule("hourly_rate", FieldRule::Required, "Hourly rate is required")
        .rule(
            "terms_accepted",
            FieldRule::MustBeTrue,
            "You must accept the terms of service",
        )
        .rule(
            "background_check_consent",
            FieldRule::MustBeTrue,
            "Background check consent is required",
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use draftkeep_kernel_contracts::form::{ErrorSet, FileRef, FormValidator};
    use draftkeep_kernel_contracts::progress::ProgressMode;

    #[test]
    fn at_attender_01_initial_record_reports_zero_progress() {
        let catalog = attender_application_v1().unwrap();
        let values = attender_application_initial_record();
        assert_eq!(
            catalog.overall_progress(&values, &ErrorSet::new(), ProgressMode::AllSteps),
            0
        );
        for step in catalog.steps() {
            for item in &step.checklist {
                assert!(
                    values.contains_field(&item.field),
                    "initial record missing {}",
                    item.field
                );
            }
        }
    }

    #[test]
    fn at_attender_02_documents_step_is_optional() {
        let catalog = attender_application_v1().unwrap();
        let required: Vec<&str> = catalog
            .visible_steps(ProgressMode::RequiredOnly)
            .map(|s| s.key.as_str())
            .collect();
        assert_eq!(
            required,
            vec![
                "personal_info",
                "location",
                "experience",
                "availability",
                "agreement"
            ]
        );
        assert_eq!(catalog.visible_steps(ProgressMode::AllSteps).count(), 6);
    }

    #[test]
    fn at_attender_03_declining_terms_counts_as_answered_but_invalid() {
        let catalog = attender_application_v1().unwrap();
        let mut values = attender_application_initial_record();
        values.insert("terms_accepted", FieldValue::Bool(false));
        values.insert("background_check_consent", FieldValue::Bool(true));

        let errors = attender_application_validator().validate(&values);
        let status = catalog
            .compute_step_status("agreement", &values, &errors)
            .unwrap();
        assert!(status.completed);
        assert!(status.has_error);
    }

    #[test]
    fn at_attender_04_complete_application_validates_clean() {
        let mut v = attender_application_initial_record();
        v.insert("first_name", FieldValue::text("Ana"));
        v.insert("last_name", FieldValue::text("Silva"));
        v.insert("email", FieldValue::text("ana@example.pt"));
        v.insert("phone", FieldValue::text("+351 912 345 678"));
        v.insert(
            "location",
            FieldValue::object([
                ("city", FieldValue::text("Porto")),
                ("country", FieldValue::text("Portugal")),
                ("address", FieldValue::text("Rua das Flores 10")),
            ]),
        );
        v.insert(
            "bio",
            FieldValue::text(
                "Born and raised in Porto, I run food walks through Ribeira and Bonfim.",
            ),
        );
        v.insert(
            "languages",
            FieldValue::List(vec![FieldValue::text("pt"), FieldValue::text("en")]),
        );
        v.insert("years_experience", FieldValue::Number(6.0));
        v.insert("weekdays", FieldValue::List(vec![FieldValue::text("sat")]));
        v.insert("max_group_size", FieldValue::Number(8.0));
        v.insert("hourly_rate", FieldValue::Number(35.0));
        v.insert(
            "id_document",
            FieldValue::File(
                FileRef::v1("passport.pdf".to_string(), 120_000, "application/pdf".to_string())
                    .unwrap(),
            ),
        );
        v.insert("terms_accepted", FieldValue::Bool(true));
        v.insert("background_check_consent", FieldValue::Bool(true));

        let errors = attender_application_validator().validate(&v);
        assert!(errors.is_empty(), "unexpected errors: {errors:?}");

        let catalog = attender_application_v1().unwrap();
        assert_eq!(
            catalog.overall_progress(&v, &errors, ProgressMode::RequiredOnly),
            100
        );
        // profile_photo missing: documents at 50, six steps -> (500 + 50) / 6 rounded.
        assert_eq!(
            catalog.overall_progress(&v, &errors, ProgressMode::AllSteps),
            92
        );
    }
}

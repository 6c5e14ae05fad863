//! Dynamic Form Schema
//!
//! Derives the customer-record form contract from a completed cascade.
//! The candidate field set is closed; each rule is a pure function of the
//! resolved contract type's category and the segment's kind:
//!
//! ```text
//! always        first/last name, fiscal code, birth date (required)
//!               email, phone (optional)
//! business      company name, tax id (required)
//! telephony     technology (required), migration, current operator
//! energy        metering point, supply address (required)
//! ```

pub mod canonical;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::catalog::{ContractCategory, SegmentKind};
use crate::error::CascadeError;
use crate::resolver::ResolvedSelection;

pub use canonical::{CanonicalEntry, CanonicalSelection, CanonicalTable, CanonicalValue};

// =============================================================================
// FIELDS
// =============================================================================

/// Candidate fields of the customer-record form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormField {
    FirstName,
    LastName,
    FiscalCode,
    BirthDate,
    Email,
    Phone,
    CompanyName,
    TaxId,
    Technology,
    Migration,
    CurrentOperator,
    MeteringPoint,
    SupplyAddress,
}

impl FormField {
    pub const ALL: [FormField; 13] = [
        FormField::FirstName,
        FormField::LastName,
        FormField::FiscalCode,
        FormField::BirthDate,
        FormField::Email,
        FormField::Phone,
        FormField::CompanyName,
        FormField::TaxId,
        FormField::Technology,
        FormField::Migration,
        FormField::CurrentOperator,
        FormField::MeteringPoint,
        FormField::SupplyAddress,
    ];

    const PERSONAL: [FormField; 4] = [
        FormField::FirstName,
        FormField::LastName,
        FormField::FiscalCode,
        FormField::BirthDate,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FormField::FirstName => "first_name",
            FormField::LastName => "last_name",
            FormField::FiscalCode => "fiscal_code",
            FormField::BirthDate => "birth_date",
            FormField::Email => "email",
            FormField::Phone => "phone",
            FormField::CompanyName => "company_name",
            FormField::TaxId => "tax_id",
            FormField::Technology => "technology",
            FormField::Migration => "migration",
            FormField::CurrentOperator => "current_operator",
            FormField::MeteringPoint => "metering_point",
            FormField::SupplyAddress => "supply_address",
        }
    }
}

impl fmt::Display for FormField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Visibility and requirement of one field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct FieldRule {
    pub visible: bool,
    pub required: bool,
}

impl FieldRule {
    pub const HIDDEN: FieldRule = FieldRule {
        visible: false,
        required: false,
    };
    pub const OPTIONAL: FieldRule = FieldRule {
        visible: true,
        required: false,
    };
    pub const REQUIRED: FieldRule = FieldRule {
        visible: true,
        required: true,
    };
}

// =============================================================================
// SCHEMA
// =============================================================================

/// Field name → rule, over every candidate field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FormSchema {
    fields: BTreeMap<FormField, FieldRule>,
}

impl FormSchema {
    /// Every field hidden
    fn hidden() -> Self {
        Self {
            fields: FormField::ALL
                .into_iter()
                .map(|field| (field, FieldRule::HIDDEN))
                .collect(),
        }
    }

    fn set(&mut self, field: FormField, rule: FieldRule) {
        self.fields.insert(field, rule);
    }

    pub fn rule(&self, field: FormField) -> FieldRule {
        self.fields.get(&field).copied().unwrap_or_default()
    }

    pub fn is_visible(&self, field: FormField) -> bool {
        self.rule(field).visible
    }

    pub fn is_required(&self, field: FormField) -> bool {
        self.rule(field).required
    }

    pub fn visible_fields(&self) -> Vec<FormField> {
        self.fields
            .iter()
            .filter(|(_, rule)| rule.visible)
            .map(|(field, _)| *field)
            .collect()
    }

    pub fn required_fields(&self) -> Vec<FormField> {
        self.fields
            .iter()
            .filter(|(_, rule)| rule.required)
            .map(|(field, _)| *field)
            .collect()
    }

    /// Check a record against the schema
    ///
    /// Fails on the first required field (in field order) that is missing or
    /// blank. Values of hidden fields are dropped from the returned record.
    pub fn validate(&self, record: CustomerRecord) -> Result<CustomerRecord, CascadeError> {
        for field in self.required_fields() {
            let present = record
                .get(field)
                .map(|value| !value.trim().is_empty())
                .unwrap_or(false);
            if !present {
                return Err(CascadeError::MissingRequiredField { field });
            }
        }

        let values = record
            .values
            .into_iter()
            .filter(|(field, _)| self.is_visible(*field))
            .collect();
        Ok(CustomerRecord { values })
    }

    /// JSON contract for the form layer: `{ "field": { "visible", "required" } }`
    pub fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }
}

/// Field values entered for a new customer record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomerRecord {
    values: BTreeMap<FormField, String>,
}

impl CustomerRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: FormField, value: impl Into<String>) -> Self {
        self.set(field, value);
        self
    }

    pub fn set(&mut self, field: FormField, value: impl Into<String>) {
        self.values.insert(field, value.into());
    }

    pub fn get(&self, field: FormField) -> Option<&str> {
        self.values.get(&field).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (FormField, &str)> {
        self.values.iter().map(|(field, value)| (*field, value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

// =============================================================================
// BUILDER
// =============================================================================

/// Derives the [`FormSchema`] of a completed cascade
#[derive(Debug, Clone, Copy, Default)]
pub struct DynamicFormSchemaBuilder;

impl DynamicFormSchemaBuilder {
    pub fn new() -> Self {
        Self
    }

    pub fn build(&self, selection: &ResolvedSelection) -> FormSchema {
        let schema = self.build_for(selection.category(), selection.segment_kind());
        tracing::debug!(
            contract_type = %selection.contract_type.id,
            segment = %selection.segment.id,
            visible = schema.visible_fields().len(),
            required = schema.required_fields().len(),
            "Form schema derived"
        );
        schema
    }

    /// Schema for a category/kind pair
    pub fn build_for(&self, category: ContractCategory, kind: SegmentKind) -> FormSchema {
        let mut schema = FormSchema::hidden();

        for field in FormField::PERSONAL {
            schema.set(field, FieldRule::REQUIRED);
        }
        schema.set(FormField::Email, FieldRule::OPTIONAL);
        schema.set(FormField::Phone, FieldRule::OPTIONAL);

        if kind == SegmentKind::Business {
            schema.set(FormField::CompanyName, FieldRule::REQUIRED);
            schema.set(FormField::TaxId, FieldRule::REQUIRED);
        }

        match category {
            ContractCategory::Telephony => {
                schema.set(FormField::Technology, FieldRule::REQUIRED);
                schema.set(FormField::Migration, FieldRule::OPTIONAL);
                schema.set(FormField::CurrentOperator, FieldRule::OPTIONAL);
            }
            ContractCategory::Energy => {
                schema.set(FormField::MeteringPoint, FieldRule::REQUIRED);
                schema.set(FormField::SupplyAddress, FieldRule::REQUIRED);
            }
            ContractCategory::Other => {}
        }

        schema
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> DynamicFormSchemaBuilder {
        DynamicFormSchemaBuilder::new()
    }

    #[test]
    fn test_business_telephony_schema() {
        let schema = builder().build_for(ContractCategory::Telephony, SegmentKind::Business);

        assert_eq!(schema.rule(FormField::CompanyName), FieldRule::REQUIRED);
        assert_eq!(schema.rule(FormField::TaxId), FieldRule::REQUIRED);
        assert!(schema.is_visible(FormField::Technology));
        assert!(schema.is_visible(FormField::Migration));
        assert!(!schema.is_visible(FormField::MeteringPoint));
        assert!(schema.is_required(FormField::FiscalCode));
    }

    #[test]
    fn test_private_energy_schema() {
        let schema = builder().build_for(ContractCategory::Energy, SegmentKind::Private);

        assert!(!schema.is_visible(FormField::CompanyName));
        assert!(!schema.is_visible(FormField::Technology));
        assert_eq!(schema.rule(FormField::MeteringPoint), FieldRule::REQUIRED);
        assert_eq!(schema.rule(FormField::SupplyAddress), FieldRule::REQUIRED);
    }

    #[test]
    fn test_other_category_has_no_conditional_fields() {
        let schema = builder().build_for(ContractCategory::Other, SegmentKind::Private);
        assert_eq!(
            schema.visible_fields(),
            vec![
                FormField::FirstName,
                FormField::LastName,
                FormField::FiscalCode,
                FormField::BirthDate,
                FormField::Email,
                FormField::Phone,
            ]
        );
    }

    #[test]
    fn test_schema_derivation_is_deterministic() {
        let first = builder().build_for(ContractCategory::Telephony, SegmentKind::Business);
        let second = builder().build_for(ContractCategory::Telephony, SegmentKind::Business);
        assert_eq!(first, second);
        assert_eq!(first.to_json().unwrap(), second.to_json().unwrap());
    }

    #[test]
    fn test_validate_requires_visible_required_fields() {
        let schema = builder().build_for(ContractCategory::Energy, SegmentKind::Private);
        let record = CustomerRecord::new()
            .with(FormField::FirstName, "Ada")
            .with(FormField::LastName, "Rossi")
            .with(FormField::FiscalCode, "RSSDAA80A01H501U")
            .with(FormField::BirthDate, "1980-01-01")
            .with(FormField::MeteringPoint, "  ");

        assert_eq!(
            schema.validate(record),
            Err(CascadeError::MissingRequiredField {
                field: FormField::MeteringPoint
            })
        );
    }

    #[test]
    fn test_validate_drops_hidden_fields() {
        let schema = builder().build_for(ContractCategory::Other, SegmentKind::Private);
        let record = CustomerRecord::new()
            .with(FormField::FirstName, "Ada")
            .with(FormField::LastName, "Rossi")
            .with(FormField::FiscalCode, "RSSDAA80A01H501U")
            .with(FormField::BirthDate, "1980-01-01")
            .with(FormField::TaxId, "IT01234567890");

        let validated = schema.validate(record).unwrap();
        assert_eq!(validated.len(), 4);
        assert_eq!(validated.get(FormField::TaxId), None);
    }

    #[test]
    fn test_json_contract_shape() {
        let schema = builder().build_for(ContractCategory::Telephony, SegmentKind::Private);
        let json = schema.to_json().unwrap();
        assert_eq!(json["technology"]["required"], serde_json::json!(true));
        assert_eq!(json["company_name"]["visible"], serde_json::json!(false));
    }
}

//! Clinical extraction fields and the editable field store.
//!
//! The extraction result is a fixed set of eight fields. Two of them
//! (recommended doses, medicine names) are ordered lists; the rest are plain
//! text. Every field is always present after normalization, absent values
//! falling back to the "Unknown" sentinel.

use std::collections::HashMap;

use thiserror::Error;

/// Sentinel substituted for any field the extraction response omits.
pub const SENTINEL: &str = "Unknown";

/// The eight clinical fields extracted from a transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    PersonName,
    PersonAge,
    PersonGender,
    DoctorName,
    PastTests,
    Symptoms,
    RecommendedDoses,
    MedicineNames,
}

/// Declared value shape of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    List,
}

impl Field {
    /// All fields in presentation order.
    pub const ALL: [Field; 8] = [
        Field::PersonName,
        Field::PersonAge,
        Field::PersonGender,
        Field::DoctorName,
        Field::PastTests,
        Field::Symptoms,
        Field::RecommendedDoses,
        Field::MedicineNames,
    ];

    /// Canonical label, matching the keys requested from the completion service.
    pub fn label(&self) -> &'static str {
        match self {
            Field::PersonName => "Name of the person",
            Field::PersonAge => "Age of the person",
            Field::PersonGender => "Gender of the person",
            Field::DoctorName => "Name of the doctor",
            Field::PastTests => "Past tests",
            Field::Symptoms => "Symptoms",
            Field::RecommendedDoses => "Recommended doses",
            Field::MedicineNames => "Medicine names",
        }
    }

    /// Whether the field holds a scalar string or an ordered list.
    pub fn kind(&self) -> FieldKind {
        match self {
            Field::RecommendedDoses | Field::MedicineNames => FieldKind::List,
            _ => FieldKind::Text,
        }
    }

    /// Look up a field by its 1-based position in [`Field::ALL`] (the numbers
    /// shown by the `show` command).
    pub fn from_index(index: usize) -> Option<Field> {
        if (1..=Field::ALL.len()).contains(&index) {
            Some(Field::ALL[index - 1])
        } else {
            None
        }
    }
}

/// A field value: free text for scalar fields, an ordered list for list fields.
/// Values are never validated beyond their shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    List(Vec<String>),
}

impl FieldValue {
    /// Shape of this value.
    pub fn kind(&self) -> FieldKind {
        match self {
            FieldValue::Text(_) => FieldKind::Text,
            FieldValue::List(_) => FieldKind::List,
        }
    }

    /// Single-line rendering for display (lists join with ", ").
    pub fn display(&self) -> String {
        match self {
            FieldValue::Text(text) => text.clone(),
            FieldValue::List(items) => items.join(", "),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FieldError {
    #[error("field '{field}' holds a {expected:?} value, got {got:?}")]
    KindMismatch { field: &'static str, expected: FieldKind, got: FieldKind },
}

/// The editable field store: every [`Field`] maps to exactly one value.
///
/// Iteration follows [`Field::ALL`] order regardless of edit history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMap {
    values: HashMap<Field, FieldValue>,
}

impl FieldMap {
    /// Create a map with every field set to its sentinel value.
    pub fn with_sentinels() -> Self {
        let mut values = HashMap::with_capacity(Field::ALL.len());
        for field in Field::ALL {
            values.insert(field, sentinel_value(field));
        }
        Self { values }
    }

    /// Get a field's value. Every field is always present.
    pub fn get(&self, field: Field) -> &FieldValue {
        // with_sentinels and set together guarantee presence
        self.values.get(&field).unwrap_or_else(|| unreachable!("field {:?} missing from map", field))
    }

    /// Replace a field's value. The value shape must match the field's
    /// declared kind; list fields cannot be collapsed into scalars or vice versa.
    pub fn set(&mut self, field: Field, value: FieldValue) -> Result<(), FieldError> {
        if value.kind() != field.kind() {
            return Err(FieldError::KindMismatch { field: field.label(), expected: field.kind(), got: value.kind() });
        }
        self.values.insert(field, value);
        Ok(())
    }

    /// Apply a console edit. Scalar fields take the text verbatim; list fields
    /// split on line boundaries, one element per line. Empty lines (including
    /// trailing ones) become empty elements.
    pub fn set_from_text(&mut self, field: Field, text: &str) {
        let value = match field.kind() {
            FieldKind::Text => FieldValue::Text(text.to_string()),
            FieldKind::List => FieldValue::List(text.split('\n').map(str::to_string).collect()),
        };
        // Shape is derived from the field's own kind, so set cannot fail here.
        let _ = self.set(field, value);
    }

    /// Iterate fields and values in presentation order.
    pub fn iter(&self) -> impl Iterator<Item = (Field, &FieldValue)> {
        Field::ALL.iter().map(move |&field| (field, self.get(field)))
    }
}

/// Sentinel value matching a field's declared kind.
pub fn sentinel_value(field: Field) -> FieldValue {
    match field.kind() {
        FieldKind::Text => FieldValue::Text(SENTINEL.to_string()),
        FieldKind::List => FieldValue::List(vec![SENTINEL.to_string()]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_field_present_after_construction() {
        let map = FieldMap::with_sentinels();
        for field in Field::ALL {
            assert_eq!(map.get(field), &sentinel_value(field));
        }
    }

    #[test]
    fn set_rejects_kind_mismatch() {
        let mut map = FieldMap::with_sentinels();
        let err = map.set(Field::PersonAge, FieldValue::List(vec!["42".into()])).unwrap_err();
        assert_eq!(err, FieldError::KindMismatch { field: "Age of the person", expected: FieldKind::Text, got: FieldKind::List });
        // Failed set leaves the previous value in place
        assert_eq!(map.get(Field::PersonAge), &FieldValue::Text(SENTINEL.into()));
    }

    #[test]
    fn list_edit_round_trips_on_line_boundaries() {
        let mut map = FieldMap::with_sentinels();
        map.set_from_text(Field::MedicineNames, "Paracetamol\nIbuprofen\n");
        assert_eq!(
            map.get(Field::MedicineNames),
            &FieldValue::List(vec!["Paracetamol".into(), "Ibuprofen".into(), "".into()])
        );
    }

    #[test]
    fn scalar_edit_is_verbatim() {
        let mut map = FieldMap::with_sentinels();
        map.set_from_text(Field::Symptoms, "fever, dry cough");
        assert_eq!(map.get(Field::Symptoms), &FieldValue::Text("fever, dry cough".into()));
    }

    #[test]
    fn field_index_lookup() {
        assert_eq!(Field::from_index(1), Some(Field::PersonName));
        assert_eq!(Field::from_index(8), Some(Field::MedicineNames));
        assert_eq!(Field::from_index(0), None);
        assert_eq!(Field::from_index(9), None);
    }
}

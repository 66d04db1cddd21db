//! Feature negotiation data forms.
//!
//! The sender offers a `form` with a single `list-single` field listing the
//! mechanisms it can use; the peer answers with a `submit` form selecting one
//! of them.

use crate::error::FormShapeError;
use crate::STREAM_METHOD_FIELD;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Data form type tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FormType {
    /// Form to be filled in by the receiver
    Form,
    /// Filled in form
    Submit,
    /// Receiver declined to fill the form
    Cancel,
    /// Result set
    Result,
    /// Any other tag, kept as received
    Unknown(String),
}

impl FormType {
    /// Wire name of the type tag
    pub fn as_str(&self) -> &str {
        match self {
            FormType::Form => "form",
            FormType::Submit => "submit",
            FormType::Cancel => "cancel",
            FormType::Result => "result",
            FormType::Unknown(tag) => tag,
        }
    }
}

impl From<String> for FormType {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "form" => FormType::Form,
            "submit" => FormType::Submit,
            "cancel" => FormType::Cancel,
            "result" => FormType::Result,
            _ => FormType::Unknown(tag),
        }
    }
}

impl From<FormType> for String {
    fn from(form_type: FormType) -> Self {
        match form_type {
            FormType::Unknown(tag) => tag,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for FormType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One selectable option of a list field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormOption {
    /// Option value
    pub value: String,
}

/// A single form field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FormField {
    /// Field name
    pub var: String,
    /// Field type, e.g. `list-single`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_type: Option<String>,
    /// Options offered for list fields
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<FormOption>,
    /// Selected or filled values
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
}

/// A data form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataForm {
    /// Form type tag
    pub form_type: FormType,
    /// Fields in document order
    #[serde(default)]
    pub fields: Vec<FormField>,
}

impl DataForm {
    /// Build the offer form listing `mechanisms` in order
    pub fn stream_method_offer<I, S>(mechanisms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            form_type: FormType::Form,
            fields: vec![FormField {
                var: STREAM_METHOD_FIELD.to_string(),
                field_type: Some("list-single".to_string()),
                options: mechanisms
                    .into_iter()
                    .map(|m| FormOption { value: m.into() })
                    .collect(),
                values: Vec::new(),
            }],
        }
    }

    /// Build the submit form a peer answers with
    pub fn stream_method_submit(mechanism: impl Into<String>) -> Self {
        Self {
            form_type: FormType::Submit,
            fields: vec![FormField {
                var: STREAM_METHOD_FIELD.to_string(),
                field_type: None,
                options: Vec::new(),
                values: vec![mechanism.into()],
            }],
        }
    }

    /// Option values of the named field, in offer order
    pub fn options_of(&self, var: &str) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|f| f.var == var)
            .flat_map(|f| f.options.iter().map(|o| o.value.as_str()))
            .collect()
    }
}

/// Check that `form` is a submit form selecting exactly one stream method and
/// return the selection
pub fn validate_submit(form: &DataForm) -> Result<&str, FormShapeError> {
    if form.form_type != FormType::Submit {
        return Err(FormShapeError::WrongType(form.form_type.to_string()));
    }

    let field = match form.fields.as_slice() {
        [field] => field,
        fields => return Err(FormShapeError::FieldCount(fields.len())),
    };

    if field.var != STREAM_METHOD_FIELD {
        return Err(FormShapeError::WrongField(field.var.clone()));
    }

    match field.values.as_slice() {
        [value] => Ok(value.as_str()),
        values => Err(FormShapeError::ValueCount(values.len())),
    }
}

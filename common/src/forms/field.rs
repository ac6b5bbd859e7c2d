//! Field and validator declarations.

use std::borrow::Cow;
use std::collections::BTreeSet;

use regex::Regex;
use serde::Serialize;
use validator::ValidationError;

use crate::errors::{AppError, AppResult};

/// How a field's raw input is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// A single uploaded file.
    File,
    /// One or more uploaded files.
    MultipleFiles,
    Text,
    /// One value out of the field's static choices.
    Select,
    /// The id of one of the databases eligible for the user.
    DatabaseSelect,
    Boolean,
    Integer,
    /// `a, b, c`, blank entries dropped.
    CommaSeparatedList,
    /// A JSON array.
    JsonList,
}

/// A cleaned field value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Integer(i64),
    Text(String),
    List(Vec<String>),
    Json(Vec<serde_json::Value>),
}

impl FieldValue {
    /// Whether the value would fail a "required" check.
    pub fn is_blank(&self) -> bool {
        match self {
            FieldValue::Null => true,
            FieldValue::Text(s) => s.trim().is_empty(),
            FieldValue::List(items) => items.is_empty(),
            FieldValue::Bool(_) | FieldValue::Integer(_) | FieldValue::Json(_) => false,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(n) => Some(*n),
            _ => None,
        }
    }
}

/// Validators attached to a field, run in declaration order.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Validator {
    /// The field must hold a non-blank value.
    DataRequired,
    /// A blank input skips the remaining validators.
    Optional,
    /// At least one file must be uploaded.
    FileRequired,
    /// Every uploaded file must carry one of these extensions.
    FileAllowed {
        extensions: BTreeSet<String>,
        message: String,
    },
    Regexp {
        pattern: String,
        message: &'static str,
        #[serde(skip)]
        regex: Regex,
    },
    Length {
        min: Option<usize>,
        max: Option<usize>,
    },
    NumberRange {
        min: Option<i64>,
        max: Option<i64>,
    },
}

impl Validator {
    pub fn regexp(pattern: &str, message: &'static str) -> AppResult<Self> {
        let regex = Regex::new(pattern)
            .map_err(|e| AppError::Internal(format!("invalid field pattern {pattern}: {e}")))?;
        Ok(Validator::Regexp {
            pattern: pattern.to_string(),
            message,
            regex,
        })
    }

    pub fn file_allowed(extensions: BTreeSet<String>) -> Self {
        let listed = extensions.iter().cloned().collect::<Vec<_>>().join(", ");
        Validator::FileAllowed {
            message: format!("Only the following file extensions are allowed: {listed}"),
            extensions,
        }
    }

    pub fn exact_length(len: usize) -> Self {
        Validator::Length {
            min: Some(len),
            max: Some(len),
        }
    }

    pub fn min_number(min: i64) -> Self {
        Validator::NumberRange {
            min: Some(min),
            max: None,
        }
    }

    /// Checks a converted value. Presence checks are handled by the caller.
    pub fn check(&self, value: &FieldValue, files: &[&str]) -> Result<(), ValidationError> {
        match self {
            Validator::DataRequired | Validator::Optional | Validator::FileRequired => Ok(()),
            Validator::FileAllowed {
                extensions,
                message,
            } => {
                let all_allowed = files.iter().all(|name| {
                    file_extension(name).is_some_and(|ext| extensions.contains(&ext))
                });
                if all_allowed {
                    Ok(())
                } else {
                    Err(error("file_allowed", message.clone()))
                }
            }
            Validator::Regexp { regex, message, .. } => match value {
                FieldValue::Text(text) if !regex.is_match(text) => {
                    Err(error("regex", (*message).to_string()))
                }
                _ => Ok(()),
            },
            Validator::Length { min, max } => match value {
                FieldValue::Text(text) => {
                    let len = text.chars().count();
                    let too_short = min.is_some_and(|min| len < min);
                    let too_long = max.is_some_and(|max| len > max);
                    if too_short || too_long {
                        Err(error("length", length_message(*min, *max)))
                    } else {
                        Ok(())
                    }
                }
                _ => Ok(()),
            },
            Validator::NumberRange { min, max } => match value {
                FieldValue::Integer(n) => {
                    let too_small = min.is_some_and(|min| *n < min);
                    let too_large = max.is_some_and(|max| *n > max);
                    if too_small || too_large {
                        Err(error("range", range_message(*min, *max)))
                    } else {
                        Ok(())
                    }
                }
                _ => Ok(()),
            },
        }
    }
}

/// A static option of a select field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Choice {
    pub value: &'static str,
    pub label: &'static str,
}

/// One row of a form's field table.
#[derive(Debug, Clone, Serialize)]
pub struct FieldSpec {
    pub name: &'static str,
    pub label: &'static str,
    pub kind: FieldKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<&'static str>,
    pub validators: Vec<Validator>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<FieldValue>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<Choice>,
}

impl FieldSpec {
    pub fn new(name: &'static str, label: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            label,
            kind,
            description: None,
            validators: Vec::new(),
            default: None,
            choices: Vec::new(),
        }
    }

    pub fn description(mut self, description: &'static str) -> Self {
        self.description = Some(description);
        self
    }

    pub fn validators(mut self, validators: Vec<Validator>) -> Self {
        self.validators = validators;
        self
    }

    pub fn default_value(mut self, value: FieldValue) -> Self {
        self.default = Some(value);
        self
    }

    pub fn choices(mut self, choices: &[(&'static str, &'static str)]) -> Self {
        self.choices = choices
            .iter()
            .map(|&(value, label)| Choice { value, label })
            .collect();
        self
    }

    pub fn is_optional(&self) -> bool {
        self.validators
            .iter()
            .any(|v| matches!(v, Validator::Optional))
    }

    pub fn is_required(&self) -> bool {
        self.validators
            .iter()
            .any(|v| matches!(v, Validator::DataRequired | Validator::FileRequired))
    }

    /// Value used when the field is absent from the submission.
    pub fn absent_value(&self) -> FieldValue {
        match (&self.default, self.kind) {
            (Some(default), _) => default.clone(),
            (None, FieldKind::Boolean) => FieldValue::Bool(false),
            (None, _) => FieldValue::Null,
        }
    }
}

/// Lower-cased extension after the last dot, if any.
pub fn file_extension(filename: &str) -> Option<String> {
    let (stem, ext) = filename.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_lowercase())
}

pub(crate) fn error(code: &'static str, message: String) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(Cow::from(message));
    err
}

fn plural(n: usize) -> &'static str {
    if n == 1 {
        "character"
    } else {
        "characters"
    }
}

fn length_message(min: Option<usize>, max: Option<usize>) -> String {
    match (min, max) {
        (Some(min), Some(max)) if min == max => {
            format!("Field must be exactly {max} {} long.", plural(max))
        }
        (Some(min), Some(max)) => format!("Field must be between {min} and {max} characters long."),
        (Some(min), None) => format!("Field must be at least {min} {} long.", plural(min)),
        (None, Some(max)) => format!("Field cannot be longer than {max} {}.", plural(max)),
        (None, None) => "Invalid field length.".to_string(),
    }
}

fn range_message(min: Option<i64>, max: Option<i64>) -> String {
    match (min, max) {
        (Some(min), Some(max)) => format!("Number must be between {min} and {max}."),
        (Some(min), None) => format!("Number must be at least {min}."),
        (None, Some(max)) => format!("Number must be at most {max}."),
        (None, None) => "Invalid number.".to_string(),
    }
}

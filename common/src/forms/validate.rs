//! Validation of submitted upload forms.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::{Validate, ValidationError, ValidationErrors};

use super::catalog::{FormKind, FormSchema};
use super::field::{error, FieldKind, FieldSpec, FieldValue};
use crate::models::DatabaseChoice;

const REQUIRED: &str = "This field is required.";
const NOT_A_CHOICE: &str = "Not a valid choice.";

/// A submitted form: raw text inputs plus the names of the uploaded files.
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct FormSubmission {
    /// Raw field values keyed by field name.
    #[serde(default)]
    pub fields: BTreeMap<String, String>,

    /// Uploaded files, each bound to a file field.
    #[serde(default)]
    #[validate(nested)]
    pub files: Vec<UploadedFile>,
}

/// One uploaded file.
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct UploadedFile {
    /// Name of the file field the file belongs to.
    #[validate(length(min = 1, message = "File field name is required"))]
    pub field: String,

    /// Original file name.
    #[validate(length(min = 1, max = 255, message = "File name must be 1-255 characters"))]
    pub filename: String,
}

impl FormSubmission {
    pub fn with_field(mut self, name: &str, value: &str) -> Self {
        self.fields.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_file(mut self, field: &str, filename: &str) -> Self {
        self.files.push(UploadedFile {
            field: field.to_string(),
            filename: filename.to_string(),
        });
        self
    }

    fn files_for(&self, field: &str) -> Vec<&str> {
        self.files
            .iter()
            .filter(|f| f.field == field)
            .map(|f| f.filename.as_str())
            .collect()
    }
}

/// Cleaned, typed values of a valid submission.
#[derive(Debug, Clone, Serialize)]
pub struct ValidatedUpload {
    pub form: FormKind,
    /// Target database id.
    pub database_id: i64,
    /// Target schema, when one was given.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    pub values: BTreeMap<&'static str, FieldValue>,
}

impl FormSchema {
    /// Validates a submission against this form.
    ///
    /// `databases` are the choices eligible for the submitting user; the
    /// `database` field must name one of them.
    pub fn validate_submission(
        &self,
        submission: &FormSubmission,
        databases: &[DatabaseChoice],
    ) -> Result<ValidatedUpload, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        let mut values = BTreeMap::new();

        for field in &self.fields {
            match clean_field(field, submission, databases) {
                Ok(value) => {
                    values.insert(field.name, value);
                }
                Err(err) => errors.add(field.name, err),
            }
        }

        if self.kind == FormKind::Csv {
            resolve_other_delimiter(&mut values, &mut errors);
        }

        if !errors.is_empty() {
            return Err(errors);
        }

        let database_id = values
            .get("database")
            .and_then(FieldValue::as_integer)
            .ok_or_else(|| {
                let mut errors = ValidationErrors::new();
                errors.add("database", error("choice", NOT_A_CHOICE.to_string()));
                errors
            })?;
        let schema = values
            .get("schema")
            .and_then(FieldValue::as_text)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        Ok(ValidatedUpload {
            form: self.kind,
            database_id,
            schema,
            values,
        })
    }
}

fn clean_field(
    field: &FieldSpec,
    submission: &FormSubmission,
    databases: &[DatabaseChoice],
) -> Result<FieldValue, ValidationError> {
    let mut files = submission.files_for(field.name);
    if field.kind == FieldKind::File {
        files.truncate(1);
    }

    let value = match field.kind {
        FieldKind::File | FieldKind::MultipleFiles => {
            if files.is_empty() {
                if field.is_required() {
                    return Err(error("required", REQUIRED.to_string()));
                }
                return Ok(FieldValue::Null);
            }
            FieldValue::List(files.iter().map(|name| name.to_string()).collect())
        }
        _ => {
            let raw = submission.fields.get(field.name).map(String::as_str);
            let blank = raw.map_or(true, |r| r.trim().is_empty());
            if blank && field.is_optional() {
                return Ok(match raw {
                    None => field.absent_value(),
                    Some(_) => FieldValue::Null,
                });
            }
            match raw {
                None => field.absent_value(),
                Some(_) if blank && field.is_required() => {
                    return Err(error("required", REQUIRED.to_string()));
                }
                Some(raw) => convert(field, raw, databases)?,
            }
        }
    };

    if field.is_required() && value.is_blank() {
        return Err(error("required", REQUIRED.to_string()));
    }
    if field.kind == FieldKind::DatabaseSelect && value.as_integer().is_none() {
        return Err(error("choice", NOT_A_CHOICE.to_string()));
    }

    for validator in &field.validators {
        validator.check(&value, &files)?;
    }
    Ok(value)
}

fn convert(
    field: &FieldSpec,
    raw: &str,
    databases: &[DatabaseChoice],
) -> Result<FieldValue, ValidationError> {
    match field.kind {
        FieldKind::Text => Ok(FieldValue::Text(raw.to_string())),
        FieldKind::Select => field
            .choices
            .iter()
            .find(|choice| choice.value == raw)
            .map(|choice| FieldValue::Text(choice.value.to_string()))
            .ok_or_else(|| error("choice", NOT_A_CHOICE.to_string())),
        FieldKind::DatabaseSelect => raw
            .trim()
            .parse::<i64>()
            .ok()
            .filter(|id| databases.iter().any(|db| db.id == *id))
            .map(FieldValue::Integer)
            .ok_or_else(|| error("choice", NOT_A_CHOICE.to_string())),
        FieldKind::Boolean => {
            Ok(FieldValue::Bool(!matches!(raw, "" | "false")))
        }
        FieldKind::Integer => raw
            .trim()
            .parse::<i64>()
            .map(FieldValue::Integer)
            .map_err(|_| error("integer", "Not a valid integer value.".to_string())),
        FieldKind::CommaSeparatedList => {
            let items: Vec<String> = raw
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_string)
                .collect();
            Ok(if items.is_empty() {
                FieldValue::Null
            } else {
                FieldValue::List(items)
            })
        }
        FieldKind::JsonList => {
            if raw.trim().is_empty() {
                return Ok(FieldValue::Json(Vec::new()));
            }
            serde_json::from_str::<Vec<serde_json::Value>>(raw)
                .map(FieldValue::Json)
                .map_err(|_| error("json_list", "Not a valid JSON list.".to_string()))
        }
        FieldKind::File | FieldKind::MultipleFiles => Ok(FieldValue::Null),
    }
}

/// `delimiter = other` takes the delimiter from `otherInput`.
fn resolve_other_delimiter(
    values: &mut BTreeMap<&'static str, FieldValue>,
    errors: &mut ValidationErrors,
) {
    if values.get("delimiter").and_then(FieldValue::as_text) != Some("other") {
        return;
    }
    let other = values
        .get("otherInput")
        .and_then(FieldValue::as_text)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    match other {
        Some(delimiter) => {
            values.insert("delimiter", FieldValue::Text(delimiter));
        }
        None => errors.add("otherInput", error("required", REQUIRED.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UploadConfig;
    use crate::errors::field_messages;
    use crate::forms::FormCatalog;

    fn catalog() -> FormCatalog {
        FormCatalog::new(&UploadConfig::default()).unwrap()
    }

    fn databases() -> Vec<DatabaseChoice> {
        vec![DatabaseChoice {
            id: 1,
            label: "warehouse".into(),
        }]
    }

    fn valid_csv() -> FormSubmission {
        FormSubmission::default()
            .with_file("csv_file", "sales.csv")
            .with_field("table_name", "sales")
            .with_field("database", "1")
            .with_field("if_exists", "fail")
    }

    fn messages_for(err: &ValidationErrors, field: &str) -> Vec<String> {
        field_messages(err).remove(field).unwrap_or_default()
    }

    #[test]
    fn test_minimal_csv_submission() {
        let catalog = catalog();
        let upload = catalog
            .get(FormKind::Csv)
            .validate_submission(&valid_csv(), &databases())
            .unwrap();

        assert_eq!(upload.database_id, 1);
        assert_eq!(upload.schema, None);
        assert_eq!(upload.values["delimiter"], FieldValue::Text(",".into()));
        assert_eq!(upload.values["decimal"], FieldValue::Text(".".into()));
        assert_eq!(upload.values["skip_blank_lines"], FieldValue::Bool(false));
        assert_eq!(upload.values["header"], FieldValue::Null);
        assert_eq!(upload.values["parse_dates"], FieldValue::Null);
        assert_eq!(upload.values["use_cols"], FieldValue::Null);
        match &upload.values["null_values"] {
            FieldValue::Json(values) => assert_eq!(values.len(), 19),
            other => panic!("unexpected null_values {other:?}"),
        }
    }

    #[test]
    fn test_typed_values() {
        let catalog = catalog();
        let submission = valid_csv()
            .with_field("schema", "public")
            .with_field("header", "0")
            .with_field("skiprows", " 3 ")
            .with_field("dataframe_index", "y")
            .with_field("skip_initial_space", "false")
            .with_field("parse_dates", "created_at, ,updated_at")
            .with_field("null_values", r#"["", "N/A"]"#)
            .with_field("use_cols", r#"["a", "b"]"#);
        let upload = catalog
            .get(FormKind::Csv)
            .validate_submission(&submission, &databases())
            .unwrap();

        assert_eq!(upload.schema.as_deref(), Some("public"));
        assert_eq!(upload.values["header"], FieldValue::Integer(0));
        assert_eq!(upload.values["skiprows"], FieldValue::Integer(3));
        assert_eq!(upload.values["dataframe_index"], FieldValue::Bool(true));
        assert_eq!(upload.values["skip_initial_space"], FieldValue::Bool(false));
        assert_eq!(
            upload.values["parse_dates"],
            FieldValue::List(vec!["created_at".into(), "updated_at".into()])
        );
        assert_eq!(
            upload.values["null_values"],
            FieldValue::Json(vec![serde_json::json!(""), serde_json::json!("N/A")])
        );
        assert_eq!(
            upload.values["csv_file"],
            FieldValue::List(vec!["sales.csv".into()])
        );
    }

    #[test]
    fn test_missing_required_fields() {
        let catalog = catalog();
        let err = catalog
            .get(FormKind::Csv)
            .validate_submission(&FormSubmission::default(), &databases())
            .unwrap_err();

        assert_eq!(messages_for(&err, "csv_file"), vec![REQUIRED]);
        assert_eq!(messages_for(&err, "table_name"), vec![REQUIRED]);
        assert_eq!(messages_for(&err, "if_exists"), vec![REQUIRED]);
        assert!(messages_for(&err, "delimiter").is_empty());
        assert!(messages_for(&err, "decimal").is_empty());
    }

    #[test]
    fn test_table_name_cannot_contain_schema() {
        let catalog = catalog();
        let submission = valid_csv().with_field("table_name", "public.sales");
        let err = catalog
            .get(FormKind::Csv)
            .validate_submission(&submission, &databases())
            .unwrap_err();
        assert_eq!(
            messages_for(&err, "table_name"),
            vec!["Table name cannot contain a schema"]
        );
    }

    #[test]
    fn test_value_validators() {
        let catalog = catalog();
        let submission = valid_csv()
            .with_field("decimal", ",,")
            .with_field("header", "-1")
            .with_field("nrows", "ten")
            .with_field("if_exists", "truncate")
            .with_field("null_values", r#"{"a": 1}"#);
        let err = catalog
            .get(FormKind::Csv)
            .validate_submission(&submission, &databases())
            .unwrap_err();

        assert_eq!(
            messages_for(&err, "decimal"),
            vec!["Field must be exactly 1 character long."]
        );
        assert_eq!(messages_for(&err, "header"), vec!["Number must be at least 0."]);
        assert_eq!(messages_for(&err, "nrows"), vec!["Not a valid integer value."]);
        assert_eq!(messages_for(&err, "if_exists"), vec![NOT_A_CHOICE]);
        assert_eq!(messages_for(&err, "null_values"), vec!["Not a valid JSON list."]);
    }

    #[test]
    fn test_blank_optional_field_is_null() {
        let catalog = catalog();
        let submission = valid_csv().with_field("decimal", "").with_field("index_col", " ");
        let upload = catalog
            .get(FormKind::Csv)
            .validate_submission(&submission, &databases())
            .unwrap();
        assert_eq!(upload.values["decimal"], FieldValue::Null);
        assert_eq!(upload.values["index_col"], FieldValue::Null);
    }

    #[test]
    fn test_database_must_be_eligible() {
        let catalog = catalog();
        let submission = valid_csv().with_field("database", "2");
        let err = catalog
            .get(FormKind::Csv)
            .validate_submission(&submission, &databases())
            .unwrap_err();
        assert_eq!(messages_for(&err, "database"), vec![NOT_A_CHOICE]);

        let err = catalog
            .get(FormKind::Csv)
            .validate_submission(&valid_csv(), &[])
            .unwrap_err();
        assert_eq!(messages_for(&err, "database"), vec![NOT_A_CHOICE]);
    }

    #[test]
    fn test_file_extension_is_checked() {
        let catalog = catalog();
        let submission = FormSubmission::default()
            .with_file("excel_file", "sales.csv")
            .with_field("name", "sales")
            .with_field("database", "1")
            .with_field("if_exists", "append");
        let err = catalog
            .get(FormKind::Excel)
            .validate_submission(&submission, &databases())
            .unwrap_err();
        assert_eq!(
            messages_for(&err, "excel_file"),
            vec!["Only the following file extensions are allowed: xls, xlsx"]
        );
    }

    #[test]
    fn test_columnar_accepts_multiple_files() {
        let catalog = catalog();
        let submission = FormSubmission::default()
            .with_file("columnar_file", "part-0.parquet")
            .with_file("columnar_file", "part-1.PARQUET")
            .with_field("name", "events")
            .with_field("database", "1")
            .with_field("if_exists", "replace");
        let upload = catalog
            .get(FormKind::Columnar)
            .validate_submission(&submission, &databases())
            .unwrap();
        assert_eq!(
            upload.values["columnar_file"],
            FieldValue::List(vec!["part-0.parquet".into(), "part-1.PARQUET".into()])
        );

        let mixed = submission.with_file("columnar_file", "notes.txt");
        assert!(catalog
            .get(FormKind::Columnar)
            .validate_submission(&mixed, &databases())
            .is_err());
    }

    #[test]
    fn test_other_delimiter() {
        let catalog = catalog();
        let form = catalog.get(FormKind::Csv);

        let submission = valid_csv()
            .with_field("delimiter", "other")
            .with_field("otherInput", ";");
        let upload = form.validate_submission(&submission, &databases()).unwrap();
        assert_eq!(upload.values["delimiter"], FieldValue::Text(";".into()));

        let missing = valid_csv().with_field("delimiter", "other");
        let err = form.validate_submission(&missing, &databases()).unwrap_err();
        assert_eq!(messages_for(&err, "otherInput"), vec![REQUIRED]);
    }

    #[test]
    fn test_submission_shape_is_validated() {
        let submission = FormSubmission::default().with_file("", "sales.csv");
        assert!(submission.validate().is_err());
        assert!(valid_csv().validate().is_ok());
    }

    #[test]
    fn test_missing_database_reported_with_other_errors() {
        let catalog = catalog();
        let submission = FormSubmission::default()
            .with_file("csv_file", "sales.csv")
            .with_field("if_exists", "fail");
        let err = catalog
            .get(FormKind::Csv)
            .validate_submission(&submission, &databases())
            .unwrap_err();
        assert_eq!(messages_for(&err, "table_name"), vec![REQUIRED]);
        assert_eq!(messages_for(&err, "database"), vec![NOT_A_CHOICE]);
    }

    #[test]
    fn test_single_file_field_checks_first_file_only() {
        let catalog = catalog();
        let submission = valid_csv().with_file("csv_file", "extra.xlsx");
        let upload = catalog
            .get(FormKind::Csv)
            .validate_submission(&submission, &databases())
            .unwrap();
        assert_eq!(
            upload.values["csv_file"],
            FieldValue::List(vec!["sales.csv".into()])
        );
    }

    #[test]
    fn test_boolean_false_values_are_case_sensitive() {
        let catalog = catalog();
        let submission = valid_csv()
            .with_field("skip_initial_space", "False")
            .with_field("skip_blank_lines", "");
        let upload = catalog
            .get(FormKind::Csv)
            .validate_submission(&submission, &databases())
            .unwrap();
        assert_eq!(upload.values["skip_initial_space"], FieldValue::Bool(true));
        assert_eq!(upload.values["skip_blank_lines"], FieldValue::Bool(false));
    }
}

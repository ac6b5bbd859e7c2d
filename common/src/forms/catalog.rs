//! The upload form tables.
//!
//! Built once from [`UploadConfig`] at startup and shared read-only.

use std::str::FromStr;

use serde::Serialize;

use super::field::{FieldKind, FieldSpec, FieldValue, Validator};
use crate::config::UploadConfig;
use crate::errors::{AppError, AppResult};
use crate::models::DatabaseChoice;

const TABLE_NAME_PATTERN: &str = r"^[^\.]+$";
const TABLE_NAME_MESSAGE: &str = "Table name cannot contain a schema";

const IF_EXISTS_CHOICES: [(&str, &str); 3] =
    [("fail", "Fail"), ("replace", "Replace"), ("append", "Append")];

/// The three upload forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FormKind {
    Csv,
    Excel,
    Columnar,
}

impl FormKind {
    pub const ALL: [FormKind; 3] = [FormKind::Csv, FormKind::Excel, FormKind::Columnar];

    pub fn slug(&self) -> &'static str {
        match self {
            FormKind::Csv => "csv",
            FormKind::Excel => "excel",
            FormKind::Columnar => "columnar",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            FormKind::Csv => "CSV to Database configuration",
            FormKind::Excel => "Excel to Database configuration",
            FormKind::Columnar => "Columnar to Database configuration",
        }
    }
}

impl std::fmt::Display for FormKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for FormKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(FormKind::Csv),
            "excel" => Ok(FormKind::Excel),
            "columnar" => Ok(FormKind::Columnar),
            other => Err(AppError::FormNotFound(other.to_string())),
        }
    }
}

/// A form: its kind and ordered field table.
#[derive(Debug, Clone, Serialize)]
pub struct FormSchema {
    pub kind: FormKind,
    pub title: &'static str,
    pub fields: Vec<FieldSpec>,
}

impl FormSchema {
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// The schema plus the database options for one user.
    pub fn view(&self, database_choices: Vec<DatabaseChoice>) -> FormView {
        FormView {
            kind: self.kind,
            title: self.title,
            fields: self.fields.clone(),
            database_choices,
        }
    }
}

/// A form as sent to the upload UI.
#[derive(Debug, Serialize)]
pub struct FormView {
    pub kind: FormKind,
    pub title: &'static str,
    pub fields: Vec<FieldSpec>,
    pub database_choices: Vec<DatabaseChoice>,
}

/// Summary entry of the form listing.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct FormSummary {
    pub kind: String,
    pub title: String,
}

/// All upload forms, immutable after construction.
#[derive(Debug, Clone)]
pub struct FormCatalog {
    csv: FormSchema,
    excel: FormSchema,
    columnar: FormSchema,
}

impl FormCatalog {
    pub fn new(config: &UploadConfig) -> AppResult<Self> {
        let catalog = Self {
            csv: csv_form(config)?,
            excel: excel_form(config)?,
            columnar: columnar_form(config)?,
        };
        tracing::debug!(
            csv_fields = catalog.csv.fields.len(),
            excel_fields = catalog.excel.fields.len(),
            columnar_fields = catalog.columnar.fields.len(),
            "Upload form catalog built"
        );
        Ok(catalog)
    }

    pub fn get(&self, kind: FormKind) -> &FormSchema {
        match kind {
            FormKind::Csv => &self.csv,
            FormKind::Excel => &self.excel,
            FormKind::Columnar => &self.columnar,
        }
    }

    pub fn summaries(&self) -> Vec<FormSummary> {
        FormKind::ALL
            .iter()
            .map(|kind| FormSummary {
                kind: kind.slug().to_string(),
                title: kind.title().to_string(),
            })
            .collect()
    }
}

fn table_name_field(name: &'static str, description: &'static str) -> AppResult<FieldSpec> {
    Ok(FieldSpec::new(name, "Table Name", FieldKind::Text)
        .description(description)
        .validators(vec![
            Validator::DataRequired,
            Validator::regexp(TABLE_NAME_PATTERN, TABLE_NAME_MESSAGE)?,
        ]))
}

fn database_field(description: Option<&'static str>) -> FieldSpec {
    let field = FieldSpec::new("database", "Database", FieldKind::DatabaseSelect);
    match description {
        Some(description) => field.description(description),
        None => field,
    }
}

fn optional_text(name: &'static str, label: &'static str, description: &'static str) -> FieldSpec {
    FieldSpec::new(name, label, FieldKind::Text)
        .description(description)
        .validators(vec![Validator::Optional])
}

fn optional_count(name: &'static str, label: &'static str, description: &'static str) -> FieldSpec {
    FieldSpec::new(name, label, FieldKind::Integer)
        .description(description)
        .validators(vec![Validator::Optional, Validator::min_number(0)])
}

fn flag(name: &'static str, label: &'static str, description: &'static str) -> FieldSpec {
    FieldSpec::new(name, label, FieldKind::Boolean).description(description)
}

fn if_exists_field(label: &'static str, description: &'static str) -> FieldSpec {
    FieldSpec::new("if_exists", label, FieldKind::Select)
        .description(description)
        .choices(&IF_EXISTS_CHOICES)
        .validators(vec![Validator::DataRequired])
}

fn decimal_field(description: &'static str) -> FieldSpec {
    FieldSpec::new("decimal", "Decimal Character", FieldKind::Text)
        .description(description)
        .default_value(FieldValue::Text(".".into()))
        .validators(vec![Validator::Optional, Validator::exact_length(1)])
}

fn null_values_field(label: &'static str, description: &'static str, config: &UploadConfig) -> FieldSpec {
    let defaults = config
        .csv_default_na_names
        .iter()
        .cloned()
        .map(serde_json::Value::String)
        .collect();
    FieldSpec::new("null_values", label, FieldKind::JsonList)
        .description(description)
        .default_value(FieldValue::Json(defaults))
}

fn parse_dates_field(label: &'static str, description: &'static str) -> FieldSpec {
    FieldSpec::new("parse_dates", label, FieldKind::CommaSeparatedList).description(description)
}

fn csv_form(config: &UploadConfig) -> AppResult<FormSchema> {
    let fields = vec![
        FieldSpec::new("csv_file", "CSV Upload", FieldKind::File)
            .description("Select a file to be uploaded to the database")
            .validators(vec![
                Validator::FileRequired,
                Validator::file_allowed(config.csv_allowed()),
            ]),
        table_name_field("table_name", "Name of table to be created with CSV file")?,
        database_field(Some("Select a database to upload the file to")),
        optional_text(
            "dtype",
            "Column Data Types",
            "A dictionary with column names and their data types if you need to change \
             the defaults. Example: {\"user_id\":\"integer\"}",
        ),
        optional_text("schema", "Schema", "Select a schema if the database supports this"),
        FieldSpec::new("delimiter", "Delimiter", FieldKind::Select)
            .description("Enter a delimiter for this data")
            .choices(&[(",", ","), (".", "."), ("other", "Other")])
            .default_value(FieldValue::Text(",".into()))
            .validators(vec![Validator::DataRequired]),
        FieldSpec::new("otherInput", "Other", FieldKind::Text),
        if_exists_field(
            "If Table Already Exists",
            "What should happen if the table already exists",
        ),
        flag(
            "skip_initial_space",
            "Skip Initial Space",
            "Skip spaces after delimiter",
        ),
        flag(
            "skip_blank_lines",
            "Skip Blank Lines",
            "Skip blank lines rather than interpreting them as Not A Number values",
        ),
        parse_dates_field(
            "Columns To Be Parsed as Dates",
            "A comma separated list of columns that should be parsed as dates",
        ),
        flag(
            "infer_datetime_format",
            "Interpret Datetime Format Automatically",
            "Interpret the datetime format automatically",
        ),
        decimal_field("Character to interpret as decimal point"),
        null_values_field(
            "Null Values",
            "Json list of the values that should be treated as null. Examples: [\"\"] for \
             empty strings, [\"None\", \"N/A\"], [\"nan\", \"null\"]. Warning: Hive database \
             supports only a single value",
            config,
        ),
        optional_count(
            "index_col",
            "Index Column",
            "Column to use as the row labels of the dataframe. Leave empty if no index column",
        ),
        flag(
            "dataframe_index",
            "Dataframe Index",
            "Write dataframe index as a column",
        ),
        optional_text(
            "index_label",
            "Column Label(s)",
            "Column label for index column(s). If None is given and Dataframe Index is \
             checked, Index Names are used",
        ),
        FieldSpec::new("use_cols", "Columns To Read", FieldKind::JsonList)
            .description("Json list of the column names that should be read")
            .validators(vec![Validator::Optional]),
        flag(
            "overwrite_duplicate",
            "Overwrite Duplicate Columns",
            "If duplicate columns are not overridden, they will be presented as \"X.1, X.2 ...X.x\"",
        ),
        optional_count(
            "header",
            "Header Row",
            "Row containing the headers to use as column names (0 is first line of data). \
             Leave empty if there is no header row",
        ),
        optional_count("nrows", "Rows to Read", "Number of rows of file to read"),
        optional_count("skiprows", "Skip Rows", "Number of rows to skip at start of file"),
    ];

    Ok(FormSchema {
        kind: FormKind::Csv,
        title: FormKind::Csv.title(),
        fields,
    })
}

fn excel_form(config: &UploadConfig) -> AppResult<FormSchema> {
    let fields = vec![
        table_name_field("name", "Name of table to be created from excel data.")?,
        FieldSpec::new("excel_file", "Excel File", FieldKind::File)
            .description("Select a Excel file to be uploaded to a database.")
            .validators(vec![
                Validator::FileRequired,
                Validator::file_allowed(config.excel_allowed()),
            ]),
        optional_text(
            "sheet_name",
            "Sheet Name",
            "Strings used for sheet names (default is the first sheet).",
        ),
        database_field(None),
        optional_text(
            "schema",
            "Schema",
            "Specify a schema (if database flavor supports this).",
        ),
        if_exists_field(
            "Table Exists",
            "If table exists do one of the following: Fail (do nothing), Replace (drop and \
             recreate table) or Append (insert data).",
        ),
        optional_count(
            "header",
            "Header Row",
            "Row containing the headers to use as column names (0 is first line of data). \
             Leave empty if there is no header row.",
        ),
        optional_count(
            "index_col",
            "Index Column",
            "Column to use as the row labels of the dataframe. Leave empty if no index column.",
        ),
        flag(
            "mangle_dupe_cols",
            "Mangle Duplicate Columns",
            "Specify duplicate columns as \"X.0, X.1\".",
        ),
        optional_count("skiprows", "Skip Rows", "Number of rows to skip at start of file."),
        optional_count("nrows", "Rows to Read", "Number of rows of file to read."),
        parse_dates_field(
            "Parse Dates",
            "A comma separated list of columns that should be parsed as dates.",
        ),
        decimal_field("Character to interpret as decimal point."),
        flag("index", "Dataframe Index", "Write dataframe index as a column."),
        optional_text(
            "index_label",
            "Column Label(s)",
            "Column label for index column(s). If None is given and Dataframe Index is \
             True, Index Names are used.",
        ),
        null_values_field(
            "Null values",
            "Json list of the values that should be treated as null. Examples: [\"\"], \
             [\"None\", \"N/A\"], [\"nan\", \"null\"]. Warning: Hive database supports only \
             single value. Use [\"\"] for empty string.",
            config,
        ),
    ];

    Ok(FormSchema {
        kind: FormKind::Excel,
        title: FormKind::Excel.title(),
        fields,
    })
}

fn columnar_form(config: &UploadConfig) -> AppResult<FormSchema> {
    let fields = vec![
        table_name_field("name", "Name of table to be created from columnar data.")?,
        FieldSpec::new("columnar_file", "Columnar File", FieldKind::MultipleFiles)
            .description("Select a Columnar file to be uploaded to a database.")
            .validators(vec![
                Validator::DataRequired,
                Validator::file_allowed(config.columnar_allowed()),
            ]),
        database_field(None),
        optional_text(
            "schema",
            "Schema",
            "Specify a schema (if database flavor supports this).",
        ),
        if_exists_field(
            "Table Exists",
            "If table exists do one of the following: Fail (do nothing), Replace (drop and \
             recreate table) or Append (insert data).",
        ),
        FieldSpec::new("usecols", "Use Columns", FieldKind::JsonList)
            .description(
                "Json list of the column names that should be read. If not None, only these \
                 columns will be read from the file.",
            )
            .validators(vec![Validator::Optional]),
        flag("index", "Dataframe Index", "Write dataframe index as a column."),
        optional_text(
            "index_label",
            "Column Label(s)",
            "Column label for index column(s). If None is given and Dataframe Index is \
             True, Index Names are used.",
        ),
    ];

    Ok(FormSchema {
        kind: FormKind::Columnar,
        title: FormKind::Columnar.title(),
        fields,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> FormCatalog {
        FormCatalog::new(&UploadConfig::default()).unwrap()
    }

    fn names(form: &FormSchema) -> Vec<&'static str> {
        form.fields.iter().map(|f| f.name).collect()
    }

    #[test]
    fn test_form_kind_parsing() {
        assert_eq!("CSV".parse::<FormKind>().unwrap(), FormKind::Csv);
        assert_eq!("columnar".parse::<FormKind>().unwrap(), FormKind::Columnar);
        assert!(matches!(
            "pdf".parse::<FormKind>(),
            Err(AppError::FormNotFound(_))
        ));
    }

    #[test]
    fn test_csv_field_order() {
        let catalog = catalog();
        assert_eq!(
            names(catalog.get(FormKind::Csv)),
            vec![
                "csv_file",
                "table_name",
                "database",
                "dtype",
                "schema",
                "delimiter",
                "otherInput",
                "if_exists",
                "skip_initial_space",
                "skip_blank_lines",
                "parse_dates",
                "infer_datetime_format",
                "decimal",
                "null_values",
                "index_col",
                "dataframe_index",
                "index_label",
                "use_cols",
                "overwrite_duplicate",
                "header",
                "nrows",
                "skiprows",
            ]
        );
    }

    #[test]
    fn test_excel_and_columnar_fields() {
        let catalog = catalog();
        assert_eq!(catalog.get(FormKind::Excel).fields.len(), 16);
        assert_eq!(
            names(catalog.get(FormKind::Columnar)),
            vec![
                "name",
                "columnar_file",
                "database",
                "schema",
                "if_exists",
                "usecols",
                "index",
                "index_label",
            ]
        );
    }

    #[test]
    fn test_file_fields_use_configured_extensions() {
        let mut config = UploadConfig::default();
        config.allowed_extensions = ["csv", "xlsx"].iter().map(|s| s.to_string()).collect();
        let catalog = FormCatalog::new(&config).unwrap();

        let csv_file = catalog.get(FormKind::Csv).field("csv_file").unwrap();
        match &csv_file.validators[1] {
            Validator::FileAllowed { extensions, message } => {
                assert_eq!(extensions.len(), 1);
                assert_eq!(
                    message,
                    "Only the following file extensions are allowed: csv"
                );
            }
            other => panic!("unexpected validator {other:?}"),
        }
    }

    #[test]
    fn test_null_values_default_comes_from_config() {
        let mut config = UploadConfig::default();
        config.csv_default_na_names = vec!["NULL".into()];
        let catalog = FormCatalog::new(&config).unwrap();
        let field = catalog.get(FormKind::Excel).field("null_values").unwrap();
        assert_eq!(
            field.default,
            Some(FieldValue::Json(vec![serde_json::json!("NULL")]))
        );
    }

    #[test]
    fn test_view_serializes_choices() {
        let catalog = catalog();
        let view = catalog.get(FormKind::Columnar).view(vec![DatabaseChoice {
            id: 3,
            label: "warehouse".into(),
        }]);
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["kind"], "columnar");
        assert_eq!(json["database_choices"][0]["label"], "warehouse");
        assert_eq!(json["fields"][4]["choices"][1]["value"], "replace");
    }
}

//! Service configuration.
//!
//! Everything is read from the environment once, at startup, and then passed
//! explicitly to whoever needs it (form catalog, registry, permission source).

use std::collections::BTreeSet;

use crate::errors::AppError;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8082;
const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

const CSV_EXTENSIONS: [&str; 3] = ["csv", "tsv", "txt"];
const EXCEL_EXTENSIONS: [&str; 2] = ["xls", "xlsx"];
const COLUMNAR_EXTENSIONS: [&str; 2] = ["parquet", "zip"];

/// Strings treated as null by default when reading uploaded files.
const DEFAULT_NA_NAMES: [&str; 19] = [
    "",
    "#N/A",
    "#N/A N/A",
    "#NA",
    "-1.#IND",
    "-1.#QNAN",
    "-NaN",
    "-nan",
    "1.#IND",
    "1.#QNAN",
    "<NA>",
    "N/A",
    "NA",
    "NULL",
    "NaN",
    "None",
    "n/a",
    "nan",
    "null",
];

/// Application configuration shared by the service.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Name reported in logs and response metadata.
    pub service_name: String,
    /// Bind address.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Metadata database holding the `dbs` table (MySQL or SQLite URL).
    pub database_url: Option<String>,
    /// Pool size for the metadata database.
    pub max_connections: u32,
    /// Pool acquire timeout in seconds.
    pub connect_timeout_secs: u64,
    /// JSON file with per-user permission grants.
    pub permissions_file: Option<String>,
    /// Base URL of a remote security service answering permission lookups.
    pub security_service_url: Option<String>,
    /// File upload settings used to build the form catalog.
    pub upload: UploadConfig,
}

impl AppConfig {
    /// Loads the configuration from process environment variables.
    pub fn load_with_service(service_name: &str) -> Result<Self, AppError> {
        Self::from_lookup(service_name, |key| std::env::var(key).ok())
    }

    /// Loads the configuration through an arbitrary key lookup.
    ///
    /// Blank values are treated as unset.
    pub fn from_lookup<F>(service_name: &str, lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        Ok(Self {
            service_name: service_name.to_string(),
            host: get("SERVER_HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: parse_or("SERVER_PORT", get("SERVER_PORT"), DEFAULT_PORT)?,
            database_url: get("DATABASE_URL"),
            max_connections: parse_or(
                "DB_MAX_CONNECTIONS",
                get("DB_MAX_CONNECTIONS"),
                DEFAULT_MAX_CONNECTIONS,
            )?,
            connect_timeout_secs: parse_or(
                "DB_CONNECT_TIMEOUT_SECS",
                get("DB_CONNECT_TIMEOUT_SECS"),
                DEFAULT_CONNECT_TIMEOUT_SECS,
            )?,
            permissions_file: get("PERMISSIONS_FILE"),
            security_service_url: get("SECURITY_SERVICE_URL")
                .map(|url| url.trim_end_matches('/').to_string()),
            upload: UploadConfig::from_lookup(&get)?,
        })
    }
}

/// Extension sets and defaults for the upload forms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadConfig {
    /// Extensions accepted by any upload form.
    pub allowed_extensions: BTreeSet<String>,
    pub csv_extensions: BTreeSet<String>,
    pub excel_extensions: BTreeSet<String>,
    pub columnar_extensions: BTreeSet<String>,
    /// Default for the `null_values` fields.
    pub csv_default_na_names: Vec<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        let csv_extensions = to_set(&CSV_EXTENSIONS);
        let excel_extensions = to_set(&EXCEL_EXTENSIONS);
        let columnar_extensions = to_set(&COLUMNAR_EXTENSIONS);
        let allowed_extensions = csv_extensions
            .iter()
            .chain(&excel_extensions)
            .chain(&columnar_extensions)
            .cloned()
            .collect();

        Self {
            allowed_extensions,
            csv_extensions,
            excel_extensions,
            columnar_extensions,
            csv_default_na_names: DEFAULT_NA_NAMES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl UploadConfig {
    fn from_lookup(get: &dyn Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let mut config = Self::default();
        let mut explicit_allowed = false;

        if let Some(raw) = get("CSV_EXTENSIONS") {
            config.csv_extensions = parse_extensions(&raw);
        }
        if let Some(raw) = get("EXCEL_EXTENSIONS") {
            config.excel_extensions = parse_extensions(&raw);
        }
        if let Some(raw) = get("COLUMNAR_EXTENSIONS") {
            config.columnar_extensions = parse_extensions(&raw);
        }
        if let Some(raw) = get("ALLOWED_EXTENSIONS") {
            config.allowed_extensions = parse_extensions(&raw);
            explicit_allowed = true;
        }
        if !explicit_allowed {
            config.allowed_extensions = config
                .csv_extensions
                .iter()
                .chain(&config.excel_extensions)
                .chain(&config.columnar_extensions)
                .cloned()
                .collect();
        }
        if let Some(raw) = get("CSV_DEFAULT_NA_NAMES") {
            config.csv_default_na_names = serde_json::from_str(&raw).map_err(|e| {
                AppError::Config(format!("CSV_DEFAULT_NA_NAMES must be a JSON list of strings: {e}"))
            })?;
        }

        Ok(config)
    }

    /// Extensions accepted by the CSV form.
    pub fn csv_allowed(&self) -> BTreeSet<String> {
        self.allowed_extensions
            .intersection(&self.csv_extensions)
            .cloned()
            .collect()
    }

    /// Extensions accepted by the Excel form.
    pub fn excel_allowed(&self) -> BTreeSet<String> {
        self.allowed_extensions
            .intersection(&self.excel_extensions)
            .cloned()
            .collect()
    }

    /// Extensions accepted by the columnar form.
    pub fn columnar_allowed(&self) -> BTreeSet<String> {
        self.allowed_extensions
            .intersection(&self.columnar_extensions)
            .cloned()
            .collect()
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, raw: Option<String>, default: T) -> Result<T, AppError> {
    match raw {
        Some(raw) => raw
            .parse()
            .map_err(|_| AppError::Config(format!("{key} has an invalid value: {raw}"))),
        None => Ok(default),
    }
}

/// Parses `"csv, .TSV,txt"` into `{"csv", "tsv", "txt"}`.
fn parse_extensions(raw: &str) -> BTreeSet<String> {
    raw.split(',')
        .map(|ext| ext.trim().trim_start_matches('.').to_lowercase())
        .filter(|ext| !ext.is_empty())
        .collect()
}

fn to_set(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

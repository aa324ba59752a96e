use chrono::Datelike;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_GEOCODE_ENDPOINT: &str = "https://maps.googleapis.com/maps/api/geocode/json";
pub const GEOCODE_API_KEY_ENV: &str = "GOOGLE_MAPS_API_KEY";

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn pairs(items: &[(&str, &str)]) -> HashMap<String, String> {
    items
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn default_column_mapping() -> HashMap<String, String> {
    pairs(&[
        ("form_category", "program"),
        ("createdAt", "date"),
        ("ic_number", "ic"),
        ("race", "ethnicity"),
        ("gender", "sex"),
        ("mobile_number", "phone"),
        ("monthly_income", "salary_monthly"),
    ])
}

fn default_program_mapping() -> HashMap<String, String> {
    pairs(&[
        ("food", "INSAN"),
        ("agriculture", "INTAN"),
        ("maintenance", "IKHSAN"),
    ])
}

fn default_postcode_column_mapping() -> HashMap<String, String> {
    pairs(&[("city", "district")])
}

/// 覆寫值逐項蓋在預設對照表上；值為空字串代表刪除該項
pub fn merge_mapping(
    mut base: HashMap<String, String>,
    overrides: HashMap<String, String>,
) -> HashMap<String, String> {
    for (key, value) in overrides {
        if value.is_empty() {
            base.remove(&key);
        } else {
            base.insert(key, value);
        }
    }
    base
}

fn merged_column_mapping<'de, D>(deserializer: D) -> Result<HashMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let overrides = HashMap::deserialize(deserializer)?;
    Ok(merge_mapping(default_column_mapping(), overrides))
}

fn merged_program_mapping<'de, D>(deserializer: D) -> Result<HashMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let overrides = HashMap::deserialize(deserializer)?;
    Ok(merge_mapping(default_program_mapping(), overrides))
}

fn merged_postcode_column_mapping<'de, D>(
    deserializer: D,
) -> Result<HashMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let overrides = HashMap::deserialize(deserializer)?;
    Ok(merge_mapping(default_postcode_column_mapping(), overrides))
}

/// 清理規則用到的所有常數，TOML `[transform]` 可以逐項覆寫。
///
/// 清單欄位整個取代預設值；對照表欄位與預設值合併。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleaningRules {
    pub drop_columns: Vec<String>,
    #[serde(deserialize_with = "merged_column_mapping")]
    pub column_mapping: HashMap<String, String>,
    #[serde(deserialize_with = "merged_program_mapping")]
    pub program_mapping: HashMap<String, String>,
    pub column_order: Vec<String>,
    pub uppercase_columns: Vec<String>,
    pub placeholder_columns: Vec<String>,
    #[serde(deserialize_with = "merged_postcode_column_mapping")]
    pub postcode_column_mapping: HashMap<String, String>,
    pub country_suffix: String,
    pub reference_year: i32,
    pub century_pivot: u32,
}

impl Default for CleaningRules {
    fn default() -> Self {
        Self {
            drop_columns: strings(&[
                "form_id",
                "user_id",
                "proof_of_income",
                "proof_of_income_type",
                "ic_image",
                "status",
                "is_b40",
                "race_other",
            ]),
            column_mapping: default_column_mapping(),
            program_mapping: default_program_mapping(),
            column_order: strings(&[
                "program",
                "date",
                "ic",
                "name",
                "age",
                "ethnicity",
                "sex",
                "state",
                "district",
                "postcode",
                "lat",
                "lon",
                "address",
                "phone",
                "email",
                "salary_monthly",
                "miskin",
                "miskin_tegar",
                "str_mof",
                "belum_disemak",
            ]),
            uppercase_columns: strings(&["name", "address"]),
            placeholder_columns: strings(&["miskin", "miskin_tegar", "str_mof", "belum_disemak"]),
            postcode_column_mapping: default_postcode_column_mapping(),
            country_suffix: "MALAYSIA".to_string(),
            reference_year: chrono::Local::now().year(),
            century_pivot: 20,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Xlsx,
    Csv,
    Tsv,
    Json,
}

impl OutputFormat {
    pub const ALL: [&'static str; 4] = ["xlsx", "csv", "tsv", "json"];

    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Xlsx => "xlsx",
            OutputFormat::Csv => "csv",
            OutputFormat::Tsv => "tsv",
            OutputFormat::Json => "json",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "xlsx" | "excel" => Ok(OutputFormat::Xlsx),
            "csv" => Ok(OutputFormat::Csv),
            "tsv" => Ok(OutputFormat::Tsv),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!(
                "Unsupported format '{}'. Valid formats: {}",
                other,
                OutputFormat::ALL.join(", ")
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutputSettings {
    pub formats: Vec<OutputFormat>,
    pub base_name: String,
    pub sheet_name: String,
    /// 設定時將所有產出打包成這個 ZIP 檔
    pub zip_filename: Option<String>,
    pub write_report: bool,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            formats: vec![OutputFormat::Xlsx],
            base_name: "combined_data_with_districts".to_string(),
            sheet_name: "CleanedData".to_string(),
            zip_filename: None,
            write_report: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeocodingSettings {
    pub enabled: bool,
    pub endpoint: String,
    pub api_key: Option<String>,
    pub region: Option<String>,
    pub timeout_seconds: u64,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
}

impl Default for GeocodingSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: DEFAULT_GEOCODE_ENDPOINT.to_string(),
            api_key: None,
            region: Some("my".to_string()),
            timeout_seconds: 10,
            retry_attempts: 2,
            retry_delay_ms: 500,
        }
    }
}

impl GeocodingSettings {
    /// 有啟用且有 API key 才會真正呼叫地理編碼服務
    pub fn is_active(&self) -> bool {
        self.enabled && self.api_key.as_deref().is_some_and(|k| !k.trim().is_empty())
    }
}

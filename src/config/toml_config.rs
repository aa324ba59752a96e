use crate::core::ConfigProvider;
use crate::domain::settings::{
    CleaningRules, GeocodingSettings, OutputFormat, OutputSettings, GEOCODE_API_KEY_ENV,
};
use crate::utils::error::{EtlError, Result};
use crate::utils::validation::{self, Validate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    pub pipeline: PipelineConfig,
    pub source: SourceConfig,
    #[serde(default)]
    pub extract: ExtractConfig,
    #[serde(default)]
    pub transform: CleaningRules,
    #[serde(default)]
    pub postcode: PostcodeConfig,
    #[serde(default)]
    pub geocoding: GeocodingConfig,
    pub load: LoadConfig,
    pub monitoring: Option<MonitoringConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub name: String,
    pub description: Option<String>,
    pub version: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub input_file: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractConfig {
    pub max_records: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostcodeConfig {
    #[serde(default)]
    pub files: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeocodingConfig {
    pub enabled: Option<bool>,
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub region: Option<String>,
    pub timeout_seconds: Option<u64>,
    pub retry_attempts: Option<u32>,
    pub retry_delay_ms: Option<u64>,
    pub concurrent_requests: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadConfig {
    pub output_path: String,
    #[serde(default = "default_output_formats")]
    pub output_formats: Vec<String>,
    pub compression: Option<CompressionConfig>,
    pub base_name: Option<String>,
    pub sheet_name: Option<String>,
    pub write_report: Option<bool>,
}

fn default_output_formats() -> Vec<String> {
    vec!["xlsx".to_string()]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionConfig {
    pub enabled: bool,
    pub filename: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    pub enabled: bool,
    /// "compact"（預設）或 "json"
    pub log_format: Option<String>,
}

impl TomlConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(EtlError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| EtlError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${GOOGLE_MAPS_API_KEY})，未設定的保留原字樣
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| EtlError::ConfigValidationError {
            field: "environment".to_string(),
            message: e.to_string(),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    /// 驗證配置的合理性
    pub fn validate_config(&self) -> Result<()> {
        validation::validate_non_empty_string("pipeline.name", &self.pipeline.name)?;
        validation::validate_path("source.input_file", &self.source.input_file)?;
        validation::validate_file_extensions(
            "source.input_file",
            std::slice::from_ref(&self.source.input_file),
            &["json"],
        )?;
        validation::validate_path("load.output_path", &self.load.output_path)?;
        validation::validate_file_extensions("postcode.files", &self.postcode.files, &["csv", "tsv", "xlsx"])?;

        if let Some(concurrent) = self.geocoding.concurrent_requests {
            validation::validate_positive_number("geocoding.concurrent_requests", concurrent, 1)?;
        }
        if self.geocoding.enabled.unwrap_or(true) {
            if let Some(endpoint) = &self.geocoding.endpoint {
                validation::validate_url("geocoding.endpoint", endpoint)?;
            }
        }
        if let Some(max) = self.extract.max_records {
            validation::validate_positive_number("extract.max_records", max, 1)?;
        }

        if self.load.output_formats.is_empty() {
            return Err(EtlError::MissingConfigError {
                field: "load.output_formats".to_string(),
            });
        }
        for format in &self.load.output_formats {
            if let Err(reason) = format.parse::<OutputFormat>() {
                return Err(EtlError::InvalidConfigValueError {
                    field: "load.output_formats".to_string(),
                    value: format.clone(),
                    reason,
                });
            }
        }
        if let Some(sheet) = &self.load.sheet_name {
            validation::validate_non_empty_string("load.sheet_name", sheet)?;
        }

        validation::validate_range("transform.reference_year", self.transform.reference_year, 1900, 2200)?;
        validation::validate_range("transform.century_pivot", self.transform.century_pivot, 0, 99)?;

        Ok(())
    }

    /// 取得監控設定
    pub fn monitoring_enabled(&self) -> bool {
        self.monitoring.as_ref().map(|m| m.enabled).unwrap_or(false)
    }

    pub fn json_logs(&self) -> bool {
        self.monitoring
            .as_ref()
            .and_then(|m| m.log_format.as_deref())
            .is_some_and(|f| f.eq_ignore_ascii_case("json"))
    }
}

impl ConfigProvider for TomlConfig {
    fn input_file(&self) -> &str {
        &self.source.input_file
    }

    fn output_path(&self) -> &str {
        &self.load.output_path
    }

    fn lookup_files(&self) -> &[String] {
        &self.postcode.files
    }

    fn concurrent_requests(&self) -> usize {
        self.geocoding.concurrent_requests.unwrap_or(5)
    }

    fn cleaning_rules(&self) -> CleaningRules {
        self.transform.clone()
    }

    fn geocoding(&self) -> GeocodingSettings {
        let defaults = GeocodingSettings::default();
        // 未替換的 ${VAR} 不是有效的 key
        let api_key = self
            .geocoding
            .api_key
            .clone()
            .filter(|k| !k.starts_with("${"))
            .or_else(|| std::env::var(GEOCODE_API_KEY_ENV).ok());

        GeocodingSettings {
            enabled: self.geocoding.enabled.unwrap_or(defaults.enabled),
            endpoint: self.geocoding.endpoint.clone().unwrap_or(defaults.endpoint),
            api_key,
            region: self.geocoding.region.clone().or(defaults.region),
            timeout_seconds: self.geocoding.timeout_seconds.unwrap_or(defaults.timeout_seconds),
            retry_attempts: self.geocoding.retry_attempts.unwrap_or(defaults.retry_attempts),
            retry_delay_ms: self.geocoding.retry_delay_ms.unwrap_or(defaults.retry_delay_ms),
        }
    }

    fn output_settings(&self) -> OutputSettings {
        let defaults = OutputSettings::default();
        let zip_filename = self
            .load
            .compression
            .as_ref()
            .filter(|c| c.enabled)
            .map(|c| c.filename.clone().unwrap_or_else(|| "ipr_output.zip".to_string()));

        OutputSettings {
            formats: self
                .load
                .output_formats
                .iter()
                .filter_map(|f| f.parse().ok())
                .collect(),
            base_name: self.load.base_name.clone().unwrap_or(defaults.base_name),
            sheet_name: self.load.sheet_name.clone().unwrap_or(defaults.sheet_name),
            zip_filename,
            write_report: self.load.write_report.unwrap_or(defaults.write_report),
        }
    }

    fn max_records(&self) -> Option<usize> {
        self.extract.max_records
    }
}

impl Validate for TomlConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}

pub mod cli;
pub mod toml_config;

#[cfg(feature = "cli")]
pub use self::args::CliConfig;

#[cfg(feature = "cli")]
mod args {
    use crate::core::ConfigProvider;
    use crate::domain::settings::{
        CleaningRules, GeocodingSettings, OutputFormat, OutputSettings, DEFAULT_GEOCODE_ENDPOINT,
        GEOCODE_API_KEY_ENV,
    };
    use crate::utils::error::{EtlError, Result};
    use crate::utils::validation::{self, Validate};
    use clap::Parser;

    #[derive(Debug, Clone, Parser)]
    #[command(name = "ipr-etl")]
    #[command(about = "Clean IPR program registrations and export them for the weekly report")]
    pub struct CliConfig {
        /// Uploaded JSON file with the registration records
        #[arg(short, long)]
        pub input: String,

        #[arg(long, default_value = "./output")]
        pub output_path: String,

        /// Postcode -> city/state lookup tables (csv, tsv or xlsx)
        #[arg(long, value_delimiter = ',')]
        pub lookup_files: Vec<String>,

        #[arg(long, default_value = "5")]
        pub concurrent_requests: usize,

        #[arg(long, value_delimiter = ',', default_value = "xlsx")]
        pub formats: Vec<OutputFormat>,

        /// Bundle every output file into ipr_output.zip
        #[arg(long)]
        pub zip: bool,

        /// Google Maps API key, falls back to GOOGLE_MAPS_API_KEY
        #[arg(long)]
        pub geocode_api_key: Option<String>,

        #[arg(long, default_value = DEFAULT_GEOCODE_ENDPOINT)]
        pub geocode_endpoint: String,

        #[arg(long, help = "Skip geocoding, lat/lon stay empty")]
        pub no_geocode: bool,

        /// Year used to compute ages from IC numbers (defaults to the current year)
        #[arg(long)]
        pub reference_year: Option<i32>,

        #[arg(long, help = "Do not write processing_report.json")]
        pub no_report: bool,

        #[arg(long, help = "Enable verbose output")]
        pub verbose: bool,

        #[arg(long, help = "Log CPU and memory usage per phase")]
        pub monitor: bool,
    }

    impl ConfigProvider for CliConfig {
        fn input_file(&self) -> &str {
            &self.input
        }

        fn output_path(&self) -> &str {
            &self.output_path
        }

        fn lookup_files(&self) -> &[String] {
            &self.lookup_files
        }

        fn concurrent_requests(&self) -> usize {
            self.concurrent_requests
        }

        fn cleaning_rules(&self) -> CleaningRules {
            let mut rules = CleaningRules::default();
            if let Some(year) = self.reference_year {
                rules.reference_year = year;
            }
            rules
        }

        fn geocoding(&self) -> GeocodingSettings {
            GeocodingSettings {
                enabled: !self.no_geocode,
                endpoint: self.geocode_endpoint.clone(),
                api_key: self
                    .geocode_api_key
                    .clone()
                    .or_else(|| std::env::var(GEOCODE_API_KEY_ENV).ok()),
                ..GeocodingSettings::default()
            }
        }

        fn output_settings(&self) -> OutputSettings {
            OutputSettings {
                formats: self.formats.clone(),
                zip_filename: self.zip.then(|| "ipr_output.zip".to_string()),
                write_report: !self.no_report,
                ..OutputSettings::default()
            }
        }
    }

    impl Validate for CliConfig {
        fn validate(&self) -> Result<()> {
            validation::validate_path("input", &self.input)?;
            validation::validate_file_extensions("input", std::slice::from_ref(&self.input), &["json"])?;
            validation::validate_path("output_path", &self.output_path)?;
            validation::validate_file_extensions("lookup_files", &self.lookup_files, &["csv", "tsv", "xlsx"])?;
            validation::validate_positive_number("concurrent_requests", self.concurrent_requests, 1)?;

            if self.formats.is_empty() {
                return Err(EtlError::MissingConfigError {
                    field: "formats".to_string(),
                });
            }
            if !self.no_geocode {
                validation::validate_url("geocode_endpoint", &self.geocode_endpoint)?;
            }
            if let Some(year) = self.reference_year {
                validation::validate_range("reference_year", year, 1900, 2200)?;
            }
            Ok(())
        }
    }

}

use crate::core::cleaning::{self, ADDRESS};
use crate::core::export::{self, Artifact, REPORT_FILENAME};
use crate::core::geocode::{geocode_addresses, GoogleGeocoder};
use crate::core::postcode::PostcodeDirectory;
use crate::core::{ConfigProvider, Dataset, Pipeline, Storage, TransformResult};
use crate::domain::model::{GeocodeFailure, GeocodeStatus, ProcessingReport};
use crate::domain::ports::{GeocodeOutcome, Geocoder};
use crate::utils::error::{EtlError, Result};
use serde_json::Value;
use std::sync::Arc;

pub const GEOCODE_STATUS: &str = "geocode_status";
pub const LAT: &str = "lat";
pub const LON: &str = "lon";

/// 上傳 JSON -> 清理 -> 地理編碼 -> 郵遞區號對照 -> 匯出
pub struct IprPipeline<S: Storage, C: ConfigProvider> {
    storage: S,
    config: C,
    geocoder: Option<Arc<dyn Geocoder>>,
}

impl<S: Storage, C: ConfigProvider> IprPipeline<S, C> {
    pub fn new(storage: S, config: C) -> Result<Self> {
        let settings = config.geocoding();
        let geocoder: Option<Arc<dyn Geocoder>> = if settings.is_active() {
            Some(Arc::new(GoogleGeocoder::new(&settings)?))
        } else {
            if settings.enabled {
                tracing::warn!("⚠️ No geocoding API key configured, lat/lon will be left empty");
            }
            None
        };

        Ok(Self {
            storage,
            config,
            geocoder,
        })
    }

    /// 換掉預設的地理編碼服務
    pub fn with_geocoder(mut self, geocoder: Arc<dyn Geocoder>) -> Self {
        self.geocoder = Some(geocoder);
        self
    }

    async fn load_postcode_directory(&self) -> Result<Option<PostcodeDirectory>> {
        let files = self.config.lookup_files();
        if files.is_empty() {
            return Ok(None);
        }

        let mut directory = PostcodeDirectory::default();
        for file in files {
            tracing::debug!("Loading postcode file: {}", file);
            let bytes = self.storage.read_file(file).await?;
            directory.extend(PostcodeDirectory::from_bytes(file, &bytes)?);
        }

        if directory.is_empty() {
            return Err(EtlError::ValidationError {
                message: "Postcode data could not be loaded: lookup files contain no rows"
                    .to_string(),
            });
        }

        tracing::info!(
            "📮 Loaded {} postcode rows from {} file(s)",
            directory.len(),
            files.len()
        );
        Ok(Some(directory))
    }

    async fn geocode(&self, dataset: &mut Dataset, report: &mut ProcessingReport) -> Result<()> {
        let addresses: Vec<Option<String>> = dataset
            .records
            .iter()
            .map(|r| r.get_str(ADDRESS).map(str::to_string))
            .collect();

        let outcomes = match &self.geocoder {
            Some(geocoder) => {
                geocode_addresses(
                    Arc::clone(geocoder),
                    &addresses,
                    self.config.concurrent_requests(),
                )
                .await?
            }
            None => vec![GeocodeOutcome::failed(GeocodeStatus::Skipped); addresses.len()],
        };

        for (index, outcome) in outcomes.iter().enumerate() {
            *report
                .geocode_summary
                .entry(outcome.status.as_str().to_string())
                .or_insert(0) += 1;
            if !matches!(outcome.status, GeocodeStatus::Success | GeocodeStatus::Skipped) {
                report.geocode_failures.push(GeocodeFailure {
                    row: index + 1,
                    address: addresses[index].clone(),
                    status: outcome.status,
                });
            }
        }

        let (statuses, (lats, lons)): (Vec<Value>, (Vec<Value>, Vec<Value>)) = outcomes
            .iter()
            .map(|outcome| {
                let (lat, lon) = match outcome.location {
                    Some((lat, lon)) => (Value::from(lat), Value::from(lon)),
                    None => (Value::Null, Value::Null),
                };
                (Value::String(outcome.status.as_str().to_string()), (lat, lon))
            })
            .unzip();

        dataset.set_column(GEOCODE_STATUS, statuses)?;
        dataset.set_column(LAT, lats)?;
        dataset.set_column(LON, lons)?;

        for (status, count) in &report.geocode_summary {
            tracing::info!("🌍 Geocoding {}: {}", status, count);
        }
        for failure in &report.geocode_failures {
            tracing::debug!(
                "Row {} geocoding {}: {}",
                failure.row,
                failure.status,
                failure.address.as_deref().unwrap_or("")
            );
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl<S: Storage, C: ConfigProvider> Pipeline for IprPipeline<S, C> {
    async fn extract(&self) -> Result<Dataset> {
        let input = self.config.input_file();
        tracing::debug!("Reading upload: {}", input);

        let bytes = self.storage.read_file(input).await?;
        let mut dataset = Dataset::from_json_slice(&bytes)?;

        if let Some(max) = self.config.max_records() {
            if dataset.len() > max {
                tracing::warn!("Only the first {} of {} records will be processed", max, dataset.len());
                dataset.truncate(max);
            }
        }

        tracing::info!(
            "📥 Extracted {} records with {} columns",
            dataset.len(),
            dataset.columns.len()
        );
        Ok(dataset)
    }

    async fn transform(&self, mut data: Dataset) -> Result<TransformResult> {
        if data.is_empty() {
            return Err(EtlError::EmptyDataset);
        }

        // 對照表必須在地理編碼之前載入
        let directory = self.load_postcode_directory().await?;

        let rules = self.config.cleaning_rules();
        let mut report = ProcessingReport::new(data.len());

        let summary = cleaning::apply_cleaning_rules(&mut data, &rules)?;
        report.ic_errors = summary.ic_errors;
        if summary.ic_errors > 0 {
            tracing::warn!("⚠️ {} records have an invalid IC number", summary.ic_errors);
        }

        if data.has_column(ADDRESS) {
            self.geocode(&mut data, &mut report).await?;
        } else {
            tracing::warn!("⚠️ No '{}' column found, geocoding skipped", ADDRESS);
        }

        match directory {
            Some(directory) => {
                let merge = directory.merge_into(&mut data, &rules.postcode_column_mapping);
                report.unmatched_postcodes = merge.unmatched;
                if merge.unmatched > 0 {
                    tracing::warn!("⚠️ {} records have no postcode match", merge.unmatched);
                }
            }
            None => tracing::warn!("⚠️ No postcode lookup file configured, district lookup skipped"),
        }

        for column in &rules.placeholder_columns {
            let blanks = vec![Value::String(String::new()); data.len()];
            data.set_column(column, blanks)?;
        }
        data.reorder_columns(&rules.column_order);

        report.output_records = data.len();
        tracing::info!(
            "🧹 Cleaned {} records into {} rows",
            report.input_records,
            report.output_records
        );

        Ok(TransformResult {
            dataset: data,
            report,
        })
    }

    async fn load(&self, result: TransformResult) -> Result<String> {
        let settings = self.config.output_settings();
        let mut artifacts = export::render(&result.dataset, &settings)?;

        if settings.write_report {
            artifacts.push(Artifact {
                file_name: REPORT_FILENAME.to_string(),
                data: serde_json::to_vec_pretty(&result.report)?,
            });
        }

        if let Some(zip_name) = &settings.zip_filename {
            let entries: Vec<(&str, &[u8])> = artifacts
                .iter()
                .map(|a| (a.file_name.as_str(), a.data.as_slice()))
                .collect();
            tracing::debug!("Creating ZIP file with {} files", entries.len());
            let zip_data = export::build_zip(&entries)?;

            tracing::debug!("Writing ZIP file ({} bytes) to storage", zip_data.len());
            self.storage.write_file(zip_name, &zip_data).await?;
            return Ok(format!("{}/{}", self.config.output_path(), zip_name));
        }

        let primary = artifacts
            .first()
            .map(|a| a.file_name.clone())
            .ok_or_else(|| EtlError::MissingConfigError {
                field: "output formats".to_string(),
            })?;

        for artifact in &artifacts {
            tracing::debug!(
                "Writing {} ({} bytes) to storage",
                artifact.file_name,
                artifact.data.len()
            );
            self.storage
                .write_file(&artifact.file_name, &artifact.data)
                .await?;
        }

        Ok(format!("{}/{}", self.config.output_path(), primary))
    }
}

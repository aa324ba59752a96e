use crate::domain::model::GeocodeStatus;
use crate::domain::ports::{GeocodeOutcome, Geocoder};
use crate::domain::settings::GeocodingSettings;
use crate::utils::error::{EtlError, Result};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    status: String,
    #[serde(default)]
    results: Vec<GeocodeResult>,
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeocodeResult {
    geometry: Geometry,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    location: LatLng,
}

#[derive(Debug, Deserialize)]
struct LatLng {
    lat: f64,
    lng: f64,
}

/// 單次請求的結果：`Retry` 表示暫時性錯誤，重試用盡後採用其中的狀態
enum Attempt {
    Done(GeocodeOutcome),
    Retry(GeocodeOutcome),
}

/// Google Geocoding API client
pub struct GoogleGeocoder {
    client: Client,
    endpoint: String,
    api_key: String,
    region: Option<String>,
    retry_attempts: u32,
    retry_delay: Duration,
}

impl GoogleGeocoder {
    pub fn new(settings: &GeocodingSettings) -> Result<Self> {
        let api_key = settings
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| EtlError::MissingConfigError {
                field: "geocoding.api_key".to_string(),
            })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            endpoint: settings.endpoint.clone(),
            api_key,
            region: settings.region.clone(),
            retry_attempts: settings.retry_attempts,
            retry_delay: Duration::from_millis(settings.retry_delay_ms),
        })
    }

    async fn attempt(&self, address: &str) -> Attempt {
        let mut request = self
            .client
            .get(&self.endpoint)
            .query(&[("address", address), ("key", self.api_key.as_str())]);
        if let Some(region) = &self.region {
            request = request.query(&[("region", region.as_str())]);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!("Geocoding request failed: {}", e);
                return Attempt::Retry(GeocodeOutcome::failed(GeocodeStatus::Error));
            }
        };

        let status = response.status();
        if status.is_server_error() {
            tracing::debug!("Geocoding service returned {}", status);
            return Attempt::Retry(GeocodeOutcome::failed(GeocodeStatus::Error));
        }
        if !status.is_success() {
            tracing::debug!("Geocoding service returned {}", status);
            return Attempt::Done(GeocodeOutcome::failed(GeocodeStatus::Error));
        }

        let body: GeocodeResponse = match response.json().await {
            Ok(body) => body,
            Err(e) => {
                tracing::debug!("Geocoding response could not be decoded: {}", e);
                return Attempt::Done(GeocodeOutcome::failed(GeocodeStatus::Error));
            }
        };

        match body.status.as_str() {
            "OK" => match body.results.first() {
                Some(result) => Attempt::Done(GeocodeOutcome::success(
                    result.geometry.location.lat,
                    result.geometry.location.lng,
                )),
                None => Attempt::Done(GeocodeOutcome::failed(GeocodeStatus::NoResult)),
            },
            "ZERO_RESULTS" => Attempt::Done(GeocodeOutcome::failed(GeocodeStatus::NoResult)),
            "OVER_QUERY_LIMIT" | "UNKNOWN_ERROR" => {
                tracing::debug!("Geocoding API busy: {}", body.status);
                Attempt::Retry(GeocodeOutcome::failed(GeocodeStatus::ApiError))
            }
            other => {
                tracing::warn!(
                    "⚠️ Geocoding API error {}: {}",
                    other,
                    body.error_message.as_deref().unwrap_or("no message")
                );
                Attempt::Done(GeocodeOutcome::failed(GeocodeStatus::ApiError))
            }
        }
    }
}

#[async_trait::async_trait]
impl Geocoder for GoogleGeocoder {
    async fn geocode(&self, address: &str) -> GeocodeOutcome {
        let mut attempt = 0;
        loop {
            match self.attempt(address).await {
                Attempt::Done(outcome) => return outcome,
                Attempt::Retry(outcome) if attempt >= self.retry_attempts => return outcome,
                Attempt::Retry(_) => {
                    attempt += 1;
                    tokio::time::sleep(self.retry_delay * attempt).await;
                }
            }
        }
    }
}

/// 對每列地址做地理編碼，相同地址只查一次，最多 `concurrency` 個請求同時進行。
///
/// 回傳結果與輸入順序一致；`None` 或空白地址直接標記為 `skipped`。
pub async fn geocode_addresses(
    geocoder: Arc<dyn Geocoder>,
    addresses: &[Option<String>],
    concurrency: usize,
) -> Result<Vec<GeocodeOutcome>> {
    let mut unique: Vec<String> = Vec::new();
    let mut index_of: HashMap<&str, usize> = HashMap::new();
    for address in addresses.iter().flatten() {
        let address = address.trim();
        if !address.is_empty() && !index_of.contains_key(address) {
            index_of.insert(address, unique.len());
            unique.push(address.to_string());
        }
    }

    tracing::info!(
        "🌍 Geocoding {} unique addresses ({} rows, {} concurrent)",
        unique.len(),
        addresses.len(),
        concurrency
    );

    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut tasks = JoinSet::new();
    for (index, address) in unique.iter().cloned().enumerate() {
        let geocoder = Arc::clone(&geocoder);
        let semaphore = Arc::clone(&semaphore);
        tasks.spawn(async move {
            let _permit = semaphore.acquire_owned().await.ok();
            let outcome = geocoder.geocode(&address).await;
            (index, outcome)
        });
    }

    let mut resolved = vec![GeocodeOutcome::failed(GeocodeStatus::Error); unique.len()];
    while let Some(joined) = tasks.join_next().await {
        let (index, outcome) = joined.map_err(|e| EtlError::ProcessingError {
            message: format!("geocoding task failed: {}", e),
        })?;
        resolved[index] = outcome;
    }

    Ok(addresses
        .iter()
        .map(|address| {
            address
                .as_deref()
                .map(str::trim)
                .and_then(|a| index_of.get(a))
                .map(|&i| resolved[i])
                .unwrap_or_else(|| GeocodeOutcome::failed(GeocodeStatus::Skipped))
        })
        .collect())
}

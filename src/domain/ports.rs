use crate::domain::model::{Dataset, GeocodeStatus, TransformResult};
use crate::domain::settings::{CleaningRules, GeocodingSettings, OutputSettings};
use crate::utils::error::Result;
use async_trait::async_trait;

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

pub trait ConfigProvider: Send + Sync {
    fn input_file(&self) -> &str;
    fn output_path(&self) -> &str;
    /// 郵遞區號對照表（csv / tsv / xlsx）
    fn lookup_files(&self) -> &[String];
    fn concurrent_requests(&self) -> usize;
    fn cleaning_rules(&self) -> CleaningRules;
    fn geocoding(&self) -> GeocodingSettings;
    fn output_settings(&self) -> OutputSettings;

    fn max_records(&self) -> Option<usize> {
        None
    }
}

#[async_trait]
pub trait Pipeline: Send + Sync {
    async fn extract(&self) -> Result<Dataset>;
    async fn transform(&self, data: Dataset) -> Result<TransformResult>;
    async fn load(&self, result: TransformResult) -> Result<String>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeocodeOutcome {
    pub status: GeocodeStatus,
    pub location: Option<(f64, f64)>,
}

impl GeocodeOutcome {
    pub fn success(lat: f64, lng: f64) -> Self {
        Self {
            status: GeocodeStatus::Success,
            location: Some((lat, lng)),
        }
    }

    pub fn failed(status: GeocodeStatus) -> Self {
        Self {
            status,
            location: None,
        }
    }
}

/// 地址轉經緯度；失敗以狀態表示，不會中斷整個流程
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn geocode(&self, address: &str) -> GeocodeOutcome;
}

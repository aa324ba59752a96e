pub mod cleaning;
pub mod etl;
pub mod export;
pub mod geocode;
pub mod pipeline;
pub mod postcode;
pub mod xlsx;

pub use crate::domain::model::{Dataset, Record, TransformResult};
pub use crate::domain::ports::{ConfigProvider, Geocoder, Pipeline, Storage};
pub use crate::utils::error::Result;

pub mod data_provider;
pub mod fmp;

pub use data_provider::{DataProviderClient, ProviderError};
pub use fmp::FmpProvider;

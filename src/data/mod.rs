pub mod fetcher;
pub mod filtering;
pub mod parquet;

pub use fetcher::Fetcher;
pub use filtering::apply_query_filters;
pub use parquet::ParquetConnector;

pub mod error;
pub mod fetcher;
pub mod paginate;
pub mod snapshot;
pub mod types;

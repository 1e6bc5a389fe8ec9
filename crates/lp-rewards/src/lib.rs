pub mod audit;
pub mod calculator;
pub mod error;
pub mod ingestor;
pub mod report;
pub mod serializer;
pub mod settings;
pub mod store;

pub mod batch;
pub mod classifier;
pub mod decode_service;
pub mod describe_service;
pub mod file_source;
pub mod fs_service;
pub mod ingestion;

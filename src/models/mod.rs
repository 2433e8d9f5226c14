pub mod classify_types;
pub mod describe_types;
pub mod upload_types;

pub mod classifier;
pub mod describe;

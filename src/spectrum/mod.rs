pub mod analysis;
pub mod consumer;
pub mod sink;

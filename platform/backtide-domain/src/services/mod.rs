pub mod analyzers;
pub mod engine;
pub mod features;
pub mod strategy;

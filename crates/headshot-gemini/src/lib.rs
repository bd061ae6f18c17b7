pub mod client;
pub mod config;
pub mod types;

pub use client::GeminiGenerator;
pub use config::GeminiConfig;

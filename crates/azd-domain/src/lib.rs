pub mod config;
pub mod error;
pub mod keys;
pub mod options;
pub mod types;

#[cfg(test)]
mod tests;

pub use config::ConfigTree;
pub use error::DomainError;
pub use options::Options;
pub use types::*;

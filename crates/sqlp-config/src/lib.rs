pub mod config;
pub mod error;
pub mod utils;

pub use config::{Config, Placeholder};

#[cfg(test)]
pub mod test_utils;

/*!
 * Core Module
 * Fundamental types, error handling, configuration and wire encoding
 */

pub mod bincode;
pub mod config;
pub mod errors;
pub mod sync;
pub mod types;

// Re-export for convenience
pub use config::ContextConfig;
pub use errors::*;
pub use types::*;

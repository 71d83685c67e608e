pub mod api;
pub mod errors;
pub mod models;
pub mod services;
pub mod state;
pub mod storage;
pub mod utils;

// Re-export commonly used types
pub use errors::{SwiftError, SwiftResult, ValidationError};
pub use state::{AppConfig, AppState};

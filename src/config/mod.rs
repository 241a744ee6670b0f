// Configuration module
// Public interface for configuration loading

pub mod constants;
mod loader;
mod settings;

pub use loader::load_settings;
pub use settings::{default_key_store_path, DirectoryConfig, ServiceConfig, Settings};

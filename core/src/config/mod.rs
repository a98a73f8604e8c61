//! TOML configuration: storage root, asset host coordinates, logging, and
//! generation defaults.

mod load;
mod types;

pub use load::{data_dir, load_default};
pub use types::{AppConfig, AssetHostConfig, GenerateConfig, LoggingConfig, StorageConfig};

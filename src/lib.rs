pub mod config;
pub mod imagegen;
pub mod utils;

pub use imagegen::{
    AspectRatio, ErrorKind, ImageGenError, ImageGenService, ImageGenSystemConfig, ImageResult,
    JsonFilePreferenceStore, ProviderId,
};

use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Install the fmt subscriber, filtered by `RUST_LOG` (default `info`).
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Build the service the way the app shell does at startup: config and the
/// provider preference both live in the app data directory.
pub fn init_default_service() -> ImageGenService {
    let app_data = config::app_data_dir();
    let config = imagegen::config::load_config(&app_data.join("imagegen_config.json"));
    let store = Arc::new(JsonFilePreferenceStore::default_location());
    ImageGenService::init_from_config(&config, store)
}

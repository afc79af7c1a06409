//! Logging utilities and structured logging support

pub use log::{debug, info, warn, error, trace};

/// Initialize the logging system from the `RUST_LOG` environment variable
pub fn init() {
    // A host may already have installed a logger; keep theirs.
    let _ = env_logger::try_init();
}

/// Initialize the logging system with a default filter such as `"info"` or
/// `"scene_engine=debug"`, still overridable through `RUST_LOG`
pub fn init_with_level(level: &str) {
    let env = env_logger::Env::default().default_filter_or(level);
    let _ = env_logger::Builder::from_env(env).try_init();
}

pub mod cli;
pub mod config;
pub mod entry_points;
pub mod error;
pub mod host;
pub mod hostfxr;
pub mod interop;
pub mod reload;
pub mod runtime;
pub mod scene;
pub mod time;

pub use config::ScriptingConfig;
pub use error::{ScriptError, ScriptResult};
pub use host::{AssemblyLoadReport, ScriptHost};
pub use reload::{AssemblyReloader, ReloadReport};

/// Installs the `tracing` subscriber used by the binaries. `RUST_LOG` wins over `default_level`.
pub fn init_logging(default_level: &str) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::registry().with(filter).with(tracing_subscriber::fmt::layer()).try_init();
}

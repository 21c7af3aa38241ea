pub mod config;
pub mod context;
pub mod diagnostics;
pub mod error;
pub mod inject;
pub mod journal;
pub mod path;
pub mod providers;
pub mod proxy;
pub mod server;

pub use config::GatewayConfig;
pub use error::{GatewayError, Result};
pub use journal::SharedJournal;
pub use providers::ModelProviderMap;
pub use server::{build_router, AppState};

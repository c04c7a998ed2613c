pub mod config;
pub mod error;
pub mod logging;
pub mod providers;
pub mod proxy;
pub mod router;
pub mod server;
pub mod translate;

pub use config::BridgeConfig;
pub use error::{BridgeError, Result};
pub use logging::SharedJournal;
pub use router::SmartRouter;
pub use server::{build_router, AppState};

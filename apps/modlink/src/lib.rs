//! # modlink
//!
//! The binary side of modlink: a loader for `file://` and `http(s)://`
//! identifiers, a declarative unit format, and the CLI that drives
//! `modlink-core` over them.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                     apps/modlink (THE BINARY)                │
//! │                                                              │
//! │  ┌─────────┐    ┌──────────────┐    ┌─────────────────────┐  │
//! │  │   CLI   │───▶│    driver    │◀───│  fetch tasks        │  │
//! │  │ (clap)  │    │ (one thread) │    │ (tokio::fs/reqwest) │  │
//! │  └─────────┘    └──────┬───────┘    └─────────────────────┘  │
//! │                        ▼                                     │
//! │                ┌───────────────┐                             │
//! │                │ modlink-core  │                             │
//! │                │  (THE LOGIC)  │                             │
//! │                └───────────────┘                             │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod cli;
pub mod config;
pub mod driver;
pub mod error;
pub mod loader;
pub mod unit;

pub use config::{AppConfig, LoaderConfig};
pub use driver::{ModuleReport, RunReport};
pub use error::AppError;
pub use loader::{ChannelLoader, Fetcher};
pub use unit::UnitSource;

//! # electra-server
//!
//! axum service over [`electra_store::GridRepository`] and
//! [`electra_engine::GridEngine`]: circuit upload and ingest, element
//! listing and status switching, power flow on demand, and a database
//! health probe.

pub mod config;
pub mod error;
pub mod extract;
pub mod logging;
pub mod routes;
pub mod services;
pub mod state;

pub use config::ElectraConfig;
pub use error::{ApiError, ApiResult};
pub use routes::router;
pub use state::AppState;

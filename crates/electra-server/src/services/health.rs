use serde::Serialize;
use tracing::warn;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct DbHealth {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DbHealth {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

pub async fn check_db(state: &AppState) -> DbHealth {
    match state.repo.ping().await {
        Ok(()) => DbHealth {
            status: "ok",
            error: None,
        },
        Err(e) => {
            warn!(error = %e, "database health check failed");
            DbHealth {
                status: "error",
                error: Some(e.to_string()),
            }
        }
    }
}

use std::sync::{Arc, OnceLock};

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Extension, Json,
};
use kma_ingest::{RecurringTask, RunOutcome, RunStatus, TimeWindow};
use log::{info, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{AppState, AuthenticatedKey};

/// Window bounds for a manual run, `YYYYMMDDHH[mm]`.
#[derive(Debug, Deserialize)]
pub struct WindowParams {
    pub tm1: String,
    pub tm2: String,
}

impl WindowParams {
    pub fn into_window(self) -> Result<TimeWindow, (StatusCode, String)> {
        for (name, value) in [("tm1", &self.tm1), ("tm2", &self.tm2)] {
            if !stamp_pattern().is_match(value) {
                return Err((
                    StatusCode::BAD_REQUEST,
                    format!("{} must be 10~12 digits", name),
                ));
            }
        }
        Ok(TimeWindow::new(self.tm1, self.tm2))
    }
}

fn stamp_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\d{10,12}$").unwrap())
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct RunReport {
    pub status: String,
    pub code: u16,
    pub count: usize,
    pub errors: Vec<String>,
}

impl From<RunOutcome> for RunReport {
    fn from(outcome: RunOutcome) -> Self {
        RunReport {
            status: outcome.status.to_string(),
            code: outcome.status.code(),
            count: outcome.count,
            errors: outcome.errors,
        }
    }
}

/// Run the observation flow once over `[tm1, tm2]`.
pub async fn fetch_observations(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AuthenticatedKey>,
    Query(params): Query<WindowParams>,
) -> Result<Json<RunReport>, (StatusCode, String)> {
    trigger(state.observations.as_ref(), &caller, params).await
}

/// Run the forecast flow once over `[tm1, tm2]`.
pub async fn fetch_forecasts(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<AuthenticatedKey>,
    Query(params): Query<WindowParams>,
) -> Result<Json<RunReport>, (StatusCode, String)> {
    trigger(state.forecasts.as_ref(), &caller, params).await
}

async fn trigger(
    task: &dyn RecurringTask,
    caller: &AuthenticatedKey,
    params: WindowParams,
) -> Result<Json<RunReport>, (StatusCode, String)> {
    let window = params.into_window()?;
    info!("[{}] manual run by {}: {}", task.name(), caller.owner, window);

    let outcome = task.run(&window).await;
    if outcome.status == RunStatus::ProcessingError {
        warn!("[{}] manual run failed: {}", task.name(), outcome.errors.join("; "));
    }
    Ok(Json(RunReport::from(outcome)))
}

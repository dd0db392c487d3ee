use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    /// Upstream answered with a blank body; counts as a zero-record success.
    EmptyResponse,
    /// Well-formed response without any payload entries.
    NoDataFound,
    ProcessingError,
}

impl RunStatus {
    /// HTTP-style code reported alongside the status.
    pub fn code(&self) -> u16 {
        match self {
            RunStatus::Success | RunStatus::EmptyResponse => 200,
            RunStatus::NoDataFound => 204,
            RunStatus::ProcessingError => 500,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, RunStatus::ProcessingError)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunStatus::Success => "success",
            RunStatus::EmptyResponse => "empty_response",
            RunStatus::NoDataFound => "no_data_found",
            RunStatus::ProcessingError => "processing_error",
        };
        f.write_str(name)
    }
}

/// Result of one fetch → parse → sink run.
///
/// `errors` carries the per-line / per-element failures that were skipped,
/// or the single failure that aborted the run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunOutcome {
    pub status: RunStatus,
    pub count: usize,
    pub errors: Vec<String>,
}

impl RunOutcome {
    pub fn success(count: usize) -> Self {
        Self::with_status(RunStatus::Success, count)
    }

    pub fn empty_response() -> Self {
        Self::with_status(RunStatus::EmptyResponse, 0)
    }

    pub fn no_data() -> Self {
        Self::with_status(RunStatus::NoDataFound, 0)
    }

    pub fn processing_error(count: usize, reason: impl fmt::Display) -> Self {
        Self {
            status: RunStatus::ProcessingError,
            count,
            errors: vec![reason.to_string()],
        }
    }

    pub fn with_errors<I, E>(mut self, errors: I) -> Self
    where
        I: IntoIterator<Item = E>,
        E: fmt::Display,
    {
        self.errors.extend(errors.into_iter().map(|e| e.to_string()));
        self
    }

    fn with_status(status: RunStatus, count: usize) -> Self {
        Self {
            status,
            count,
            errors: Vec::new(),
        }
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "status={} code={} count={} errors={}",
            self.status,
            self.status.code(),
            self.count,
            self.errors.len()
        )
    }
}

use serde::Serialize;
use std::fmt;

/// Uniform result shape of every store operation: a success flag plus a
/// human-readable status line meant for display.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[must_use]
pub struct Outcome {
    pub success: bool,
    pub message: String,
}

impl Outcome {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }

    pub fn from_result<T, E: fmt::Display>(result: &Result<T, E>, success: &str) -> Self {
        match result {
            Ok(_) => Self::success(success),
            Err(error) => Self::failure(error.to_string()),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flag = if self.success { "ok" } else { "failed" };
        write!(f, "[{flag}] {}", self.message)
    }
}

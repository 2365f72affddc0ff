//! Activation state machine
//!
//! `Unresolved -> Resolved -> Materialized -> Loaded`, with `Failed`
//! reachable from every non-terminal state. Terminal states never move again:
//! a failure is retried by the next process, not by this one.

use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

use crate::activation::{ActivationReport, ErrorKind};
use crate::platform::VariantKey;

/// Rejected transition
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Invalid state transition: {from} -> {to}")]
pub struct StateError {
    pub from: &'static str,
    pub to: &'static str,
}

/// Why activation failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LoaderState {
    #[default]
    Unresolved,
    Resolved(VariantKey),
    Materialized {
        variant: VariantKey,
        path: PathBuf,
    },
    Loaded(ActivationReport),
    Failed(Failure),
}

impl LoaderState {
    pub fn name(&self) -> &'static str {
        match self {
            LoaderState::Unresolved => "unresolved",
            LoaderState::Resolved(_) => "resolved",
            LoaderState::Materialized { .. } => "materialized",
            LoaderState::Loaded(_) => "loaded",
            LoaderState::Failed(_) => "failed",
        }
    }

    /// Stable integer form for the C API
    pub fn code(&self) -> i32 {
        match self {
            LoaderState::Unresolved => 0,
            LoaderState::Resolved(_) => 1,
            LoaderState::Materialized { .. } => 2,
            LoaderState::Loaded(_) => 3,
            LoaderState::Failed(_) => 4,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, LoaderState::Loaded(_) | LoaderState::Failed(_))
    }

    pub fn resolve(&mut self, variant: VariantKey) -> Result<(), StateError> {
        match self {
            LoaderState::Unresolved => {
                *self = LoaderState::Resolved(variant);
                Ok(())
            }
            _ => Err(self.reject("resolved")),
        }
    }

    pub fn materialize(&mut self, path: PathBuf) -> Result<(), StateError> {
        match *self {
            LoaderState::Resolved(variant) => {
                *self = LoaderState::Materialized { variant, path };
                Ok(())
            }
            _ => Err(self.reject("materialized")),
        }
    }

    pub fn finish(&mut self, report: ActivationReport) -> Result<(), StateError> {
        match self {
            LoaderState::Materialized { .. } => {
                *self = LoaderState::Loaded(report);
                Ok(())
            }
            _ => Err(self.reject("loaded")),
        }
    }

    pub fn fail(&mut self, failure: Failure) -> Result<(), StateError> {
        if self.is_terminal() {
            return Err(self.reject("failed"));
        }
        *self = LoaderState::Failed(failure);
        Ok(())
    }

    fn reject(&self, to: &'static str) -> StateError {
        StateError {
            from: self.name(),
            to,
        }
    }
}

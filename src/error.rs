use std::fmt;

use thiserror::Error;

use crate::provider::nat::NatError;
use crate::provider::ApiError;

#[derive(Error, Debug)]
pub enum DriverError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Api(#[from] ApiError),

    /// A failure annotated with the orchestrator step it happened in,
    /// rendered as `error creating LAN: <cause>`.
    #[error("error {step}: {source}")]
    Step {
        step: &'static str,
        source: Box<DriverError>,
    },

    #[error("Cloud-init error: {0}")]
    CloudInit(String),

    #[error(transparent)]
    Nat(#[from] NatError),

    #[error("{0}")]
    Image(String),

    #[error("error getting server information")]
    ServerState(String),

    #[error("{0}")]
    Machine(String),

    #[error("Machine '{0}' does not exist")]
    MachineNotFound(String),

    #[error("timeout has expired waiting for {0}")]
    Timeout(String),

    #[error("{0}")]
    Teardown(TeardownErrors),

    /// Creation failed and cleaning up after it failed too.
    #[error("{source}\nrollback failed: {rollback}")]
    Rollback {
        source: Box<DriverError>,
        rollback: Box<DriverError>,
    },

    #[error("SSH key error: {0}")]
    Ssh(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Dialog error: {0}")]
    Dialog(#[from] dialoguer::Error),
}

pub type Result<T> = std::result::Result<T, DriverError>;

/// Attach the name of an orchestrator step to an error.
pub trait StepContext<T> {
    fn step(self, step: &'static str) -> Result<T>;
}

impl<T, E> StepContext<T> for std::result::Result<T, E>
where
    E: Into<DriverError>,
{
    fn step(self, step: &'static str) -> Result<T> {
        self.map_err(|e| DriverError::Step {
            step,
            source: Box::new(e.into()),
        })
    }
}

/// Every failure collected while tearing a machine down.
#[derive(Debug, Default)]
pub struct TeardownErrors {
    errors: Vec<DriverError>,
}

impl TeardownErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep the error of a failed step; successful steps are ignored
    pub fn record(&mut self, step: &'static str, result: Result<()>) {
        if let Err(e) = result.step(step) {
            tracing::warn!("{}", e);
            self.errors.push(e);
        }
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[DriverError] {
        &self.errors
    }

    /// `Ok` only when nothing failed
    pub fn into_result(self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(DriverError::Teardown(self))
        }
    }
}

impl fmt::Display for TeardownErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let noun = if self.errors.len() == 1 {
            "error"
        } else {
            "errors"
        };
        write!(f, "{} {} occurred:", self.errors.len(), noun)?;
        for e in &self.errors {
            write!(f, "\n\t* {}", e)?;
        }
        Ok(())
    }
}

impl std::error::Error for TeardownErrors {}

// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

use crate::exit_code::ExitCode;

/// Pairs any failure with the exit code `main` should return for it (§6).
#[derive(Debug, Error)]
#[error("{source}")]
pub struct CliError {
    pub code: ExitCode,
    pub source: anyhow::Error,
}

impl CliError {
    pub fn new(code: ExitCode, source: anyhow::Error) -> Self {
        Self { code, source }
    }
}

pub type CliResult<T> = Result<T, CliError>;

/// Attaches an exit code to an `anyhow::Error`-returning expression.
pub trait WithExitCode<T> {
    fn with_exit_code(self, code: ExitCode) -> CliResult<T>;
}

impl<T, E> WithExitCode<T> for Result<T, E>
where
    E: Into<anyhow::Error>,
{
    fn with_exit_code(self, code: ExitCode) -> CliResult<T> {
        self.map_err(|e| CliError::new(code, e.into()))
    }
}

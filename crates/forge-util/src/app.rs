// SPDX-License-Identifier: Apache-2.0

use std::fmt::Debug;
use std::sync::Arc;

use anyhow::Result;

use crate::sandbox::Sandbox;

/// Process-wide exit code. `main` should return this to `std::process::exit`
/// rather than unwinding past it.
#[must_use = "the exit code for the application should be returned and bubbled up to `main`"]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ExitCode(pub i32);

/// Immutable, shared context threaded through every producer invocation in
/// the async map, replacing the source's global singletons for sandboxing
/// and process bookkeeping. Deliberately does not hold a logging or
/// statistics singleton; those are passed alongside by the caller that owns
/// them (`forge-progress::Statistics`, `forge-tracing::chrome::Trace`).
#[derive(Clone)]
pub struct App {
    sandbox: Arc<Sandbox>,
}

impl Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App").finish()
    }
}

impl App {
    pub fn new(preserve_sandbox_contents: bool, with_name_prefix: Option<&str>) -> Result<Self> {
        let sandbox = Arc::new(Sandbox::new(preserve_sandbox_contents, with_name_prefix)?);
        Ok(Self { sandbox })
    }

    pub fn new_for_testing() -> Result<Self> {
        Ok(Self {
            sandbox: Arc::new(Sandbox::for_testing()?),
        })
    }

    pub fn sandbox(&self) -> Arc<Sandbox> {
        self.sandbox.clone()
    }
}

// SPDX-License-Identifier: Apache-2.0

//! The §6 exit-code contract, a `#[repr(i32)]` enum matching
//! `forge_util::app::ExitCode(pub i32)`'s intent (a process-wide code that
//! `main` returns to `std::process::exit` rather than unwinding past).

#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success = 0,
    /// The downstream build tool (or action command) exited non-zero.
    ExecFailure = 64,
    /// An error not covered by a more specific code below.
    Generic = 65,
    UnknownSubcommand = 66,
    /// Malformed command-line arguments.
    ClArgs = 67,
    /// A malformed or unreadable multi-repository config.
    Config = 68,
    FetchFailure = 69,
    UpdateFailure = 70,
    SetupFailure = 71,
    /// An invariant the engine itself is supposed to uphold was violated.
    Builtin = 72,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        self as i32
    }
}

// SPDX-License-Identifier: Apache-2.0

pub mod do_cmd;
pub mod fetch;
pub mod setup;
pub mod update;

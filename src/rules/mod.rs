// SPDX-License-Identifier: MIT

pub mod condition;
pub mod environment;
pub mod loader;
pub mod probe;
pub mod registry;
pub mod types;

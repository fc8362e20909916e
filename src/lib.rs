// SPDX-License-Identifier: MIT

//! Condition engine for installers
//!
//! Conditions gate which panels an installer shows and which packs it may
//! install. They are declared in a YAML rules specification, registered in a
//! [`rules::registry::ConditionRegistry`] and queried by id or by compact
//! expression such as `os.linux+!selected.docs`.

pub mod error;
pub mod rules;

// SPDX-License-Identifier: MIT

//! Installer state consumed by conditions
//!
//! Conditions read variables, the pack selection and the current user through
//! narrow collaborator traits. [`InstallData`] is a simple in-memory host
//! implementation; [`Environment`] bundles whichever implementations the host
//! supplies.

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::rules::probe::{OsInfo, ProbeRegistry, SymbolResolver};

/// An installable package, consumed read-only
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
pub struct Pack {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub required: bool,
    /// Condition expression that gates installing this pack
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

impl Pack {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn is_required(&self) -> bool {
        self.required
    }
}

/// Name to value lookup of installer variables
pub trait VariableStore: Send + Sync {
    fn variable(&self, name: &str) -> Option<String>;
}

/// Expands variable references in a string
pub trait VariableSubstitutor: Send + Sync {
    fn substitute(&self, text: &str) -> String;
}

/// Known and currently selected packs
pub trait PackSource: Send + Sync {
    fn all_packs(&self) -> Vec<Pack>;
    fn selected_packs(&self) -> Vec<Pack>;
}

/// Identity of the user running the installer
pub trait UserIdentity: Send + Sync {
    fn current_user(&self) -> Option<String>;
}

static VARIABLE_REFERENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{([^}]+)\}|\$([A-Za-z0-9_.\-]+)").expect("variable pattern is valid")
});

/// Substitutor expanding `${name}` and `$name` from a [`VariableStore`].
/// Unknown references are left as they are.
pub struct StoreSubstitutor {
    store: Arc<dyn VariableStore>,
}

impl StoreSubstitutor {
    pub fn new(store: Arc<dyn VariableStore>) -> Self {
        Self { store }
    }
}

impl VariableSubstitutor for StoreSubstitutor {
    fn substitute(&self, text: &str) -> String {
        VARIABLE_REFERENCE
            .replace_all(text, |caps: &Captures<'_>| {
                let name = caps
                    .get(1)
                    .or_else(|| caps.get(2))
                    .map(|m| m.as_str())
                    .unwrap_or_default();
                self.store
                    .variable(name)
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }
}

/// Reports the login name from `USER` or `USERNAME`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemUser;

impl UserIdentity for SystemUser {
    fn current_user(&self) -> Option<String> {
        std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .ok()
    }
}

/// In-memory installer state
#[derive(Debug, Default)]
pub struct InstallData {
    variables: RwLock<HashMap<String, String>>,
    packs: Vec<Pack>,
    selected: RwLock<Vec<String>>,
    user: RwLock<Option<String>>,
}

impl InstallData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_packs(packs: Vec<Pack>) -> Self {
        Self {
            packs,
            ..Self::default()
        }
    }

    pub fn set_variable(&self, name: impl Into<String>, value: impl Into<String>) {
        self.variables.write().insert(name.into(), value.into());
    }

    pub fn unset_variable(&self, name: &str) {
        self.variables.write().remove(name);
    }

    /// Mark a pack as selected. Ids of unknown packs are kept but never reported.
    pub fn select_pack(&self, pack_id: impl Into<String>) {
        let pack_id = pack_id.into();
        let mut selected = self.selected.write();
        if !selected.contains(&pack_id) {
            selected.push(pack_id);
        }
    }

    pub fn deselect_pack(&self, pack_id: &str) {
        self.selected.write().retain(|id| id != pack_id);
    }

    pub fn set_user(&self, user: Option<String>) {
        *self.user.write() = user;
    }
}

impl VariableStore for InstallData {
    fn variable(&self, name: &str) -> Option<String> {
        self.variables.read().get(name).cloned()
    }
}

impl PackSource for InstallData {
    fn all_packs(&self) -> Vec<Pack> {
        self.packs.clone()
    }

    fn selected_packs(&self) -> Vec<Pack> {
        let selected = self.selected.read();
        self.packs
            .iter()
            .filter(|pack| selected.contains(&pack.id))
            .cloned()
            .collect()
    }
}

impl UserIdentity for InstallData {
    fn current_user(&self) -> Option<String> {
        self.user.read().clone()
    }
}

/// The collaborators a registry evaluates conditions against
#[derive(Clone)]
pub struct Environment {
    variables: Arc<dyn VariableStore>,
    substitutor: Arc<dyn VariableSubstitutor>,
    packs: Arc<dyn PackSource>,
    user: Arc<dyn UserIdentity>,
    symbols: Arc<dyn SymbolResolver>,
}

impl Environment {
    /// Environment backed by `data`, with `${var}` substitution over its
    /// variables and the `OsVersion` probe for the running host
    pub fn new(data: Arc<InstallData>) -> Self {
        let variables: Arc<dyn VariableStore> = data.clone();
        Self {
            substitutor: Arc::new(StoreSubstitutor::new(variables.clone())),
            variables,
            packs: data.clone(),
            user: data,
            symbols: Arc::new(ProbeRegistry::with_os(&OsInfo::detect())),
        }
    }

    pub fn with_substitutor(mut self, substitutor: Arc<dyn VariableSubstitutor>) -> Self {
        self.substitutor = substitutor;
        self
    }

    pub fn with_user(mut self, user: Arc<dyn UserIdentity>) -> Self {
        self.user = user;
        self
    }

    pub fn with_symbols(mut self, symbols: Arc<dyn SymbolResolver>) -> Self {
        self.symbols = symbols;
        self
    }

    pub fn variable(&self, name: &str) -> Option<String> {
        self.variables.variable(name)
    }

    pub fn substitute(&self, text: &str) -> String {
        self.substitutor.substitute(text)
    }

    pub fn all_packs(&self) -> Vec<Pack> {
        self.packs.all_packs()
    }

    pub fn selected_packs(&self) -> Vec<Pack> {
        self.packs.selected_packs()
    }

    pub fn current_user(&self) -> Option<String> {
        self.user.current_user()
    }

    pub fn symbols(&self) -> &dyn SymbolResolver {
        self.symbols.as_ref()
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new(Arc::new(InstallData::new()))
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data_with(pairs: Vec<(&str, &str)>) -> Arc<InstallData> {
        let data = InstallData::new();
        for (k, v) in pairs {
            data.set_variable(k, v);
        }
        Arc::new(data)
    }

    #[test]
    fn test_substitute_braced_and_bare() {
        let env = Environment::new(data_with(vec![("INSTALL_PATH", "/opt/app"), ("v", "2")]));
        assert_eq!(env.substitute("${INSTALL_PATH}/bin"), "/opt/app/bin");
        assert_eq!(env.substitute("$INSTALL_PATH"), "/opt/app");
        assert_eq!(env.substitute("version $v here"), "version 2 here");
    }

    #[test]
    fn test_substitute_leaves_unknown_references() {
        let env = Environment::new(data_with(vec![]));
        assert_eq!(env.substitute("${missing}/x"), "${missing}/x");
        assert_eq!(env.substitute("$missing"), "$missing");
        assert_eq!(env.substitute("plain text"), "plain text");
    }

    #[test]
    fn test_variables_set_and_unset() {
        let data = data_with(vec![("a", "1")]);
        assert_eq!(data.variable("a"), Some("1".to_string()));
        data.unset_variable("a");
        assert_eq!(data.variable("a"), None);
    }

    #[test]
    fn test_selected_packs_follow_pack_order() {
        let data = InstallData::with_packs(vec![
            Pack::new("core", "Core"),
            Pack::new("docs", "Documentation"),
            Pack::new("samples", "Samples"),
        ]);
        data.select_pack("samples");
        data.select_pack("core");
        data.select_pack("unknown");

        let ids: Vec<String> = data.selected_packs().into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec!["core", "samples"]);

        data.deselect_pack("core");
        assert_eq!(data.selected_packs().len(), 1);
        assert_eq!(data.all_packs().len(), 3);
    }

    #[test]
    fn test_user_identity() {
        let data = Arc::new(InstallData::new());
        let env = Environment::new(data.clone());
        assert_eq!(env.current_user(), None);
        data.set_user(Some("admin".to_string()));
        assert_eq!(env.current_user(), Some("admin".to_string()));
    }

    #[test]
    fn test_pack_builders() {
        let pack = Pack::new("core", "Core").required().with_condition("os.linux");
        assert!(pack.is_required());
        assert_eq!(pack.condition.as_deref(), Some("os.linux"));
    }
}

// SPDX-License-Identifier: MIT

//! Condition registry
//!
//! The registry owns every registered condition together with the panel and
//! pack bindings, and answers the installer's gating queries. Lookups accept
//! either a registered id or a compact expression over registered ids.

use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::error::{ConfigError, EvaluationError, ParseError};
use crate::rules::condition::{self, Condition, ConditionKind, DynamicProbe, Operand};
use crate::rules::environment::Environment;
use crate::rules::probe::OS_VERSION_TYPE;
use crate::rules::types::{ConditionSpec, PackConditionSpec, PanelConditionSpec, RulesSpec};

/// Built-in operating system conditions as `(id, short id, OsVersion flag)`.
///
/// The `izpack.*` ids are the ones existing rules files use; the `os.*` ids
/// are shorter aliases for the same probe.
pub const OS_CONDITIONS: &[(&str, &str, &str)] = &[
    ("izpack.aixinstall", "os.aix", "IS_AIX"),
    ("izpack.windowsinstall", "os.windows", "IS_WINDOWS"),
    ("izpack.windowsinstall.xp", "os.windows.xp", "IS_WINDOWS_XP"),
    ("izpack.windowsinstall.2003", "os.windows.2003", "IS_WINDOWS_2003"),
    ("izpack.windowsinstall.vista", "os.windows.vista", "IS_WINDOWS_VISTA"),
    ("izpack.windowsinstall.7", "os.windows.7", "IS_WINDOWS_7"),
    ("izpack.linuxinstall", "os.linux", "IS_LINUX"),
    ("izpack.solarisinstall", "os.solaris", "IS_SUNOS"),
    ("izpack.macinstall", "os.mac", "IS_MAC"),
    ("izpack.solarisinstall.x86", "os.solaris.x86", "IS_SUNOS_X86"),
    ("izpack.solarisinstall.sparc", "os.solaris.sparc", "IS_SUNOS_SPARC"),
];

/// Prefixes of the built-in pack selection conditions, `izpack.selected.<packid>`
/// and the short `selected.<packid>`
pub const SELECTED_PREFIXES: &[&str] = &["izpack.selected.", "selected."];

/// Registry of conditions and panel/pack bindings
#[derive(Debug)]
pub struct ConditionRegistry {
    conditions: HashMap<String, Condition>,
    order: Vec<String>,
    builtin: HashSet<String>,
    panel_conditions: HashMap<String, String>,
    pack_conditions: HashMap<String, String>,
    optional_pack_conditions: HashMap<String, String>,
    environment: Environment,
}

impl ConditionRegistry {
    /// Create a registry over `environment`, seeded with the built-in OS
    /// conditions, `izpack.selected.<packid>` and `selected.<packid>` per known pack and the
    /// conditions packs declare for themselves
    pub fn new(environment: Environment) -> Self {
        let mut registry = Self {
            conditions: HashMap::new(),
            order: Vec::new(),
            builtin: HashSet::new(),
            panel_conditions: HashMap::new(),
            pack_conditions: HashMap::new(),
            optional_pack_conditions: HashMap::new(),
            environment,
        };

        for (id, short, field) in OS_CONDITIONS {
            for id in [id, short] {
                registry.insert_builtin(Condition::probe(
                    *id,
                    DynamicProbe::field(OS_VERSION_TYPE, *field, "true", "boolean"),
                ));
            }
        }

        for pack in registry.environment.all_packs() {
            if pack.id.is_empty() {
                continue;
            }
            for prefix in SELECTED_PREFIXES {
                registry.insert_builtin(Condition::pack_selected(
                    format!("{}{}", prefix, pack.id),
                    pack.id.clone(),
                ));
            }
            if let Some(expression) = pack.condition.filter(|c| !c.is_empty()) {
                registry.pack_conditions.insert(pack.id, expression);
            }
        }

        registry
    }

    fn insert_builtin(&mut self, condition: Condition) {
        let id = condition.id().to_string();
        self.builtin.insert(id.clone());
        self.order.push(id.clone());
        self.conditions.insert(id, condition);
    }

    /// Register a condition.
    ///
    /// Fails if the id is taken, leaving the earlier registration in place, or
    /// if a reference or operand link does not resolve yet.
    pub fn register(&mut self, condition: Condition) -> Result<(), ConfigError> {
        let id = condition.id().to_string();
        if self.conditions.contains_key(&id) {
            log::error!("Condition with id '{}' is already registered", id);
            return Err(ConfigError::DuplicateCondition(id));
        }
        self.check_links(&id, &condition)?;

        log::debug!("Registered condition {} ({})", id, condition.type_tag());
        self.order.push(id.clone());
        self.conditions.insert(id, condition);
        Ok(())
    }

    fn check_links(&self, owner: &str, condition: &Condition) -> Result<(), ConfigError> {
        if let ConditionKind::Ref { target } = condition.kind() {
            if self.get_condition(target).is_none() {
                return Err(ConfigError::unresolved(owner, target.as_str()));
            }
        }
        for operand in condition.operands() {
            match operand {
                Operand::Id(target) => {
                    if self.get_condition(target).is_none() {
                        return Err(ConfigError::unresolved(owner, target.as_str()));
                    }
                }
                Operand::Inline(inner) => self.check_links(owner, inner)?,
            }
        }
        Ok(())
    }

    /// Look up a condition by id, or parse `id` as a compact expression over
    /// registered ids. Expressions yield an anonymous, unregistered condition.
    pub fn get_condition(&self, id: &str) -> Option<Cow<'_, Condition>> {
        if let Some(condition) = self.conditions.get(id) {
            return Some(Cow::Borrowed(condition));
        }
        match condition::parse(id, |candidate| self.conditions.contains_key(candidate)) {
            Ok(Operand::Inline(condition)) => Some(Cow::Owned(*condition)),
            Ok(Operand::Id(id)) => self.conditions.get(&id).map(Cow::Borrowed),
            Err(e @ ParseError::TooComplex { .. }) => {
                log::warn!("{}", e);
                None
            }
            Err(e) => {
                log::debug!("{}", e);
                None
            }
        }
    }

    /// Whether the condition (or expression) `id` holds.
    ///
    /// Unknown ids are true. Structural faults during evaluation are logged
    /// and read as false.
    pub fn is_condition_true(&self, id: &str) -> bool {
        match self.get_condition(id) {
            Some(condition) => self.is_true(&condition),
            None => {
                log::debug!("Condition '{}' not found, treating it as true", id);
                true
            }
        }
    }

    /// Evaluate a condition that need not be registered
    pub fn is_true(&self, condition: &Condition) -> bool {
        match self.evaluate(condition) {
            Ok(result) => result,
            Err(e) => {
                log::error!("Error evaluating condition {}: {}", condition.id(), e);
                false
            }
        }
    }

    /// Evaluate a condition, surfacing structural faults
    pub fn evaluate(&self, condition: &Condition) -> Result<bool, EvaluationError> {
        condition::evaluate(condition, self)
    }

    /// Whether a panel may be shown. Panels without a condition are always shown.
    pub fn can_show_panel(&self, panel_id: &str) -> bool {
        match self.panel_conditions.get(panel_id) {
            Some(condition_id) => self.bound_condition_true("panel", panel_id, condition_id),
            None => {
                log::debug!("Panel {} has no condition", panel_id);
                true
            }
        }
    }

    /// Whether a pack may be installed. Packs without a condition always can.
    pub fn can_install_pack(&self, pack_id: &str) -> bool {
        match self.pack_conditions.get(pack_id) {
            Some(condition_id) => self.bound_condition_true("pack", pack_id, condition_id),
            None => {
                log::debug!("Pack {} has no condition", pack_id);
                true
            }
        }
    }

    /// Whether the pack may be installed optionally when its condition does not hold
    pub fn can_install_pack_optional(&self, pack_id: &str) -> bool {
        self.optional_pack_conditions.contains_key(pack_id)
    }

    fn bound_condition_true(&self, target: &str, target_id: &str, condition_id: &str) -> bool {
        match self.get_condition(condition_id) {
            Some(condition) => self.is_true(&condition),
            None => {
                log::warn!(
                    "Condition '{}' bound to {} {} is not defined",
                    condition_id,
                    target,
                    target_id
                );
                false
            }
        }
    }

    /// Bind a condition (id or expression) to a panel, replacing any earlier binding
    pub fn bind_panel(&mut self, panel_id: impl Into<String>, condition_id: impl Into<String>) {
        self.panel_conditions
            .insert(panel_id.into(), condition_id.into());
    }

    /// Bind a condition (id or expression) to a pack. With `optional` the pack
    /// may also be installed when the condition does not hold.
    pub fn bind_pack(
        &mut self,
        pack_id: impl Into<String>,
        condition_id: impl Into<String>,
        optional: bool,
    ) {
        let pack_id = pack_id.into();
        let condition_id = condition_id.into();
        if optional {
            self.optional_pack_conditions
                .insert(pack_id.clone(), condition_id.clone());
        }
        self.pack_conditions.insert(pack_id, condition_id);
    }

    pub fn panel_condition(&self, panel_id: &str) -> Option<&str> {
        self.panel_conditions.get(panel_id).map(String::as_str)
    }

    pub fn pack_condition(&self, pack_id: &str) -> Option<&str> {
        self.pack_conditions.get(pack_id).map(String::as_str)
    }

    /// All registered ids, sorted
    pub fn known_condition_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.conditions.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn contains(&self, id: &str) -> bool {
        self.conditions.contains_key(id)
    }

    pub fn is_builtin(&self, id: &str) -> bool {
        self.builtin.contains(id)
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    /// Snapshot of the user-defined conditions and all bindings, in a form
    /// the loader reads back
    pub fn export_spec(&self) -> RulesSpec {
        let conditions = self
            .order
            .iter()
            .filter(|id| !self.builtin.contains(*id))
            .filter_map(|id| self.conditions.get(id))
            .map(ConditionSpec::from)
            .collect();

        let panels: BTreeMap<_, _> = self.panel_conditions.iter().collect();
        let panelconditions = panels
            .into_iter()
            .map(|(panel_id, condition_id)| PanelConditionSpec {
                panelid: panel_id.clone(),
                conditionid: condition_id.clone(),
            })
            .collect();

        let packs: BTreeMap<_, _> = self.pack_conditions.iter().collect();
        let packconditions = packs
            .into_iter()
            .map(|(pack_id, condition_id)| PackConditionSpec {
                packid: pack_id.clone(),
                conditionid: condition_id.clone(),
                optional: self.optional_pack_conditions.contains_key(pack_id),
            })
            .collect();

        RulesSpec {
            conditions,
            panelconditions,
            packconditions,
            packs: self.environment.all_packs(),
        }
    }
}

impl Default for ConditionRegistry {
    fn default() -> Self {
        Self::new(Environment::default())
    }
}

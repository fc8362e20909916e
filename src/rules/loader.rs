//! Rules loader - YAML loading and definition-time validation
//!
//! Loading is fail-fast: the first malformed node aborts with a
//! [`ConfigError`] naming the condition. Conditions register in document
//! order, so references may only point at earlier or built-in conditions.

use std::fs;
use std::path::Path;

use super::condition::{
    Condition, ConditionKind, DynamicProbe, EmptyKind, ExistsKind, Operand, Operator, PackMatch,
};
use super::registry::ConditionRegistry;
use super::types::{ConditionSpec, OperandSpec, RulesSpec};
use crate::error::{ConfigError, RulesError};

/// Loads rules specifications and registers them
pub struct RulesLoader;

impl RulesLoader {
    pub fn new() -> Self {
        Self
    }

    /// Load a rules specification from a YAML file
    pub fn load_file<P: AsRef<Path>>(&self, path: P) -> Result<RulesSpec, RulesError> {
        let content = fs::read_to_string(path)?;
        Self::parse_yaml(&content)
    }

    /// Parse a rules specification from a YAML string
    pub fn parse_yaml(content: &str) -> Result<RulesSpec, RulesError> {
        let spec: RulesSpec = serde_yaml::from_str(content)?;
        Ok(spec)
    }

    /// Register the conditions of `spec` and apply its bindings
    pub fn apply(&self, spec: &RulesSpec, registry: &mut ConditionRegistry) -> Result<(), ConfigError> {
        for (index, node) in spec.conditions.iter().enumerate() {
            let id = match node.id.as_deref() {
                Some(id) if !id.is_empty() => id,
                _ => return Err(ConfigError::missing(format!("#{}", index), &node.kind, "id")),
            };
            let condition = Self::build_condition(node, id)?;
            registry.register(condition)?;
        }

        for binding in &spec.panelconditions {
            log::debug!("Panel {} is gated by {}", binding.panelid, binding.conditionid);
            registry.bind_panel(&binding.panelid, &binding.conditionid);
        }
        for binding in &spec.packconditions {
            log::debug!(
                "Pack {} is gated by {} (optional: {})",
                binding.packid,
                binding.conditionid,
                binding.optional
            );
            registry.bind_pack(&binding.packid, &binding.conditionid, binding.optional);
        }

        log::info!(
            "Loaded {} condition(s), {} panel and {} pack binding(s)",
            spec.conditions.len(),
            spec.panelconditions.len(),
            spec.packconditions.len()
        );
        Ok(())
    }

    /// Build a condition from its node. `id` is used when the node has none.
    pub fn build_condition(node: &ConditionSpec, id: &str) -> Result<Condition, ConfigError> {
        let id = node.id.as_deref().filter(|i| !i.is_empty()).unwrap_or(id);
        let kind = node.kind.as_str();

        let condition = match kind.to_ascii_lowercase().as_str() {
            "comparenumerics" => Condition::compare_numeric(
                id,
                required_name(&node.name, id, kind, "name")?,
                required(&node.value, id, kind, "value")?,
                operator(node, id)?,
            ),
            "compareversions" => Condition::compare_version(
                id,
                required(&node.arg1, id, kind, "arg1")?,
                required(&node.arg2, id, kind, "arg2")?,
                operator(node, id)?,
            ),
            "variable" => Condition::variable(
                id,
                required_name(&node.name, id, kind, "name")?,
                required(&node.value, id, kind, "value")?,
            ),
            "exists" => {
                let (element, content) = exactly_one(node, id, &ExistsKind::ELEMENTS)?;
                match ExistsKind::from_element(element) {
                    Some(exists) => Condition::exists(id, exists, content),
                    None => return Err(ConfigError::missing(id, kind, element)),
                }
            }
            "empty" => {
                let (element, content) = exactly_one(node, id, &EmptyKind::ELEMENTS)?;
                match EmptyKind::from_element(element) {
                    Some(empty) => Condition::empty(id, empty, Some(content.to_string())),
                    None => return Err(ConfigError::missing(id, kind, element)),
                }
            }
            "packselection" => {
                let pack = match (&node.packid, &node.packname) {
                    (Some(pack_id), None) => PackMatch::Id(pack_id.clone()),
                    (None, Some(name)) => PackMatch::Name(name.clone()),
                    (found_id, found_name) => {
                        return Err(ConfigError::AmbiguousContent {
                            id: id.to_string(),
                            allowed: "packid, packname".to_string(),
                            found: usize::from(found_id.is_some()) + usize::from(found_name.is_some()),
                        })
                    }
                };
                Condition::new(id, ConditionKind::PackSelection(pack))
            }
            "java" => Condition::probe(id, probe(node, id, kind)?),
            "user" => Condition::user(id, required_name(&node.requireduser, id, kind, "requireduser")?),
            "ref" => Condition::reference(id, required_name(&node.refid, id, kind, "refid")?),
            "and" | "or" | "xor" => {
                if node.conditions.len() != 2 || node.condition.is_some() {
                    return Err(ConfigError::WrongChildCount {
                        id: id.to_string(),
                        kind: kind.to_string(),
                        expected: 2,
                        found: node.conditions.len() + usize::from(node.condition.is_some()),
                    });
                }
                let left = operand(&node.conditions[0], id, 0)?;
                let right = operand(&node.conditions[1], id, 1)?;
                let combine: fn(Operand, Operand) -> ConditionKind = match kind.to_ascii_lowercase().as_str() {
                    "and" => ConditionKind::And,
                    "or" => ConditionKind::Or,
                    _ => ConditionKind::Xor,
                };
                Condition::new(id, combine(left, right))
            }
            "not" => {
                let child = match (node.condition.as_deref(), node.conditions.as_slice()) {
                    (Some(child), []) => child,
                    (None, [child]) => child,
                    _ => {
                        return Err(ConfigError::WrongChildCount {
                            id: id.to_string(),
                            kind: kind.to_string(),
                            expected: 1,
                            found: node.conditions.len() + usize::from(node.condition.is_some()),
                        })
                    }
                };
                Condition::not(id, operand(child, id, 0)?)
            }
            _ => {
                return Err(ConfigError::UnknownType {
                    id: id.to_string(),
                    kind: kind.to_string(),
                })
            }
        };

        Ok(condition)
    }
}

impl Default for RulesLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn required<'a>(
    value: &'a Option<String>,
    id: &str,
    kind: &str,
    element: &str,
) -> Result<&'a str, ConfigError> {
    value
        .as_deref()
        .ok_or_else(|| ConfigError::missing(id, kind, element))
}

/// Like [`required`], but an empty value counts as missing
fn required_name<'a>(
    value: &'a Option<String>,
    id: &str,
    kind: &str,
    element: &str,
) -> Result<&'a str, ConfigError> {
    match value.as_deref() {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ConfigError::missing(id, kind, element)),
    }
}

fn operator(node: &ConditionSpec, id: &str) -> Result<Operator, ConfigError> {
    match node.operator.as_deref() {
        None => Ok(Operator::Equal),
        Some(attribute) => {
            Operator::from_attribute(attribute).ok_or_else(|| ConfigError::UnknownOperator {
                id: id.to_string(),
                operator: attribute.to_string(),
            })
        }
    }
}

fn exactly_one<'a>(
    node: &'a ConditionSpec,
    id: &str,
    elements: &[&'static str],
) -> Result<(&'static str, &'a str), ConfigError> {
    let present: Vec<(&'static str, &'a str)> = elements
        .iter()
        .filter_map(|element| node.element(element).map(|content| (*element, content.as_str())))
        .collect();

    // content elements that do not belong to this type are rejected too
    let stray = ["variable", "string", "file", "dir"]
        .iter()
        .filter(|element| !elements.contains(*element))
        .filter(|element| node.element(element).is_some())
        .count();

    match present.as_slice() {
        [single] if stray == 0 => Ok(*single),
        _ => Err(ConfigError::AmbiguousContent {
            id: id.to_string(),
            allowed: elements.join(", "),
            found: present.len() + stray,
        }),
    }
}

fn probe(node: &ConditionSpec, id: &str, kind: &str) -> Result<DynamicProbe, ConfigError> {
    let java = node
        .java
        .as_ref()
        .ok_or_else(|| ConfigError::missing(id, kind, "java"))?;
    if java.class.is_empty() {
        return Err(ConfigError::missing(id, kind, "java.class"));
    }

    let returnvalue = node
        .returnvalue
        .as_ref()
        .ok_or_else(|| ConfigError::missing(id, kind, "returnvalue"))?;
    let expected = required(&returnvalue.value, id, kind, "returnvalue.value")?;
    let value_type = returnvalue.value_type.as_deref().unwrap_or("boolean");

    match (&java.field, &java.method) {
        (Some(field), None) => Ok(DynamicProbe::field(&java.class, field, expected, value_type)),
        (None, Some(method)) => Ok(DynamicProbe::method(&java.class, method, expected, value_type)),
        (field, method) => Err(ConfigError::AmbiguousContent {
            id: id.to_string(),
            allowed: "java.field, java.method".to_string(),
            found: usize::from(field.is_some()) + usize::from(method.is_some()),
        }),
    }
}

/// Inline operands without an id are named after their parent and position
fn operand(spec: &OperandSpec, parent: &str, index: usize) -> Result<Operand, ConfigError> {
    match spec {
        OperandSpec::Id(id) if id.is_empty() => Err(ConfigError::missing(parent, "operand", "id")),
        OperandSpec::Id(id) => Ok(Operand::Id(id.clone())),
        OperandSpec::Inline(node) => {
            let fallback = format!("{}.{}", parent, index);
            Ok(RulesLoader::build_condition(node, &fallback)?.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::environment::{Environment, InstallData};
    use std::io::Write;
    use std::sync::Arc;

    fn build(yaml: &str) -> Result<Condition, ConfigError> {
        let node: ConditionSpec = serde_yaml::from_str(yaml).unwrap();
        RulesLoader::build_condition(&node, "top")
    }

    #[test]
    fn test_parse_rules_spec() {
        let yaml = r#"
conditions:
  - id: c1
    type: comparenumerics
    name: count
    value: 5
    operator: GEQ
  - id: r1
    type: ref
    refid: c1
panelconditions:
  - panelid: Finish
    conditionid: r1
packconditions:
  - packid: docs
    conditionid: c1
    optional: true
packs:
  - id: docs
    name: Documentation
"#;
        let spec = RulesLoader::parse_yaml(yaml).unwrap();
        assert_eq!(spec.conditions.len(), 2);
        assert_eq!(spec.panelconditions[0].panelid, "Finish");
        assert!(spec.packconditions[0].optional);
        assert_eq!(spec.packs[0].name, "Documentation");

        let c1 = RulesLoader::build_condition(&spec.conditions[0], "unused").unwrap();
        assert_eq!(
            c1,
            Condition::compare_numeric("c1", "count", "5", Operator::GreaterEqual)
        );
    }

    #[test]
    fn test_version_operands_keep_their_text() {
        let unquoted = "conditions:\n  - id: new.enough\n    type: compareversions\n    arg1: ${v}\n    arg2: 1.10\n    operator: geq";
        let err = RulesLoader::parse_yaml(unquoted).unwrap_err();
        assert!(matches!(err, RulesError::Yaml(_)));
        assert!(err.to_string().contains("quote it"), "{}", err);

        let quoted = unquoted.replace("arg2: 1.10", "arg2: '1.10'");
        let spec = RulesLoader::parse_yaml(&quoted).unwrap();
        assert_eq!(spec.conditions[0].arg2.as_deref(), Some("1.10"));

        let data = Arc::new(InstallData::new());
        let mut registry = ConditionRegistry::new(Environment::new(data.clone()));
        RulesLoader::new().apply(&spec, &mut registry).unwrap();

        data.set_variable("v", "1.9");
        assert!(!registry.is_condition_true("new.enough"));
        data.set_variable("v", "1.10");
        assert!(registry.is_condition_true("new.enough"));
        data.set_variable("v", "1.10.1");
        assert!(registry.is_condition_true("new.enough"));
    }

    #[test]
    fn test_load_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "conditions:\n  - id: t\n    type: variable\n    name: T\n    value: yes").unwrap();

        let spec = RulesLoader::new().load_file(file.path()).unwrap();
        assert_eq!(spec.conditions[0].value.as_deref(), Some("yes"));
    }

    #[test]
    fn test_load_missing_file() {
        let err = RulesLoader::new().load_file("/nonexistent/rules.yaml").unwrap_err();
        assert!(matches!(err, RulesError::Io(_)));
    }

    #[test]
    fn test_missing_elements() {
        let err = build("type: comparenumerics\nname: count").unwrap_err();
        assert_eq!(err, ConfigError::missing("top", "comparenumerics", "value"));

        let err = build("type: ref").unwrap_err();
        assert_eq!(err, ConfigError::missing("top", "ref", "refid"));

        let err = build("type: user\nrequireduser: ''").unwrap_err();
        assert_eq!(err, ConfigError::missing("top", "user", "requireduser"));

        let err = build("type: java\njava:\n  class: OsVersion\n  field: IS_LINUX").unwrap_err();
        assert_eq!(err, ConfigError::missing("top", "java", "returnvalue"));
    }

    #[test]
    fn test_content_elements() {
        let c = build("type: exists\nfile: /etc/hosts").unwrap();
        assert_eq!(c, Condition::exists("top", ExistsKind::File, "/etc/hosts"));

        let c = build("type: empty\nstring: ''").unwrap();
        assert_eq!(c, Condition::empty("top", EmptyKind::String, Some(String::new())));

        assert!(matches!(
            build("type: exists\nfile: a\nvariable: b"),
            Err(ConfigError::AmbiguousContent { found: 2, .. })
        ));
        assert!(matches!(
            build("type: exists\ndir: /tmp"),
            Err(ConfigError::AmbiguousContent { found: 1, .. })
        ));
        assert!(matches!(
            build("type: empty"),
            Err(ConfigError::AmbiguousContent { found: 0, .. })
        ));
    }

    #[test]
    fn test_combinator_child_counts() {
        let err = build("type: and\nconditions: [a]").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::WrongChildCount { expected: 2, found: 1, .. }
        ));

        let err = build("type: xor\nconditions: [a, b, c]").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::WrongChildCount { expected: 2, found: 3, .. }
        ));

        let err = build("type: not").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::WrongChildCount { expected: 1, found: 0, .. }
        ));

        let c = build("type: not\nconditions: [a]").unwrap();
        assert_eq!(c, Condition::not("top", "a"));
    }

    #[test]
    fn test_inline_operand_ids() {
        let c = build(
            r#"
type: or
conditions:
  - a
  - type: not
    condition:
      type: user
      requireduser: root
"#,
        )
        .unwrap();
        let expected = Condition::or(
            "top",
            "a",
            Condition::not("top.1", Condition::user("top.1.0", "root")),
        );
        assert_eq!(c, expected);
    }

    #[test]
    fn test_unknown_type_and_operator() {
        assert_eq!(
            build("type: sometimes").unwrap_err(),
            ConfigError::UnknownType {
                id: "top".to_string(),
                kind: "sometimes".to_string()
            }
        );
        assert_eq!(
            build("type: compareversions\narg1: '1'\narg2: '2'\noperator: about").unwrap_err(),
            ConfigError::UnknownOperator {
                id: "top".to_string(),
                operator: "about".to_string()
            }
        );
    }

    #[test]
    fn test_java_field_or_method() {
        let c = build(
            "type: java\njava:\n  class: OsVersion\n  method: isLinux\nreturnvalue:\n  value: true",
        )
        .unwrap();
        assert_eq!(
            c,
            Condition::probe("top", DynamicProbe::method("OsVersion", "isLinux", "true", "boolean"))
        );

        let err = build(
            "type: java\njava:\n  class: OsVersion\n  field: A\n  method: b\nreturnvalue:\n  value: true",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::AmbiguousContent { found: 2, .. }));
    }

    #[test]
    fn test_apply_is_fail_fast() {
        let yaml = r#"
conditions:
  - id: first
    type: variable
    name: A
    value: "1"
  - id: broken
    type: ref
    refid: later
  - id: later
    type: variable
    name: B
    value: "1"
"#;
        let spec = RulesLoader::parse_yaml(yaml).unwrap();
        let mut registry = ConditionRegistry::new(Environment::new(Arc::new(InstallData::new())));
        let err = RulesLoader::new().apply(&spec, &mut registry).unwrap_err();

        assert_eq!(err, ConfigError::unresolved("broken", "later"));
        assert!(registry.contains("first"));
        assert!(!registry.contains("broken"));
        assert!(!registry.contains("later"));
    }

    #[test]
    fn test_apply_requires_top_level_id() {
        let spec = RulesLoader::parse_yaml("conditions:\n  - type: variable\n    name: A\n    value: x")
            .unwrap();
        let mut registry = ConditionRegistry::default();
        let err = RulesLoader::new().apply(&spec, &mut registry).unwrap_err();
        assert_eq!(err, ConfigError::missing("#0", "variable", "id"));
    }
}

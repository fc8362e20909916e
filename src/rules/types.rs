// SPDX-License-Identifier: MIT

//! YAML schema types for rules specifications
//!
//! A specification lists conditions, panel and pack bindings and the packs
//! the installer knows about:
//!
//! ```yaml
//! conditions:
//!   - id: enough.cpus
//!     type: comparenumerics
//!     name: cpu.count
//!     value: 4
//!     operator: geq
//!   - id: docs.wanted
//!     type: and
//!     conditions:
//!       - enough.cpus
//!       - type: packselection
//!         packid: docs
//! panelconditions:
//!   - panelid: TuningPanel
//!     conditionid: enough.cpus
//! packconditions:
//!   - packid: docs
//!     conditionid: docs.wanted
//!     optional: true
//! ```

use serde::{Deserialize, Deserializer, Serialize};
use serde_yaml::Value;

use crate::rules::condition::{Condition, ConditionKind, DynamicProbe, Operand, PackMatch};
use crate::rules::environment::Pack;

/// Top-level rules specification
#[derive(Debug, Default, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RulesSpec {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<ConditionSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub panelconditions: Vec<PanelConditionSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub packconditions: Vec<PackConditionSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub packs: Vec<Pack>,
}

/// A single condition node. Which fields apply depends on `type`.
#[derive(Debug, Default, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ConditionSpec {
    /// Required at the top level; inline operands may omit it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,

    // comparenumerics / variable
    #[serde(default, deserialize_with = "scalar", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "scalar", skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,

    // compareversions
    #[serde(default, deserialize_with = "scalar", skip_serializing_if = "Option::is_none")]
    pub arg1: Option<String>,
    #[serde(default, deserialize_with = "scalar", skip_serializing_if = "Option::is_none")]
    pub arg2: Option<String>,

    // exists / empty
    #[serde(default, deserialize_with = "scalar", skip_serializing_if = "Option::is_none")]
    pub variable: Option<String>,
    #[serde(default, deserialize_with = "scalar", skip_serializing_if = "Option::is_none")]
    pub string: Option<String>,
    #[serde(default, deserialize_with = "scalar", skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, deserialize_with = "scalar", skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,

    // packselection
    #[serde(default, deserialize_with = "scalar", skip_serializing_if = "Option::is_none")]
    pub packid: Option<String>,
    #[serde(default, deserialize_with = "scalar", skip_serializing_if = "Option::is_none")]
    pub packname: Option<String>,

    // java
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub java: Option<JavaSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub returnvalue: Option<ReturnValueSpec>,

    // user
    #[serde(default, deserialize_with = "scalar", skip_serializing_if = "Option::is_none")]
    pub requireduser: Option<String>,

    // ref
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refid: Option<String>,

    // and / or / xor
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<OperandSpec>,
    // not
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<Box<OperandSpec>>,
}

/// Type and member a `java` condition probes
#[derive(Debug, Default, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct JavaSpec {
    pub class: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
}

/// Expected value of a probed member
#[derive(Debug, Default, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ReturnValueSpec {
    #[serde(default, deserialize_with = "scalar", skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub value_type: Option<String>,
}

/// A combinator operand: a condition id or an inline condition
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum OperandSpec {
    Id(String),
    Inline(Box<ConditionSpec>),
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PanelConditionSpec {
    pub panelid: String,
    pub conditionid: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PackConditionSpec {
    pub packid: String,
    pub conditionid: String,
    /// Allow installing the pack even when the condition does not hold
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub optional: bool,
}

/// Accept strings, integers and booleans for text fields, so `value: 5`
/// reads the same as `value: "5"`.
///
/// Unquoted floats are rejected: YAML reads `1.10` as the number 1.1, which
/// would silently change a version such as `1.10` into `1.1`.
fn scalar<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Bool(b)) => Ok(Some(b.to_string())),
        Some(Value::Number(n)) if n.is_i64() || n.is_u64() => Ok(Some(n.to_string())),
        Some(Value::Number(n)) => Err(serde::de::Error::custom(format!(
            "unquoted number {} loses its written form, quote it (e.g. '1.10')",
            n
        ))),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected a string, integer or boolean, found {:?}",
            other
        ))),
    }
}

impl ConditionSpec {
    fn new(id: &str, kind: &str) -> Self {
        Self {
            id: Some(id.to_string()),
            kind: kind.to_string(),
            ..Self::default()
        }
    }

    /// Mutable slot for a content element such as `file` or `dir`
    pub fn element_mut(&mut self, element: &str) -> Option<&mut Option<String>> {
        match element {
            "variable" => Some(&mut self.variable),
            "string" => Some(&mut self.string),
            "file" => Some(&mut self.file),
            "dir" => Some(&mut self.dir),
            _ => None,
        }
    }

    /// The content element with this name
    pub fn element(&self, element: &str) -> Option<&String> {
        match element {
            "variable" => self.variable.as_ref(),
            "string" => self.string.as_ref(),
            "file" => self.file.as_ref(),
            "dir" => self.dir.as_ref(),
            _ => None,
        }
    }
}

impl From<&Operand> for OperandSpec {
    fn from(operand: &Operand) -> Self {
        match operand {
            Operand::Id(id) => OperandSpec::Id(id.clone()),
            Operand::Inline(condition) => {
                OperandSpec::Inline(Box::new(ConditionSpec::from(condition.as_ref())))
            }
        }
    }
}

impl From<&Condition> for ConditionSpec {
    fn from(condition: &Condition) -> Self {
        let mut spec = ConditionSpec::new(condition.id(), condition.type_tag());
        match condition.kind() {
            ConditionKind::CompareNumeric {
                variable,
                value,
                operator,
            } => {
                spec.name = Some(variable.clone());
                spec.value = Some(value.clone());
                spec.operator = Some(operator.attribute().to_string());
            }
            ConditionKind::CompareVersion {
                left,
                right,
                operator,
            } => {
                spec.arg1 = Some(left.clone());
                spec.arg2 = Some(right.clone());
                spec.operator = Some(operator.attribute().to_string());
            }
            ConditionKind::Variable { name, value } => {
                spec.name = Some(name.clone());
                spec.value = Some(value.clone());
            }
            ConditionKind::Exists { kind, content } => {
                if let Some(slot) = spec.element_mut(kind.element()) {
                    *slot = Some(content.clone());
                }
            }
            ConditionKind::Empty { kind, content } => {
                // an empty string without content is written with an empty value
                if let Some(slot) = spec.element_mut(kind.element()) {
                    *slot = Some(content.clone().unwrap_or_default());
                }
            }
            ConditionKind::PackSelection(PackMatch::Id(id)) => spec.packid = Some(id.clone()),
            ConditionKind::PackSelection(PackMatch::Name(name)) => {
                spec.packname = Some(name.clone())
            }
            ConditionKind::DynamicProbe(DynamicProbe {
                type_name,
                field,
                method,
                expected,
                value_type,
                ..
            }) => {
                spec.java = Some(JavaSpec {
                    class: type_name.clone(),
                    field: field.clone(),
                    method: method.clone(),
                });
                spec.returnvalue = Some(ReturnValueSpec {
                    value: Some(expected.clone()),
                    value_type: Some(value_type.clone()),
                });
            }
            ConditionKind::UserIdentity { required } => spec.requireduser = Some(required.clone()),
            ConditionKind::Ref { target } => spec.refid = Some(target.clone()),
            ConditionKind::And(l, r) | ConditionKind::Or(l, r) | ConditionKind::Xor(l, r) => {
                spec.conditions = vec![l.into(), r.into()];
            }
            ConditionKind::Not(operand) => spec.condition = Some(Box::new(operand.into())),
        }
        spec
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::condition::{EmptyKind, Operator};

    #[test]
    fn test_scalar_fields_accept_numbers_and_bools() {
        let yaml = r#"
id: c1
type: comparenumerics
name: count
value: 5
"#;
        let spec: ConditionSpec = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(spec.value.as_deref(), Some("5"));

        let yaml = r#"
id: v
type: variable
name: flag
value: true
"#;
        let spec: ConditionSpec = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(spec.value.as_deref(), Some("true"));
    }

    #[test]
    fn test_unquoted_floats_rejected() {
        let yaml = r#"
id: v
type: compareversions
arg1: "1.9"
arg2: 1.10
"#;
        let err = serde_yaml::from_str::<ConditionSpec>(yaml).unwrap_err();
        assert!(err.to_string().contains("quote it"), "{}", err);

        let quoted = r#"
id: v
type: compareversions
arg1: "1.9"
arg2: '1.10'
"#;
        let spec: ConditionSpec = serde_yaml::from_str(quoted).unwrap();
        assert_eq!(spec.arg2.as_deref(), Some("1.10"));
    }

    #[test]
    fn test_non_scalar_text_field_rejected() {
        let yaml = r#"
id: v
type: variable
name: [a, b]
value: x
"#;
        assert!(serde_yaml::from_str::<ConditionSpec>(yaml).is_err());
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let yaml = r#"
id: c1
type: variable
nmae: typo
"#;
        assert!(serde_yaml::from_str::<ConditionSpec>(yaml).is_err());
    }

    #[test]
    fn test_operands_id_or_inline() {
        let yaml = r#"
id: both
type: and
conditions:
  - first
  - type: user
    requireduser: root
"#;
        let spec: ConditionSpec = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(spec.conditions.len(), 2);
        assert_eq!(spec.conditions[0], OperandSpec::Id("first".to_string()));
        match &spec.conditions[1] {
            OperandSpec::Inline(inner) => {
                assert_eq!(inner.kind, "user");
                assert!(inner.id.is_none());
                assert_eq!(inner.requireduser.as_deref(), Some("root"));
            }
            other => panic!("expected inline operand, got {:?}", other),
        }
    }

    #[test]
    fn test_java_node() {
        let yaml = r#"
id: linux
type: java
java:
  class: OsVersion
  field: IS_LINUX
returnvalue:
  value: true
  type: boolean
"#;
        let spec: ConditionSpec = serde_yaml::from_str(yaml).unwrap();
        let java = spec.java.unwrap();
        assert_eq!(java.class, "OsVersion");
        assert_eq!(java.field.as_deref(), Some("IS_LINUX"));
        let rv = spec.returnvalue.unwrap();
        assert_eq!(rv.value.as_deref(), Some("true"));
        assert_eq!(rv.value_type.as_deref(), Some("boolean"));
    }

    #[test]
    fn test_from_condition() {
        let c = Condition::compare_numeric("c1", "count", "5", Operator::GreaterEqual);
        let spec = ConditionSpec::from(&c);
        assert_eq!(spec.kind, "comparenumerics");
        assert_eq!(spec.name.as_deref(), Some("count"));
        assert_eq!(spec.operator.as_deref(), Some("geq"));

        let e = Condition::empty("e", EmptyKind::Dir, Some("/tmp/x".to_string()));
        let spec = ConditionSpec::from(&e);
        assert_eq!(spec.dir.as_deref(), Some("/tmp/x"));
        assert!(spec.file.is_none());

        let n = Condition::not("n", Condition::variable("n.0", "V", "1"));
        let spec = ConditionSpec::from(&n);
        match spec.condition.as_deref() {
            Some(OperandSpec::Inline(inner)) => assert_eq!(inner.kind, "variable"),
            other => panic!("unexpected operand {:?}", other),
        }
    }

    #[test]
    fn test_spec_defaults_to_empty_lists() {
        let spec: RulesSpec = serde_yaml::from_str("conditions: []").unwrap();
        assert!(spec.packs.is_empty());
        assert!(spec.panelconditions.is_empty());
    }
}

// SPDX-License-Identifier: MIT

//! Condition model
//!
//! A [`Condition`] is an id plus a [`ConditionKind`]. The set of kinds is
//! closed; evaluation is a single match in [`super::evaluator`].
//!
//! Combinators never own registered conditions. They hold an [`Operand`],
//! which is either the id of a registered condition or an anonymous
//! sub-condition (inline definitions and parsed expressions).

use once_cell::unsync::OnceCell;
use std::cmp::Ordering;
use std::fmt;

use crate::rules::probe::FieldHandle;

/// Comparison operators for numeric and version comparisons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Operator {
    #[default]
    Equal,
    NotEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,
}

impl Operator {
    /// Parse the rules file attribute (`eq`, `noteq`, `gt`, `geq`, `lt`, `leq`)
    pub fn from_attribute(attribute: &str) -> Option<Self> {
        match attribute.trim().to_ascii_lowercase().as_str() {
            "eq" => Some(Operator::Equal),
            "noteq" => Some(Operator::NotEqual),
            "gt" => Some(Operator::Greater),
            "geq" => Some(Operator::GreaterEqual),
            "lt" => Some(Operator::Less),
            "leq" => Some(Operator::LessEqual),
            _ => None,
        }
    }

    pub fn attribute(&self) -> &'static str {
        match self {
            Operator::Equal => "eq",
            Operator::NotEqual => "noteq",
            Operator::Greater => "gt",
            Operator::GreaterEqual => "geq",
            Operator::Less => "lt",
            Operator::LessEqual => "leq",
        }
    }

    /// Apply the operator to the ordering of the left operand relative to the right
    pub fn matches(&self, ordering: Ordering) -> bool {
        match self {
            Operator::Equal => ordering == Ordering::Equal,
            Operator::NotEqual => ordering != Ordering::Equal,
            Operator::Greater => ordering == Ordering::Greater,
            Operator::GreaterEqual => ordering != Ordering::Less,
            Operator::Less => ordering == Ordering::Less,
            Operator::LessEqual => ordering != Ordering::Greater,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operator::Equal => write!(f, "=="),
            Operator::NotEqual => write!(f, "!="),
            Operator::Greater => write!(f, ">"),
            Operator::GreaterEqual => write!(f, ">="),
            Operator::Less => write!(f, "<"),
            Operator::LessEqual => write!(f, "<="),
        }
    }
}

/// What an `exists` condition looks at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExistsKind {
    Variable,
    File,
}

impl ExistsKind {
    pub const ELEMENTS: [&'static str; 2] = ["variable", "file"];

    pub fn from_element(element: &str) -> Option<Self> {
        match element {
            "variable" => Some(ExistsKind::Variable),
            "file" => Some(ExistsKind::File),
            _ => None,
        }
    }

    pub fn element(&self) -> &'static str {
        match self {
            ExistsKind::Variable => "variable",
            ExistsKind::File => "file",
        }
    }
}

/// What an `empty` condition looks at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmptyKind {
    String,
    Variable,
    File,
    Dir,
}

impl EmptyKind {
    pub const ELEMENTS: [&'static str; 4] = ["variable", "string", "file", "dir"];

    pub fn from_element(element: &str) -> Option<Self> {
        match element {
            "string" => Some(EmptyKind::String),
            "variable" => Some(EmptyKind::Variable),
            "file" => Some(EmptyKind::File),
            "dir" => Some(EmptyKind::Dir),
            _ => None,
        }
    }

    pub fn element(&self) -> &'static str {
        match self {
            EmptyKind::String => "string",
            EmptyKind::Variable => "variable",
            EmptyKind::File => "file",
            EmptyKind::Dir => "dir",
        }
    }
}

/// How a pack-selection condition identifies its pack
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackMatch {
    Id(String),
    Name(String),
}

/// Probe of a named field on a host-provided type.
///
/// The field handle is resolved through a
/// [`SymbolResolver`](crate::rules::probe::SymbolResolver) on first use and
/// cached once resolution succeeds.
#[derive(Debug, Clone)]
pub struct DynamicProbe {
    pub type_name: String,
    pub field: Option<String>,
    pub method: Option<String>,
    pub expected: String,
    pub value_type: String,
    pub(crate) resolved: OnceCell<FieldHandle>,
}

impl DynamicProbe {
    /// Probe a field, e.g. `OsVersion.IS_LINUX == true`
    pub fn field(
        type_name: impl Into<String>,
        field: impl Into<String>,
        expected: impl Into<String>,
        value_type: impl Into<String>,
    ) -> Self {
        Self {
            type_name: type_name.into(),
            field: Some(field.into()),
            method: None,
            expected: expected.into(),
            value_type: value_type.into(),
            resolved: OnceCell::new(),
        }
    }

    /// Probe a method. Method probes are accepted but never evaluate to true.
    pub fn method(
        type_name: impl Into<String>,
        method: impl Into<String>,
        expected: impl Into<String>,
        value_type: impl Into<String>,
    ) -> Self {
        Self {
            type_name: type_name.into(),
            field: None,
            method: Some(method.into()),
            expected: expected.into(),
            value_type: value_type.into(),
            resolved: OnceCell::new(),
        }
    }

    /// Whether the field handle has been resolved and cached
    pub fn is_resolved(&self) -> bool {
        self.resolved.get().is_some()
    }
}

impl PartialEq for DynamicProbe {
    fn eq(&self, other: &Self) -> bool {
        self.type_name == other.type_name
            && self.field == other.field
            && self.method == other.method
            && self.expected == other.expected
            && self.value_type == other.value_type
    }
}

/// A combinator child
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// Link to a registered condition, resolved through the registry on evaluation
    Id(String),
    /// Anonymous sub-condition owned by the combinator
    Inline(Box<Condition>),
}

impl Operand {
    /// The id this operand is known by
    pub fn label(&self) -> &str {
        match self {
            Operand::Id(id) => id,
            Operand::Inline(condition) => condition.id(),
        }
    }
}

impl From<&str> for Operand {
    fn from(id: &str) -> Self {
        Operand::Id(id.to_string())
    }
}

impl From<String> for Operand {
    fn from(id: String) -> Self {
        Operand::Id(id)
    }
}

impl From<Condition> for Operand {
    fn from(condition: Condition) -> Self {
        Operand::Inline(Box::new(condition))
    }
}

/// The kind-specific payload of a condition
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionKind {
    /// Integer comparison of a variable's value against a value
    CompareNumeric {
        variable: String,
        value: String,
        operator: Operator,
    },
    /// Version comparison of two substituted operands
    CompareVersion {
        left: String,
        right: String,
        operator: Operator,
    },
    /// Exact match of a variable's value
    Variable { name: String, value: String },
    Exists { kind: ExistsKind, content: String },
    Empty {
        kind: EmptyKind,
        content: Option<String>,
    },
    PackSelection(PackMatch),
    DynamicProbe(DynamicProbe),
    UserIdentity { required: String },
    Ref { target: String },
    And(Operand, Operand),
    Or(Operand, Operand),
    Xor(Operand, Operand),
    Not(Operand),
}

/// A named boolean predicate evaluated against installer state
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    id: String,
    kind: ConditionKind,
}

impl Condition {
    pub fn new(id: impl Into<String>, kind: ConditionKind) -> Self {
        Self {
            id: id.into(),
            kind,
        }
    }

    pub fn compare_numeric(
        id: impl Into<String>,
        variable: impl Into<String>,
        value: impl Into<String>,
        operator: Operator,
    ) -> Self {
        Self::new(
            id,
            ConditionKind::CompareNumeric {
                variable: variable.into(),
                value: value.into(),
                operator,
            },
        )
    }

    pub fn compare_version(
        id: impl Into<String>,
        left: impl Into<String>,
        right: impl Into<String>,
        operator: Operator,
    ) -> Self {
        Self::new(
            id,
            ConditionKind::CompareVersion {
                left: left.into(),
                right: right.into(),
                operator,
            },
        )
    }

    pub fn variable(
        id: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self::new(
            id,
            ConditionKind::Variable {
                name: name.into(),
                value: value.into(),
            },
        )
    }

    pub fn exists(id: impl Into<String>, kind: ExistsKind, content: impl Into<String>) -> Self {
        Self::new(
            id,
            ConditionKind::Exists {
                kind,
                content: content.into(),
            },
        )
    }

    pub fn empty(id: impl Into<String>, kind: EmptyKind, content: Option<String>) -> Self {
        Self::new(id, ConditionKind::Empty { kind, content })
    }

    pub fn pack_selected(id: impl Into<String>, pack_id: impl Into<String>) -> Self {
        Self::new(id, ConditionKind::PackSelection(PackMatch::Id(pack_id.into())))
    }

    pub fn pack_named(id: impl Into<String>, pack_name: impl Into<String>) -> Self {
        Self::new(
            id,
            ConditionKind::PackSelection(PackMatch::Name(pack_name.into())),
        )
    }

    pub fn probe(id: impl Into<String>, probe: DynamicProbe) -> Self {
        Self::new(id, ConditionKind::DynamicProbe(probe))
    }

    pub fn user(id: impl Into<String>, required: impl Into<String>) -> Self {
        Self::new(
            id,
            ConditionKind::UserIdentity {
                required: required.into(),
            },
        )
    }

    pub fn reference(id: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(
            id,
            ConditionKind::Ref {
                target: target.into(),
            },
        )
    }

    pub fn and(id: impl Into<String>, left: impl Into<Operand>, right: impl Into<Operand>) -> Self {
        Self::new(id, ConditionKind::And(left.into(), right.into()))
    }

    pub fn or(id: impl Into<String>, left: impl Into<Operand>, right: impl Into<Operand>) -> Self {
        Self::new(id, ConditionKind::Or(left.into(), right.into()))
    }

    pub fn xor(id: impl Into<String>, left: impl Into<Operand>, right: impl Into<Operand>) -> Self {
        Self::new(id, ConditionKind::Xor(left.into(), right.into()))
    }

    pub fn not(id: impl Into<String>, operand: impl Into<Operand>) -> Self {
        Self::new(id, ConditionKind::Not(operand.into()))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> &ConditionKind {
        &self.kind
    }

    /// The `type` tag used for this kind in rules files
    pub fn type_tag(&self) -> &'static str {
        match &self.kind {
            ConditionKind::CompareNumeric { .. } => "comparenumerics",
            ConditionKind::CompareVersion { .. } => "compareversions",
            ConditionKind::Variable { .. } => "variable",
            ConditionKind::Exists { .. } => "exists",
            ConditionKind::Empty { .. } => "empty",
            ConditionKind::PackSelection(_) => "packselection",
            ConditionKind::DynamicProbe(_) => "java",
            ConditionKind::UserIdentity { .. } => "user",
            ConditionKind::Ref { .. } => "ref",
            ConditionKind::And(..) => "and",
            ConditionKind::Or(..) => "or",
            ConditionKind::Xor(..) => "xor",
            ConditionKind::Not(_) => "not",
        }
    }

    /// Operands of a combinator, empty for every other kind
    pub fn operands(&self) -> Vec<&Operand> {
        match &self.kind {
            ConditionKind::And(l, r) | ConditionKind::Or(l, r) | ConditionKind::Xor(l, r) => {
                vec![l, r]
            }
            ConditionKind::Not(operand) => vec![operand],
            _ => vec![],
        }
    }

    /// One-line explanation of what this condition depends on
    pub fn describe(&self) -> String {
        let id = &self.id;
        match &self.kind {
            ConditionKind::CompareNumeric {
                variable,
                value,
                operator,
            } => format!(
                "{id} depends on the value of variable {variable}, which has to be {operator} {value}"
            ),
            ConditionKind::CompareVersion {
                left,
                right,
                operator,
            } => format!("{id} depends on version {left} being {operator} {right}"),
            ConditionKind::Variable { name, value } => {
                format!("{id} depends on variable {name} having the value {value}")
            }
            ConditionKind::Exists { kind, content } => {
                format!("{id} depends on {} {content} existing", kind.element())
            }
            ConditionKind::Empty { kind, content } => format!(
                "{id} depends on {} {} being empty",
                kind.element(),
                content.as_deref().unwrap_or("<none>")
            ),
            ConditionKind::PackSelection(PackMatch::Id(pack)) => {
                format!("{id} depends on pack {pack} being selected")
            }
            ConditionKind::PackSelection(PackMatch::Name(pack)) => {
                format!("{id} depends on a pack named {pack} being selected")
            }
            ConditionKind::DynamicProbe(probe) => match (&probe.field, &probe.method) {
                (Some(field), _) => format!(
                    "{id} depends on field {field} of {} being {}",
                    probe.type_name, probe.expected
                ),
                (None, Some(method)) => format!(
                    "{id} depends on the return value of {method} on {} being {}",
                    probe.type_name, probe.expected
                ),
                (None, None) => format!("{id} depends on {}", probe.type_name),
            },
            ConditionKind::UserIdentity { required } => {
                format!("{id} depends on the installer running as {required}")
            }
            ConditionKind::Ref { target } => format!("{id} refers to {target}"),
            ConditionKind::And(l, r) => {
                format!("{id} requires both {} and {}", l.label(), r.label())
            }
            ConditionKind::Or(l, r) => {
                format!("{id} requires {} or {}", l.label(), r.label())
            }
            ConditionKind::Xor(l, r) => format!(
                "{id} requires exactly one of {} and {}",
                l.label(),
                r.label()
            ),
            ConditionKind::Not(operand) => format!("{id} requires {} to be false", operand.label()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_attributes() {
        for op in [
            Operator::Equal,
            Operator::NotEqual,
            Operator::Greater,
            Operator::GreaterEqual,
            Operator::Less,
            Operator::LessEqual,
        ] {
            assert_eq!(Operator::from_attribute(op.attribute()), Some(op));
        }
        assert_eq!(Operator::from_attribute("GEQ"), Some(Operator::GreaterEqual));
        assert_eq!(Operator::from_attribute("=="), None);
        assert_eq!(Operator::default(), Operator::Equal);
    }

    #[test]
    fn test_operator_matches() {
        assert!(Operator::Equal.matches(Ordering::Equal));
        assert!(!Operator::Equal.matches(Ordering::Less));
        assert!(Operator::NotEqual.matches(Ordering::Greater));
        assert!(Operator::GreaterEqual.matches(Ordering::Equal));
        assert!(!Operator::GreaterEqual.matches(Ordering::Less));
        assert!(Operator::LessEqual.matches(Ordering::Less));
        assert!(!Operator::Less.matches(Ordering::Equal));
    }

    #[test]
    fn test_operator_display() {
        assert_eq!(format!("{}", Operator::Equal), "==");
        assert_eq!(format!("{}", Operator::LessEqual), "<=");
    }

    #[test]
    fn test_probe_equality_ignores_cache() {
        let a = DynamicProbe::field("OsVersion", "IS_LINUX", "true", "boolean");
        let b = DynamicProbe::field("OsVersion", "IS_LINUX", "true", "boolean");
        let _ = a
            .resolved
            .set(FieldHandle::constant(crate::rules::probe::ProbeValue::Bool(true)));
        assert!(a.is_resolved());
        assert!(!b.is_resolved());
        assert_eq!(a, b);
    }

    #[test]
    fn test_operands() {
        let and = Condition::and("both", "a", "b");
        let labels: Vec<&str> = and.operands().iter().map(|o| o.label()).collect();
        assert_eq!(labels, vec!["a", "b"]);

        let not = Condition::not("neg", Condition::variable("inner", "X", "1"));
        assert_eq!(not.operands()[0].label(), "inner");

        assert!(Condition::user("u", "root").operands().is_empty());
    }

    #[test]
    fn test_type_tags() {
        assert_eq!(
            Condition::compare_numeric("c", "v", "1", Operator::Equal).type_tag(),
            "comparenumerics"
        );
        assert_eq!(Condition::reference("r", "c").type_tag(), "ref");
        assert_eq!(Condition::xor("x", "a", "b").type_tag(), "xor");
    }

    #[test]
    fn test_describe() {
        let c = Condition::compare_numeric("c1", "count", "5", Operator::GreaterEqual);
        assert_eq!(
            c.describe(),
            "c1 depends on the value of variable count, which has to be >= 5"
        );
        let r = Condition::reference("r1", "c1");
        assert_eq!(r.describe(), "r1 refers to c1");
        let x = Condition::xor("x1", "a", "b");
        assert_eq!(x.describe(), "x1 requires exactly one of a and b");
    }
}

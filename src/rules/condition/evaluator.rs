//! Condition evaluator
//!
//! Leaf kinds never fail: bad numbers, missing variables, missing files and
//! unresolvable probes are logged and read as `false`. Only structural faults
//! (a link that does not resolve) come back as [`EvaluationError`], so the
//! registry can apply its own policy to them.

use std::fs;
use std::path::Path;

use super::ast::{
    Condition, ConditionKind, DynamicProbe, EmptyKind, ExistsKind, Operand, Operator, PackMatch,
};
use super::version;
use crate::error::EvaluationError;
use crate::rules::environment::Environment;
use crate::rules::probe::ProbeValue;
use crate::rules::registry::ConditionRegistry;

/// Evaluate a condition, resolving links through `registry`
pub fn evaluate(
    condition: &Condition,
    registry: &ConditionRegistry,
) -> Result<bool, EvaluationError> {
    let env = registry.environment();
    match condition.kind() {
        ConditionKind::CompareNumeric {
            variable,
            value,
            operator,
        } => Ok(compare_numeric(condition.id(), variable, value, *operator, env)),
        ConditionKind::CompareVersion {
            left,
            right,
            operator,
        } => {
            let left = env.substitute(left);
            let right = env.substitute(right);
            Ok(operator.matches(version::compare_versions(&left, &right)))
        }
        ConditionKind::Variable { name, value } => {
            Ok(env.variable(name).is_some_and(|current| current == *value))
        }
        ConditionKind::Exists { kind, content } => Ok(exists(*kind, content, env)),
        ConditionKind::Empty { kind, content } => {
            Ok(empty(condition.id(), *kind, content.as_deref(), env))
        }
        ConditionKind::PackSelection(pack) => Ok(env.selected_packs().iter().any(|p| match pack {
            PackMatch::Id(id) => p.id == *id,
            PackMatch::Name(name) => p.name == *name,
        })),
        ConditionKind::DynamicProbe(probe) => Ok(dynamic_probe(condition.id(), probe, env)),
        ConditionKind::UserIdentity { required } => Ok(match env.current_user() {
            Some(user) if !user.is_empty() && !required.is_empty() => user == *required,
            _ => false,
        }),
        ConditionKind::Ref { target } => follow(target, registry),
        ConditionKind::And(left, right) => {
            let left = operand(left, registry)?;
            let right = operand(right, registry)?;
            Ok(left && right)
        }
        ConditionKind::Or(left, right) => {
            let left = operand(left, registry)?;
            let right = operand(right, registry)?;
            Ok(left || right)
        }
        ConditionKind::Xor(left, right) => {
            let left = operand(left, registry)?;
            let right = operand(right, registry)?;
            Ok(left ^ right)
        }
        ConditionKind::Not(inner) => Ok(!operand(inner, registry)?),
    }
}

fn operand(operand: &Operand, registry: &ConditionRegistry) -> Result<bool, EvaluationError> {
    match operand {
        Operand::Id(id) => follow(id, registry),
        Operand::Inline(condition) => evaluate(condition, registry),
    }
}

fn follow(target: &str, registry: &ConditionRegistry) -> Result<bool, EvaluationError> {
    let condition = registry
        .get_condition(target)
        .ok_or_else(|| EvaluationError::UnresolvedLink(target.to_string()))?;
    evaluate(&condition, registry)
}

fn compare_numeric(
    id: &str,
    variable: &str,
    value: &str,
    operator: Operator,
    env: &Environment,
) -> bool {
    let Some(current) = env.variable(variable) else {
        log::debug!("{}: variable {} is not set", id, variable);
        return false;
    };
    let current = env.substitute(&current);
    let expected = env.substitute(value);
    match (current.parse::<i32>(), expected.parse::<i32>()) {
        (Ok(current), Ok(expected)) => operator.matches(current.cmp(&expected)),
        _ => {
            log::warn!(
                "{}: cannot compare '{}' with '{}', both have to be 32-bit integers",
                id,
                current,
                expected
            );
            false
        }
    }
}

fn exists(kind: ExistsKind, content: &str, env: &Environment) -> bool {
    match kind {
        ExistsKind::Variable => env.variable(content).is_some(),
        ExistsKind::File => Path::new(&env.substitute(content)).exists(),
    }
}

fn empty(id: &str, kind: EmptyKind, content: Option<&str>, env: &Environment) -> bool {
    let Some(content) = content else {
        return kind == EmptyKind::String;
    };
    match kind {
        EmptyKind::String => env.substitute(content).is_empty(),
        EmptyKind::Variable => env.variable(content).is_some_and(|value| value.is_empty()),
        EmptyKind::File => {
            let path = env.substitute(content);
            let path = Path::new(&path);
            // a missing file has length zero, so the length check never decides
            let length = fs::metadata(path).map(|m| m.len()).unwrap_or(0);
            !path.exists() && length == 0
        }
        EmptyKind::Dir => {
            let path = env.substitute(content);
            let path = Path::new(&path);
            if !path.exists() {
                return true;
            }
            if !path.is_dir() {
                return false;
            }
            match fs::read_dir(path) {
                Ok(mut entries) => entries.next().is_none(),
                Err(e) => {
                    log::warn!("{}: cannot list {}: {}", id, path.display(), e);
                    false
                }
            }
        }
    }
}

fn dynamic_probe(id: &str, probe: &DynamicProbe, env: &Environment) -> bool {
    if let Some(method) = &probe.method {
        log::warn!(
            "{}: method probing is not implemented ({}.{})",
            id,
            probe.type_name,
            method
        );
        return false;
    }
    let Some(field) = &probe.field else {
        return false;
    };

    let handle = match probe
        .resolved
        .get_or_try_init(|| env.symbols().resolve_field(&probe.type_name, field))
    {
        Ok(handle) => handle,
        Err(e) => {
            log::warn!("{}: {}", id, e);
            return false;
        }
    };

    if probe.value_type != "boolean" {
        log::warn!(
            "{}: probing fields of type '{}' is not implemented",
            id,
            probe.value_type
        );
        return false;
    }

    match handle.read() {
        ProbeValue::Bool(actual) => actual == probe.expected.eq_ignore_ascii_case("true"),
        other => {
            log::warn!("{}: {}.{} is not boolean: {:?}", id, probe.type_name, field, other);
            false
        }
    }
}

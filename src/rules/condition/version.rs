//! Version string ordering
//!
//! Versions are split on runs of characters outside `[A-Za-z0-9_]` and
//! compared token by token. Numeric tokens compare by value, so `1.2.10`
//! sorts after `1.2.9`. A token that is not a number sorts after every
//! numeric token; ties fall back to plain string order.

use once_cell::sync::Lazy;
use regex::Regex;
use std::cmp::Ordering;

static SEPARATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new("[^a-zA-Z0-9_]+").expect("separator pattern is valid"));

/// Compare two optional version strings. `None` sorts before any version.
pub fn compare(left: Option<&str>, right: Option<&str>) -> Ordering {
    match (left, right) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(l), Some(r)) => compare_versions(l, r),
    }
}

/// Compare two version strings
pub fn compare_versions(left: &str, right: &str) -> Ordering {
    let left = tokens(left);
    let right = tokens(right);

    for i in 0..=left.len().min(right.len()) {
        if i == left.len() {
            return if i == right.len() {
                Ordering::Equal
            } else {
                Ordering::Less
            };
        }
        if i == right.len() {
            return Ordering::Greater;
        }

        let (l, r) = (numeric(left[i]), numeric(right[i]));
        if l != r {
            return l.cmp(&r);
        }

        match left[i].cmp(right[i]) {
            Ordering::Equal => continue,
            other => return other,
        }
    }

    Ordering::Equal
}

fn tokens(version: &str) -> Vec<&str> {
    let mut tokens: Vec<&str> = SEPARATOR.split(version).collect();
    // A leading separator run yields an empty first token; trailing ones are dropped.
    if !version.is_empty() {
        while tokens.last() == Some(&"") {
            tokens.pop();
        }
    }
    tokens
}

fn numeric(token: &str) -> i32 {
    token.parse().unwrap_or(i32::MAX)
}

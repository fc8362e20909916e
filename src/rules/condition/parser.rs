//! Compact condition expression parser
//!
//! Expressions combine registered condition ids with four operators:
//! - `a+b` both (and)
//! - `a|b` either (or)
//! - `a\b` exactly one (xor)
//! - `!a` negation, only at the start of an expression
//!
//! There is no precedence and no grouping. The text left of the first binary
//! operator must be a plain registered id; everything right of it is parsed
//! again by the same rule. Chains therefore fold to the right:
//! `a+b|c` is `And(a, Or(b, c))` and `!a+b` is `Not(And(a, b))`.
//!
//! Every operator adds one level of nesting, so expressions with more than
//! [`MAX_OPERATORS`] operator characters are rejected before parsing.

use super::ast::{Condition, ConditionKind, Operand};
use crate::error::ParseError;

/// Upper bound on `+ | \ !` characters in one expression
pub const MAX_OPERATORS: usize = 256;

/// Parse `expression` over the ids accepted by `is_registered`.
///
/// A plain id yields [`Operand::Id`]; anything with an operator yields an
/// anonymous [`Operand::Inline`] condition whose id is the (sub)expression text.
pub fn parse<F>(expression: &str, is_registered: F) -> Result<Operand, ParseError>
where
    F: Fn(&str) -> bool,
{
    let operators = expression
        .bytes()
        .filter(|&b| matches!(b, b'+' | b'|' | b'\\' | b'!'))
        .count();
    if operators > MAX_OPERATORS {
        return Err(ParseError::TooComplex {
            length: expression.len(),
            limit: MAX_OPERATORS,
        });
    }
    Parser {
        expression,
        is_registered,
    }
    .parse_from(0)
}

struct Parser<'a, F> {
    expression: &'a str,
    is_registered: F,
}

impl<F> Parser<'_, F>
where
    F: Fn(&str) -> bool,
{
    fn parse_from(&self, start: usize) -> Result<Operand, ParseError> {
        let rest = &self.expression[start..];
        if rest.is_empty() {
            return Err(ParseError::MissingOperand(self.expression.to_string()));
        }

        if rest.starts_with('!') {
            let operand = self.parse_from(start + 1)?;
            return Ok(Condition::new(rest, ConditionKind::Not(operand)).into());
        }

        for (i, c) in rest.char_indices() {
            let combine: fn(Operand, Operand) -> ConditionKind = match c {
                '+' => ConditionKind::And,
                '|' => ConditionKind::Or,
                '\\' => ConditionKind::Xor,
                '!' => {
                    log::debug!(
                        "'!' is only allowed at position 0, treating it as part of an id in '{}'",
                        self.expression
                    );
                    continue;
                }
                _ => continue,
            };
            let left = self.link(&rest[..i])?;
            let right = self.parse_from(start + i + 1)?;
            return Ok(Condition::new(rest, combine(left, right)).into());
        }

        self.link(rest)
    }

    fn link(&self, id: &str) -> Result<Operand, ParseError> {
        if (self.is_registered)(id) {
            Ok(Operand::Id(id.to_string()))
        } else {
            Err(ParseError::UnknownCondition {
                id: id.to_string(),
                expression: self.expression.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn known(id: &str) -> bool {
        matches!(id, "a" | "b" | "c" | "test.true" | "test.true2" | "x!y")
    }

    fn id(id: &str) -> Operand {
        Operand::Id(id.to_string())
    }

    fn inline(id: &str, kind: ConditionKind) -> Operand {
        Operand::Inline(Box::new(Condition::new(id, kind)))
    }

    #[test]
    fn test_parse_plain_id() {
        assert_eq!(parse("a", known).unwrap(), id("a"));
    }

    #[test]
    fn test_parse_and() {
        assert_eq!(
            parse("a+b", known).unwrap(),
            inline("a+b", ConditionKind::And(id("a"), id("b")))
        );
    }

    #[test]
    fn test_parse_or_and_xor() {
        assert_eq!(
            parse("a|b", known).unwrap(),
            inline("a|b", ConditionKind::Or(id("a"), id("b")))
        );
        assert_eq!(
            parse("a\\b", known).unwrap(),
            inline("a\\b", ConditionKind::Xor(id("a"), id("b")))
        );
    }

    #[test]
    fn test_chains_fold_right() {
        let expected = inline(
            "a+b+c",
            ConditionKind::And(id("a"), inline("b+c", ConditionKind::And(id("b"), id("c")))),
        );
        assert_eq!(parse("a+b+c", known).unwrap(), expected);
    }

    #[test]
    fn test_mixed_operators_fold_right() {
        let expected = inline(
            "a+b|c",
            ConditionKind::And(id("a"), inline("b|c", ConditionKind::Or(id("b"), id("c")))),
        );
        assert_eq!(parse("a+b|c", known).unwrap(), expected);
    }

    #[test]
    fn test_leading_not_covers_the_rest() {
        let expected = inline(
            "!a+b",
            ConditionKind::Not(inline("a+b", ConditionKind::And(id("a"), id("b")))),
        );
        assert_eq!(parse("!a+b", known).unwrap(), expected);
    }

    #[test]
    fn test_not_after_operator() {
        let expected = inline(
            "a+!b",
            ConditionKind::And(id("a"), inline("!b", ConditionKind::Not(id("b")))),
        );
        assert_eq!(parse("a+!b", known).unwrap(), expected);
    }

    #[test]
    fn test_double_not() {
        let expected = inline(
            "!!a",
            ConditionKind::Not(inline("!a", ConditionKind::Not(id("a")))),
        );
        assert_eq!(parse("!!a", known).unwrap(), expected);
    }

    #[test]
    fn test_misplaced_not_is_part_of_id() {
        assert_eq!(parse("x!y", known).unwrap(), id("x!y"));
        assert!(parse("a!b", known).is_err());
    }

    #[test]
    fn test_dotted_ids() {
        assert_eq!(
            parse("test.true2\\test.true", known).unwrap(),
            inline(
                "test.true2\\test.true",
                ConditionKind::Xor(id("test.true2"), id("test.true"))
            )
        );
    }

    #[test]
    fn test_left_operand_is_not_parsed_again() {
        // only the text before the first operator is looked up, verbatim
        let err = parse("z+a", known).unwrap_err();
        assert_eq!(
            err,
            ParseError::UnknownCondition {
                id: "z".to_string(),
                expression: "z+a".to_string()
            }
        );
    }

    #[test]
    fn test_unknown_right_operand() {
        assert!(matches!(
            parse("a+zzz", known),
            Err(ParseError::UnknownCondition { id, .. }) if id == "zzz"
        ));
    }

    #[test]
    fn test_missing_operands() {
        assert_eq!(
            parse("a+", known).unwrap_err(),
            ParseError::MissingOperand("a+".to_string())
        );
        assert!(matches!(parse("!", known), Err(ParseError::MissingOperand(_))));
        assert!(matches!(parse("", known), Err(ParseError::MissingOperand(_))));
    }

    #[test]
    fn test_operator_limit() {
        let deep = format!("{}a", "!".repeat(100_000));
        assert_eq!(
            parse(&deep, known).unwrap_err(),
            ParseError::TooComplex {
                length: 100_001,
                limit: MAX_OPERATORS
            }
        );

        let wide = vec!["a"; 100_000].join("+");
        assert!(matches!(parse(&wide, known), Err(ParseError::TooComplex { .. })));

        let longest = vec!["a"; MAX_OPERATORS + 1].join("|");
        assert!(matches!(parse(&longest, known), Ok(Operand::Inline(_))));
        let one_more = format!("{}|b", longest);
        assert!(matches!(parse(&one_more, known), Err(ParseError::TooComplex { .. })));
    }

    #[test]
    fn test_empty_left_operand() {
        assert!(matches!(
            parse("+a", known),
            Err(ParseError::UnknownCondition { id, .. }) if id.is_empty()
        ));
    }
}

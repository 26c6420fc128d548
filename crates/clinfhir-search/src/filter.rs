//! `_filter` parameter parser.
//!
//! ```text
//! filter     = orExp
//! orExp      = andExp ("or" andExp)*
//! andExp     = primary ("and" primary)*
//! primary    = "(" filter ")" / paramExp
//! paramExp   = paramName SP compareOp SP compValue
//! compareOp  = "eq" / "co" / "sw" / "ew"
//! compValue  = word / quoted string
//! ```
//!
//! `and` binds tighter than `or`. Keywords and operators are recognised by
//! position, so a value may itself be `and` or `eq`.
//!
//! Syntax errors reject the whole filter. Comparisons that parse but name an
//! unknown parameter, an operator the parameter does not support or an
//! invalid value are collected and reported together.

use crate::condition::SearchCondition;
use crate::operators::MatchOperator;
use crate::parameters::SearchParameterType;
use crate::predicate::build_with_operator;
use crate::registry::{ResourceDescriptorSet, guarded};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error("Invalid _filter: {0}")]
    Syntax(String),

    #[error("Invalid expressions in _filter: {}", .0.join(", "))]
    InvalidExpressions(Vec<String>),
}

/// Comparison operators supported in _filter expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    /// Equal
    Eq,
    /// Contains
    Co,
    /// Starts with
    Sw,
    /// Ends with
    Ew,
}

impl FilterOp {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "eq" => Some(Self::Eq),
            "co" => Some(Self::Co),
            "sw" => Some(Self::Sw),
            "ew" => Some(Self::Ew),
            _ => None,
        }
    }

    fn to_match_operator(self) -> MatchOperator {
        match self {
            Self::Eq => MatchOperator::Equals,
            Self::Co => MatchOperator::Contains,
            Self::Sw => MatchOperator::StartsWith,
            Self::Ew => MatchOperator::EndsWith,
        }
    }

    /// String parameters take every operator; other types only `eq`.
    fn supported_by(self, kind: SearchParameterType) -> bool {
        kind == SearchParameterType::String || self == Self::Eq
    }
}

/// Logical operators for combining filter expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

/// A single `param op value` comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterComparison {
    pub parameter: String,
    /// Operator as written; checked when the filter is applied
    pub operator: String,
    /// Value with surrounding quotes removed
    pub value: String,
    /// Source text of the comparison, used in error messages
    pub text: String,
}

/// A parsed filter expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterExpression {
    Comparison(FilterComparison),
    Logical {
        op: LogicalOp,
        left: Box<FilterExpression>,
        right: Box<FilterExpression>,
    },
}

impl FilterExpression {
    pub fn comparisons(&self) -> Vec<&FilterComparison> {
        match self {
            Self::Comparison(c) => vec![c],
            Self::Logical { left, right, .. } => {
                let mut out = left.comparisons();
                out.extend(right.comparisons());
                out
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TokenKind {
    Word(String),
    Quoted(String),
    OpenParen,
    CloseParen,
    Eof,
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    start: usize,
    end: usize,
}

/// Tokenizer for filter expressions.
struct Tokenizer<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Tokenizer<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn skip_whitespace(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.input.len() - trimmed.len();
    }

    fn next_token(&mut self) -> Result<Token, FilterError> {
        self.skip_whitespace();
        let start = self.pos;

        let Some(ch) = self.rest().chars().next() else {
            return Ok(Token {
                kind: TokenKind::Eof,
                start,
                end: start,
            });
        };

        let kind = match ch {
            '(' => {
                self.pos += 1;
                TokenKind::OpenParen
            }
            ')' => {
                self.pos += 1;
                TokenKind::CloseParen
            }
            '"' => {
                let body = &self.rest()[1..];
                let close = body.find('"').ok_or_else(|| {
                    FilterError::Syntax("unterminated quoted string".to_string())
                })?;
                self.pos += close + 2;
                TokenKind::Quoted(body[..close].to_string())
            }
            _ => {
                let len = self
                    .rest()
                    .find(|c: char| c.is_whitespace() || matches!(c, '(' | ')' | '"'))
                    .unwrap_or(self.rest().len());
                let word = &self.rest()[..len];
                self.pos += len;
                TokenKind::Word(word.to_string())
            }
        };

        Ok(Token {
            kind,
            start,
            end: self.pos,
        })
    }
}

/// Parser for filter expressions.
struct Parser<'a> {
    input: &'a str,
    tokenizer: Tokenizer<'a>,
    current: Token,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Result<Self, FilterError> {
        let mut tokenizer = Tokenizer::new(input);
        let current = tokenizer.next_token()?;
        Ok(Self {
            input,
            tokenizer,
            current,
        })
    }

    fn advance(&mut self) -> Result<Token, FilterError> {
        let next = self.tokenizer.next_token()?;
        Ok(std::mem::replace(&mut self.current, next))
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        matches!(&self.current.kind, TokenKind::Word(w) if w.eq_ignore_ascii_case(keyword))
    }

    fn parse_or(&mut self) -> Result<FilterExpression, FilterError> {
        let mut left = self.parse_and()?;
        while self.at_keyword("or") {
            self.advance()?;
            let right = self.parse_and()?;
            left = FilterExpression::Logical {
                op: LogicalOp::Or,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<FilterExpression, FilterError> {
        let mut left = self.parse_primary()?;
        while self.at_keyword("and") {
            self.advance()?;
            let right = self.parse_primary()?;
            left = FilterExpression::Logical {
                op: LogicalOp::And,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_primary(&mut self) -> Result<FilterExpression, FilterError> {
        if self.current.kind == TokenKind::OpenParen {
            self.advance()?;
            let expr = self.parse_or()?;
            if self.current.kind != TokenKind::CloseParen {
                return Err(FilterError::Syntax("expected ')'".to_string()));
            }
            self.advance()?;
            return Ok(expr);
        }

        let first = self.advance()?;
        let TokenKind::Word(parameter) = first.kind else {
            return Err(FilterError::Syntax(format!(
                "expected a parameter name at position {}",
                first.start
            )));
        };
        let TokenKind::Word(operator) = self.advance()?.kind else {
            return Err(FilterError::Syntax(format!(
                "expected an operator after \"{parameter}\""
            )));
        };
        let last = self.advance()?;
        let value = match last.kind {
            TokenKind::Word(value) | TokenKind::Quoted(value) => value,
            _ => {
                return Err(FilterError::Syntax(format!(
                    "expected a value after \"{parameter} {operator}\""
                )));
            }
        };

        Ok(FilterExpression::Comparison(FilterComparison {
            parameter,
            operator,
            value,
            text: self.input[first.start..last.end].to_string(),
        }))
    }
}

/// Parse a _filter expression string.
pub fn parse_filter(input: &str) -> Result<FilterExpression, FilterError> {
    let mut parser = Parser::new(input)?;
    let expr = parser.parse_or()?;
    if parser.current.kind != TokenKind::Eof {
        return Err(FilterError::Syntax(format!(
            "unexpected input at position {}",
            parser.current.start
        )));
    }
    Ok(expr)
}

/// Translate a parsed filter into a condition over the resource's fields.
pub fn to_condition(
    expression: &FilterExpression,
    set: &ResourceDescriptorSet,
) -> Result<SearchCondition, FilterError> {
    let mut invalid = Vec::new();
    let condition = translate(expression, set, &mut invalid);
    if invalid.is_empty() {
        Ok(condition)
    } else {
        Err(FilterError::InvalidExpressions(invalid))
    }
}

fn translate(
    expression: &FilterExpression,
    set: &ResourceDescriptorSet,
    invalid: &mut Vec<String>,
) -> SearchCondition {
    match expression {
        FilterExpression::Logical { op, left, right } => {
            let parts = vec![translate(left, set, invalid), translate(right, set, invalid)];
            match op {
                LogicalOp::And => SearchCondition::and(parts),
                LogicalOp::Or => SearchCondition::or(parts),
            }
        }
        FilterExpression::Comparison(comparison) => match comparison_condition(comparison, set) {
            Some(condition) => condition,
            None => {
                invalid.push(format!("\"{}\"", comparison.text));
                SearchCondition::False
            }
        },
    }
}

fn comparison_condition(
    comparison: &FilterComparison,
    set: &ResourceDescriptorSet,
) -> Option<SearchCondition> {
    let descriptor = set.get(&comparison.parameter)?;
    let op = FilterOp::parse(&comparison.operator).filter(|op| op.supported_by(descriptor.kind))?;
    let value = guarded(|| {
        descriptor.rule.check(&comparison.parameter, &comparison.value)?;
        descriptor.coerce(&comparison.value)
    })
    .ok()?;
    build_with_operator(descriptor, &value, op.to_match_operator(), None).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::{Operator, SqlValue};
    use crate::parameters::SearchModifier;
    use crate::registry::{FieldTarget, SearchParameterDescriptor, ValidationRule};

    fn set() -> ResourceDescriptorSet {
        ResourceDescriptorSet::new("Patient", "patients")
            .with_parameter(
                SearchParameterDescriptor::new(
                    "given",
                    SearchParameterType::String,
                    FieldTarget::single("first_name"),
                )
                .with_modifiers(&SearchModifier::STRING_MODIFIERS),
            )
            .with_parameter(
                SearchParameterDescriptor::new(
                    "gender",
                    SearchParameterType::Token,
                    FieldTarget::single("sex"),
                )
                .with_rule(ValidationRule::one_of(["male", "female", "other"])),
            )
    }

    fn cmp(parameter: &str, operator: &str, value: &str, text: &str) -> FilterExpression {
        FilterExpression::Comparison(FilterComparison {
            parameter: parameter.to_string(),
            operator: operator.to_string(),
            value: value.to_string(),
            text: text.to_string(),
        })
    }

    #[test]
    fn test_parse_simple_comparison() {
        let expr = parse_filter("given eq \"Anna Lee\"").unwrap();
        assert_eq!(expr, cmp("given", "eq", "Anna Lee", "given eq \"Anna Lee\""));
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        let expr = parse_filter("given eq a or given eq b and gender eq male").unwrap();
        let FilterExpression::Logical { op, left, right } = expr else {
            panic!("expected logical expression");
        };
        assert_eq!(op, LogicalOp::Or);
        assert_eq!(*left, cmp("given", "eq", "a", "given eq a"));
        assert!(matches!(*right, FilterExpression::Logical { op: LogicalOp::And, .. }));
    }

    #[test]
    fn test_parentheses_override_precedence() {
        let expr = parse_filter("(given eq a or given eq b) and gender eq male").unwrap();
        assert!(matches!(expr, FilterExpression::Logical { op: LogicalOp::And, .. }));
        assert_eq!(expr.comparisons().len(), 3);
    }

    #[test]
    fn test_keywords_are_positional() {
        let expr = parse_filter("given eq and").unwrap();
        assert_eq!(expr, cmp("given", "eq", "and", "given eq and"));
    }

    #[test]
    fn test_syntax_errors() {
        assert!(matches!(parse_filter(""), Err(FilterError::Syntax(_))));
        assert!(matches!(parse_filter("given eq"), Err(FilterError::Syntax(_))));
        assert!(matches!(parse_filter("given eq \"open"), Err(FilterError::Syntax(_))));
        assert!(matches!(parse_filter("(given eq a"), Err(FilterError::Syntax(_))));
        assert!(matches!(parse_filter("given eq a given"), Err(FilterError::Syntax(_))));
    }

    #[test]
    fn test_to_condition() {
        let expr = parse_filter("given sw an and gender eq female").unwrap();
        let condition = to_condition(&expr, &set()).unwrap();
        assert_eq!(
            condition,
            SearchCondition::And(vec![
                SearchCondition::Compare {
                    field: "first_name".into(),
                    op: Operator::StartsWith,
                    value: SqlValue::text("AN"),
                    case_insensitive: true,
                },
                SearchCondition::eq("sex", SqlValue::text("female")),
            ])
        );
    }

    #[test]
    fn test_invalid_expressions_are_collected() {
        let expr = parse_filter("given xx Bob or gender co fem or family eq x or gender eq robot")
            .unwrap();
        let err = to_condition(&expr, &set()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid expressions in _filter: \"given xx Bob\", \"gender co fem\", \"family eq x\", \"gender eq robot\""
        );
    }
}

//! Restricted arithmetic formulas over numeric sibling fields.
//!
//! The grammar is infix `+ - * /` with parentheses over numeric literals and
//! field codes. There are no function calls, string operations or comparisons.

use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::condition::value_as_number;
use crate::record::RecordData;

/// Longest accepted formula text, in characters.
pub const MAX_FORMULA_LENGTH: usize = 1024;
/// Deepest accepted nesting of parentheses and unary signs.
pub const MAX_FORMULA_NESTING: usize = 32;

/// Formula parse or evaluation failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormulaError {
    /// Formula text is not valid under the arithmetic grammar.
    #[error("syntax error at position {position}: {message}")]
    Syntax {
        /// Character offset where parsing failed.
        position: usize,
        /// Human readable reason.
        message: String,
    },
    /// Right-hand side of a division evaluated to zero.
    #[error("division by zero")]
    DivideByZero,
    /// Result overflowed to an infinite or NaN value.
    #[error("result is not a finite number")]
    NonFinite,
}

/// Non-fatal finding collected while evaluating a formula.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormulaWarning {
    /// Referenced field is absent or `null`; `0` was used.
    MissingOperand(String),
    /// Referenced field holds a non-numeric value; `0` was used.
    NonNumericOperand(String),
}

impl Display for FormulaWarning {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingOperand(field) => write!(formatter, "missing operand '{field}'"),
            Self::NonNumericOperand(field) => write!(formatter, "non-numeric operand '{field}'"),
        }
    }
}

/// Successful evaluation result.
#[derive(Debug, Clone, PartialEq)]
pub struct FormulaOutcome {
    /// Computed value.
    pub value: f64,
    /// Operands that were substituted with `0`.
    pub warnings: Vec<FormulaWarning>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    Add,
    Subtract,
    Multiply,
    Divide,
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Number(f64),
    Field(String),
    Negate(Box<Expr>),
    Binary {
        operator: Operator,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Identifier(String),
    Operator(Operator),
    OpenParen,
    CloseParen,
}

/// Parsed formula ready for repeated evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    source: String,
    expr: Expr,
}

impl Formula {
    /// Parses formula text.
    pub fn parse(source: &str) -> Result<Self, FormulaError> {
        if source.chars().count() > MAX_FORMULA_LENGTH {
            return Err(FormulaError::Syntax {
                position: MAX_FORMULA_LENGTH,
                message: format!("formula is longer than {MAX_FORMULA_LENGTH} characters"),
            });
        }

        let tokens = tokenize(source)?;
        let mut parser = Parser {
            tokens: &tokens,
            cursor: 0,
            depth: 0,
        };
        let expr = parser.expression()?;
        if let Some((position, _)) = parser.peek() {
            return Err(FormulaError::Syntax {
                position,
                message: "unexpected trailing input".to_owned(),
            });
        }

        Ok(Self {
            source: source.to_owned(),
            expr,
        })
    }

    /// Returns the original formula text.
    #[must_use]
    pub fn source(&self) -> &str {
        self.source.as_str()
    }

    /// Returns every field code the formula reads.
    #[must_use]
    pub fn referenced_fields(&self) -> BTreeSet<&str> {
        let mut fields = BTreeSet::new();
        collect_fields(&self.expr, &mut fields);
        fields
    }

    /// Evaluates against a record snapshot. Missing or non-numeric operands
    /// count as `0` and are reported as warnings.
    pub fn evaluate(&self, record: &RecordData) -> Result<FormulaOutcome, FormulaError> {
        let mut warnings = Vec::new();
        let value = eval(&self.expr, record, &mut warnings)?;
        if !value.is_finite() {
            return Err(FormulaError::NonFinite);
        }

        Ok(FormulaOutcome { value, warnings })
    }
}

impl Display for Formula {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.source.as_str())
    }
}

/// Presentation format of a calculated field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormulaFormat {
    /// Plain number.
    #[default]
    Number,
    /// Number prefixed with a currency symbol.
    Currency,
    /// Fraction rendered as a percentage.
    Percent,
}

impl FormulaFormat {
    /// Renders an evaluated value with a fixed number of decimals.
    #[must_use]
    pub fn render(self, value: f64, decimals: u8, currency_symbol: &str) -> String {
        let decimals = usize::from(decimals);
        match self {
            Self::Number => format!("{value:.decimals$}"),
            Self::Currency => {
                if value < 0.0 {
                    format!("-{currency_symbol}{:.decimals$}", value.abs())
                } else {
                    format!("{currency_symbol}{value:.decimals$}")
                }
            }
            Self::Percent => format!("{:.decimals$}%", value * 100.0),
        }
    }
}

fn collect_fields<'a>(expr: &'a Expr, fields: &mut BTreeSet<&'a str>) {
    match expr {
        Expr::Number(_) => {}
        Expr::Field(code) => {
            fields.insert(code.as_str());
        }
        Expr::Negate(inner) => collect_fields(inner, fields),
        Expr::Binary { left, right, .. } => {
            collect_fields(left, fields);
            collect_fields(right, fields);
        }
    }
}

fn eval(
    expr: &Expr,
    record: &RecordData,
    warnings: &mut Vec<FormulaWarning>,
) -> Result<f64, FormulaError> {
    match expr {
        Expr::Number(number) => Ok(*number),
        Expr::Field(code) => Ok(operand_value(code, record, warnings)),
        Expr::Negate(inner) => Ok(-eval(inner, record, warnings)?),
        Expr::Binary {
            operator,
            left,
            right,
        } => {
            let left = eval(left, record, warnings)?;
            let right = eval(right, record, warnings)?;
            match operator {
                Operator::Add => Ok(left + right),
                Operator::Subtract => Ok(left - right),
                Operator::Multiply => Ok(left * right),
                Operator::Divide => {
                    if right == 0.0 {
                        return Err(FormulaError::DivideByZero);
                    }
                    Ok(left / right)
                }
            }
        }
    }
}

fn operand_value(code: &str, record: &RecordData, warnings: &mut Vec<FormulaWarning>) -> f64 {
    match record.get(code) {
        None | Some(Value::Null) => {
            warnings.push(FormulaWarning::MissingOperand(code.to_owned()));
            0.0
        }
        Some(value) => value_as_number(value).unwrap_or_else(|| {
            warnings.push(FormulaWarning::NonNumericOperand(code.to_owned()));
            0.0
        }),
    }
}

fn tokenize(source: &str) -> Result<Vec<(usize, Token)>, FormulaError> {
    let characters: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut index = 0;

    while index < characters.len() {
        let character = characters[index];
        let start = index;

        if character.is_whitespace() {
            index += 1;
            continue;
        }

        let token = match character {
            '+' => Token::Operator(Operator::Add),
            '-' => Token::Operator(Operator::Subtract),
            '*' => Token::Operator(Operator::Multiply),
            '/' => Token::Operator(Operator::Divide),
            '(' => Token::OpenParen,
            ')' => Token::CloseParen,
            '0'..='9' | '.' => {
                while index < characters.len()
                    && (characters[index].is_ascii_digit() || characters[index] == '.')
                {
                    index += 1;
                }
                let literal: String = characters[start..index].iter().collect();
                let number = literal.parse::<f64>().map_err(|_| FormulaError::Syntax {
                    position: start,
                    message: format!("invalid number literal '{literal}'"),
                })?;
                tokens.push((start, Token::Number(number)));
                continue;
            }
            character if character.is_ascii_alphabetic() || character == '_' => {
                while index < characters.len()
                    && (characters[index].is_ascii_alphanumeric() || characters[index] == '_')
                {
                    index += 1;
                }
                let identifier: String = characters[start..index].iter().collect();
                tokens.push((start, Token::Identifier(identifier)));
                continue;
            }
            other => {
                return Err(FormulaError::Syntax {
                    position: start,
                    message: format!("unexpected character '{other}'"),
                });
            }
        };

        tokens.push((start, token));
        index += 1;
    }

    Ok(tokens)
}

struct Parser<'a> {
    tokens: &'a [(usize, Token)],
    cursor: usize,
    depth: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<(usize, &Token)> {
        self.tokens
            .get(self.cursor)
            .map(|(position, token)| (*position, token))
    }

    fn end_position(&self) -> usize {
        self.tokens.last().map(|(position, _)| position + 1).unwrap_or(0)
    }

    fn descend(&mut self, position: usize) -> Result<(), FormulaError> {
        self.depth += 1;
        if self.depth > MAX_FORMULA_NESTING {
            return Err(FormulaError::Syntax {
                position,
                message: format!("formula nests deeper than {MAX_FORMULA_NESTING} levels"),
            });
        }
        Ok(())
    }

    fn expression(&mut self) -> Result<Expr, FormulaError> {
        let mut left = self.term()?;
        while let Some((_, Token::Operator(operator @ (Operator::Add | Operator::Subtract)))) =
            self.peek()
        {
            let operator = *operator;
            self.cursor += 1;
            let right = self.term()?;
            left = Expr::Binary {
                operator,
                left: Box::new(left),
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    fn term(&mut self) -> Result<Expr, FormulaError> {
        let mut left = self.factor()?;
        while let Some((_, Token::Operator(operator @ (Operator::Multiply | Operator::Divide)))) =
            self.peek()
        {
            let operator = *operator;
            self.cursor += 1;
            let right = self.factor()?;
            left = Expr::Binary {
                operator,
                left: Box::new(left),
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    fn factor(&mut self) -> Result<Expr, FormulaError> {
        let Some((position, token)) = self.peek() else {
            return Err(FormulaError::Syntax {
                position: self.end_position(),
                message: "unexpected end of formula".to_owned(),
            });
        };

        match token {
            Token::Number(number) => {
                let number = *number;
                self.cursor += 1;
                Ok(Expr::Number(number))
            }
            Token::Identifier(code) => {
                let code = code.clone();
                self.cursor += 1;
                if let Some((position, Token::OpenParen)) = self.peek() {
                    return Err(FormulaError::Syntax {
                        position,
                        message: format!("function calls are not supported ('{code}')"),
                    });
                }
                Ok(Expr::Field(code))
            }
            Token::Operator(Operator::Subtract) => {
                self.cursor += 1;
                self.descend(position)?;
                let inner = self.factor()?;
                self.depth -= 1;
                Ok(Expr::Negate(Box::new(inner)))
            }
            Token::Operator(Operator::Add) => {
                self.cursor += 1;
                self.descend(position)?;
                let inner = self.factor()?;
                self.depth -= 1;
                Ok(inner)
            }
            Token::OpenParen => {
                self.cursor += 1;
                self.descend(position)?;
                let inner = self.expression()?;
                self.depth -= 1;
                match self.peek() {
                    Some((_, Token::CloseParen)) => {
                        self.cursor += 1;
                        Ok(inner)
                    }
                    Some((position, _)) => Err(FormulaError::Syntax {
                        position,
                        message: "expected ')'".to_owned(),
                    }),
                    None => Err(FormulaError::Syntax {
                        position: self.end_position(),
                        message: "unclosed '('".to_owned(),
                    }),
                }
            }
            Token::Operator(_) | Token::CloseParen => Err(FormulaError::Syntax {
                position,
                message: "expected a number, field or '('".to_owned(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{Map, Value, json};

    use super::{
        Formula, FormulaError, FormulaFormat, FormulaWarning, MAX_FORMULA_LENGTH,
        MAX_FORMULA_NESTING,
    };
    use crate::record::RecordData;

    fn record(value: Value) -> RecordData {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    fn evaluate(source: &str, data: &RecordData) -> Result<f64, FormulaError> {
        Formula::parse(source)?
            .evaluate(data)
            .map(|outcome| outcome.value)
    }

    #[test]
    fn respects_operator_precedence() {
        let result = evaluate("a + b * 2", &record(json!({"a": 3, "b": 4})));
        assert_eq!(result, Ok(11.0));
    }

    #[test]
    fn parentheses_and_unary_minus() {
        let result = evaluate("-(a + 1) * 2 - -b", &record(json!({"a": 1, "b": 3})));
        assert_eq!(result, Ok(-1.0));
    }

    #[test]
    fn division_by_zero_is_a_typed_result() {
        let data = record(json!({"a": 5, "b": 0}));
        assert_eq!(evaluate("a / b", &data), Err(FormulaError::DivideByZero));

        let next = evaluate("a / 2", &data);
        assert_eq!(next, Ok(2.5));
    }

    #[test]
    fn missing_operand_counts_as_zero_with_warning() {
        let formula = Formula::parse("qty * price + fee").unwrap_or_else(|_| unreachable!());
        let outcome = formula
            .evaluate(&record(json!({"qty": 2, "price": "4.5", "fee": "n/a"})))
            .unwrap_or_else(|_| unreachable!());

        assert_eq!(outcome.value, 9.0);
        assert_eq!(
            outcome.warnings,
            vec![FormulaWarning::NonNumericOperand("fee".to_owned())]
        );

        let outcome = formula
            .evaluate(&record(json!({"qty": 2})))
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(outcome.value, 0.0);
        assert_eq!(outcome.warnings.len(), 2);
    }

    #[test]
    fn rejects_functions_and_garbage() {
        assert!(Formula::parse("sum(a, b)").is_err());
        assert!(Formula::parse("a + ").is_err());
        assert!(Formula::parse("(a + b").is_err());
        assert!(Formula::parse("a > b").is_err());
        assert!(Formula::parse("a b").is_err());
        assert!(Formula::parse("1..2").is_err());
    }

    #[test]
    fn lists_referenced_fields() {
        let formula = Formula::parse("(qty * price) - discount / qty")
            .unwrap_or_else(|_| unreachable!());
        let fields: Vec<&str> = formula.referenced_fields().into_iter().collect();
        assert_eq!(fields, vec!["discount", "price", "qty"]);
    }

    #[test]
    fn currency_total_renders_two_decimals() {
        let value = evaluate("qty * price", &record(json!({"qty": 3, "price": 150.5})))
            .unwrap_or_else(|_| unreachable!());

        assert_eq!(value, 451.5);
        assert_eq!(FormulaFormat::Currency.render(value, 2, ""), "451.50");
        assert_eq!(FormulaFormat::Currency.render(-3.0, 1, "$"), "-$3.0");
        assert_eq!(FormulaFormat::Percent.render(0.125, 1, ""), "12.5%");
    }

    #[test]
    fn deep_nesting_is_a_syntax_error() {
        let nested = |depth: usize| format!("{}1{}", "(".repeat(depth), ")".repeat(depth));
        assert_eq!(evaluate(&nested(MAX_FORMULA_NESTING), &RecordData::new()), Ok(1.0));
        assert!(matches!(
            Formula::parse(&nested(MAX_FORMULA_NESTING + 1)),
            Err(FormulaError::Syntax { .. })
        ));
        assert!(matches!(
            Formula::parse(&nested(2000)),
            Err(FormulaError::Syntax { .. })
        ));

        let negations = format!("{}qty", "-".repeat(MAX_FORMULA_NESTING + 1));
        assert!(matches!(Formula::parse(&negations), Err(FormulaError::Syntax { .. })));
        assert_eq!(evaluate("--qty", &record(json!({"qty": 4}))), Ok(4.0));
    }

    #[test]
    fn oversized_formulas_are_rejected() {
        let chain = vec!["qty"; MAX_FORMULA_LENGTH].join("+");
        assert!(matches!(Formula::parse(&chain), Err(FormulaError::Syntax { .. })));
    }
}

//! Arithmetic expression evaluation.
//!
//! Expressions are evaluated over `f64` by a small recursive-descent parser that
//! works directly on the input characters; no syntax tree is kept.
//!
//! # Grammar
//!
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := unary (('*' | '/' | '%') unary)*
//! unary   := ('+' | '-') unary | power
//! power   := primary ('^' unary)?
//! primary := number | constant | function '(' expr (',' expr)* ')' | '(' expr ')'
//! ```
//!
//! `^` is right-associative and binds tighter than a leading minus, so `-2^2`
//! is `-4`. Constants are `pi` and `e`. Nesting of parentheses and unary
//! signs is capped at [`MAX_DEPTH`].
//!
//! # Example
//! ```rust
//! use calcq::eval::evaluate;
//!
//! assert_eq!(evaluate("2 * (3 + 4)").value, 14.0);
//! assert!(evaluate("2 +").value.is_nan());
//! ```
use std::{f64::consts, iter::Peekable, str::CharIndices};

use thiserror::Error;

/// Deepest nesting of unary signs and parenthesised groups accepted.
pub const MAX_DEPTH: usize = 256;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum EvalError {
    #[error("empty expression")]
    Empty,

    #[error("unexpected end of expression")]
    UnexpectedEnd,

    #[error("unexpected character '{found}' at position {position}")]
    UnexpectedChar { found: char, position: usize },

    #[error("invalid number '{0}'")]
    InvalidNumber(String),

    #[error("unknown identifier '{0}'")]
    UnknownIdentifier(String),

    #[error("function '{name}' expects {expected} argument(s), got {found}")]
    Arity {
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("division by zero")]
    DivisionByZero,

    #[error("result is not a real number")]
    NotANumber,

    #[error("expression nested too deeply")]
    TooDeep,
}

/// Value paired with its diagnostic; `value` is NaN exactly when `error` is
/// non-empty.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub value: f64,
    pub error: String,
}

impl Evaluation {
    pub fn succeeded(value: f64) -> Self {
        Self {
            value,
            error: String::new(),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            value: f64::NAN,
            error: error.into(),
        }
    }
}

impl From<Result<f64, EvalError>> for Evaluation {
    fn from(value: Result<f64, EvalError>) -> Self {
        match value {
            Ok(value) => Evaluation::succeeded(value),
            Err(e) => Evaluation::failed(e.to_string()),
        }
    }
}

/// Evaluates `expression`, folding any failure into a NaN [`Evaluation`].
pub fn evaluate(expression: &str) -> Evaluation {
    parse(expression).into()
}

/// Evaluates `expression`, keeping the typed error.
pub fn parse(expression: &str) -> Result<f64, EvalError> {
    if expression.trim().is_empty() {
        return Err(EvalError::Empty);
    }

    let mut parser = Parser {
        input: expression,
        chars: expression.char_indices().peekable(),
        depth: 0,
    };
    let value = parser.expr()?;

    parser.skip_whitespace();
    if let Some((position, found)) = parser.chars.next() {
        return Err(EvalError::UnexpectedChar { found, position });
    }
    if value.is_nan() {
        return Err(EvalError::NotANumber);
    }
    Ok(value)
}

struct Parser<'a> {
    input: &'a str,
    chars: Peekable<CharIndices<'a>>,
    depth: usize,
}

impl Parser<'_> {
    fn expr(&mut self) -> Result<f64, EvalError> {
        let mut value = self.term()?;
        loop {
            match self.peek() {
                Some('+') => {
                    self.chars.next();
                    value += self.term()?;
                }
                Some('-') => {
                    self.chars.next();
                    value -= self.term()?;
                }
                _ => return Ok(value),
            }
        }
    }

    fn term(&mut self) -> Result<f64, EvalError> {
        let mut value = self.unary()?;
        loop {
            match self.peek() {
                Some('*') => {
                    self.chars.next();
                    value *= self.unary()?;
                }
                Some(op @ ('/' | '%')) => {
                    self.chars.next();
                    let rhs = self.unary()?;
                    if rhs == 0.0 {
                        return Err(EvalError::DivisionByZero);
                    }
                    value = if op == '/' { value / rhs } else { value % rhs };
                }
                _ => return Ok(value),
            }
        }
    }

    fn unary(&mut self) -> Result<f64, EvalError> {
        match self.peek() {
            Some('-') => {
                self.chars.next();
                Ok(-self.nested(Self::unary)?)
            }
            Some('+') => {
                self.chars.next();
                self.nested(Self::unary)
            }
            _ => self.nested(Self::power),
        }
    }

    fn power(&mut self) -> Result<f64, EvalError> {
        let base = self.primary()?;
        if self.peek() == Some('^') {
            self.chars.next();
            let exponent = self.unary()?;
            return Ok(base.powf(exponent));
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<f64, EvalError> {
        match self.peek() {
            None => Err(EvalError::UnexpectedEnd),
            Some('(') => {
                self.chars.next();
                let value = self.nested(Self::expr)?;
                self.expect(')')?;
                Ok(value)
            }
            Some(c) if c.is_ascii_digit() || c == '.' => self.number(),
            Some(c) if c.is_alphabetic() => {
                let name = self.identifier();
                self.identifier_value(name)
            }
            Some(found) => {
                let position = self.position();
                Err(EvalError::UnexpectedChar { found, position })
            }
        }
    }

    fn number(&mut self) -> Result<f64, EvalError> {
        let start = self.position();
        self.take_while(|c| c.is_ascii_digit() || c == '.');

        // Exponent only when digits follow it.
        let mut lookahead = self.chars.clone();
        if let Some((_, 'e' | 'E')) = lookahead.next() {
            let digit_follows = match lookahead.next() {
                Some((_, '+' | '-')) => lookahead.next().is_some_and(|(_, c)| c.is_ascii_digit()),
                Some((_, c)) => c.is_ascii_digit(),
                None => false,
            };
            if digit_follows {
                self.chars.next();
                if let Some('+' | '-') = self.peek_raw() {
                    self.chars.next();
                }
                self.take_while(|c| c.is_ascii_digit());
            }
        }

        let end = self.position();
        let literal = &self.input[start..end];
        literal
            .parse::<f64>()
            .map_err(|_| EvalError::InvalidNumber(literal.to_string()))
    }

    fn identifier(&mut self) -> String {
        let start = self.position();
        self.take_while(|c| c.is_alphanumeric() || c == '_');
        let end = self.position();
        self.input[start..end].to_lowercase()
    }

    fn identifier_value(&mut self, name: String) -> Result<f64, EvalError> {
        if self.peek() != Some('(') {
            return match name.as_str() {
                "pi" => Ok(consts::PI),
                "e" => Ok(consts::E),
                _ => Err(EvalError::UnknownIdentifier(name)),
            };
        }

        self.chars.next();
        let mut args = vec![self.expr()?];
        while self.peek() == Some(',') {
            self.chars.next();
            args.push(self.expr()?);
        }
        self.expect(')')?;

        apply(&name, &args)
    }

    /// Runs `descend` one level deeper, failing once [`MAX_DEPTH`] is reached.
    fn nested(
        &mut self,
        descend: impl FnOnce(&mut Self) -> Result<f64, EvalError>,
    ) -> Result<f64, EvalError> {
        if self.depth >= MAX_DEPTH {
            return Err(EvalError::TooDeep);
        }
        self.depth += 1;
        let value = descend(self);
        self.depth -= 1;
        value
    }

    fn expect(&mut self, expected: char) -> Result<(), EvalError> {
        match self.peek() {
            Some(c) if c == expected => {
                self.chars.next();
                Ok(())
            }
            Some(found) => {
                let position = self.position();
                Err(EvalError::UnexpectedChar { found, position })
            }
            None => Err(EvalError::UnexpectedEnd),
        }
    }

    fn take_while(&mut self, predicate: impl Fn(char) -> bool) {
        while self.chars.next_if(|&(_, c)| predicate(c)).is_some() {}
    }

    fn skip_whitespace(&mut self) {
        self.take_while(char::is_whitespace);
    }

    /// Next significant character.
    fn peek(&mut self) -> Option<char> {
        self.skip_whitespace();
        self.peek_raw()
    }

    fn peek_raw(&mut self) -> Option<char> {
        self.chars.peek().map(|&(_, c)| c)
    }

    fn position(&mut self) -> usize {
        self.chars.peek().map_or(self.input.len(), |&(i, _)| i)
    }
}

fn apply(name: &str, args: &[f64]) -> Result<f64, EvalError> {
    let unary: Option<fn(f64) -> f64> = match name {
        "sqrt" => Some(f64::sqrt),
        "abs" => Some(f64::abs),
        "sin" => Some(f64::sin),
        "cos" => Some(f64::cos),
        "tan" => Some(f64::tan),
        "asin" => Some(f64::asin),
        "acos" => Some(f64::acos),
        "atan" => Some(f64::atan),
        "ln" => Some(f64::ln),
        "log" => Some(f64::log10),
        "exp" => Some(f64::exp),
        "floor" => Some(f64::floor),
        "ceil" => Some(f64::ceil),
        "round" => Some(f64::round),
        _ => None,
    };

    let arity = |expected: usize| {
        if args.len() == expected {
            Ok(())
        } else {
            Err(EvalError::Arity {
                name: name.to_string(),
                expected,
                found: args.len(),
            })
        }
    };

    if let Some(f) = unary {
        arity(1)?;
        return Ok(f(args[0]));
    }

    match name {
        "min" => {
            arity(2)?;
            Ok(args[0].min(args[1]))
        }
        "max" => {
            arity(2)?;
            Ok(args[0].max(args[1]))
        }
        _ => Err(EvalError::UnknownIdentifier(name.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evaluates_operator_precedence() {
        let inputs = vec![
            ("2+2", 4.0),
            ("2 + 3 * 4", 14.0),
            ("(2 + 3) * 4", 20.0),
            ("10 - 4 - 3", 3.0),
            ("2 ^ 3 ^ 2", 512.0),
            ("-2^2", -4.0),
            ("7 % 4", 3.0),
            ("--3", 3.0),
            (" 1.5e2 / 3 ", 50.0),
        ];

        for (expression, expected) in inputs {
            assert_eq!(evaluate(expression), Evaluation::succeeded(expected));
        }
    }

    #[test]
    fn evaluates_functions_and_constants() {
        assert_eq!(parse("sqrt(16) + abs(-2)").unwrap(), 6.0);
        assert_eq!(parse("max(1, min(5, 3))").unwrap(), 3.0);
        assert_eq!(parse("cos(0)").unwrap(), 1.0);
        assert_eq!(parse("e").unwrap(), consts::E);
        assert!((parse("2*pi").unwrap() - consts::TAU).abs() < f64::EPSILON);
    }

    #[test]
    fn incomplete_expression_is_nan() {
        let evaluation = evaluate("2+");

        assert!(evaluation.value.is_nan());
        assert_eq!(evaluation.error, "unexpected end of expression");
    }

    #[test]
    fn failures_carry_diagnostics() {
        let inputs = vec![
            ("", EvalError::Empty),
            ("1/0", EvalError::DivisionByZero),
            ("foo", EvalError::UnknownIdentifier(String::from("foo"))),
            ("sqrt(-1)", EvalError::NotANumber),
            ("(1 + 2", EvalError::UnexpectedEnd),
            (
                "1 2",
                EvalError::UnexpectedChar {
                    found: '2',
                    position: 2,
                },
            ),
            (
                "1..2",
                EvalError::InvalidNumber(String::from("1..2")),
            ),
            (
                "min(1)",
                EvalError::Arity {
                    name: String::from("min"),
                    expected: 2,
                    found: 1,
                },
            ),
        ];

        for (expression, expected) in inputs {
            assert_eq!(parse(expression), Err(expected.clone()));

            let evaluation = evaluate(expression);
            assert!(evaluation.value.is_nan());
            assert_eq!(evaluation.error, expected.to_string());
        }
    }

    #[test]
    fn deep_nesting_is_rejected() {
        let signs = format!("{}1", "-".repeat(60_000));
        let groups = "(".repeat(60_000);

        for expression in [signs.as_str(), groups.as_str()] {
            assert_eq!(parse(expression), Err(EvalError::TooDeep));
            assert_eq!(evaluate(expression).error, "expression nested too deeply");
        }
    }

    #[test]
    fn moderate_nesting_is_accepted() {
        let groups = format!("{}1{}", "(".repeat(100), ")".repeat(100));
        let signs = format!("{}1", "-".repeat(200));

        assert_eq!(parse(&groups).unwrap(), 1.0);
        assert_eq!(parse(&signs).unwrap(), 1.0);
    }
}

//! Calculator tool — evaluates mathematical expressions.
//!
//! Supports `+`, `-`, `*`, `/`, `^` (power), parentheses, unary negation,
//! and the functions `sqrt(x)` and `abs(x)`. Uses a recursive-descent
//! parser for correctness. No dependencies beyond std.

use async_trait::async_trait;

use agentry_core::error::{ErrorCode, ValidationError};
use agentry_core::tool::{
    Example, ExecutionContext, InputMap, Parameter, ParameterType, Tool, ToolResult, ToolSchema,
};

use crate::validate::validate_input;

pub struct CalculatorTool;

#[async_trait]
impl Tool for CalculatorTool {
    fn name(&self) -> &str {
        "calculator"
    }

    fn schema(&self) -> ToolSchema {
        ToolSchema::new(
            "calculator",
            "Performs basic arithmetic calculations and mathematical operations",
        )
        .with_parameter(
            Parameter::required(
                "expression",
                ParameterType::String,
                "Mathematical expression to evaluate (supports +, -, *, /, ^, sqrt, abs)",
            )
            .with_pattern(r"^[0-9+\-*/().\s^%a-z,]+$"),
        )
        .with_example(Example {
            description: "Simple arithmetic".into(),
            input: serde_json::json!({"expression": "2 + 3 * 4"})
                .as_object()
                .cloned()
                .unwrap_or_default(),
            output: serde_json::json!({"result": 14.0, "expression": "2 + 3 * 4"}),
        })
        .with_example(Example {
            description: "Square root calculation".into(),
            input: serde_json::json!({"expression": "sqrt(16)"})
                .as_object()
                .cloned()
                .unwrap_or_default(),
            output: serde_json::json!({"result": 4.0, "expression": "sqrt(16)"}),
        })
    }

    fn validate(&self, input: &InputMap) -> Result<(), ValidationError> {
        validate_input(&self.schema(), input)
    }

    async fn execute(&self, _ctx: ExecutionContext, input: InputMap) -> ToolResult {
        let expression = input
            .get("expression")
            .and_then(|v| v.as_str())
            .unwrap_or_default();

        match evaluate(expression) {
            Ok(value) => ToolResult::ok(serde_json::json!({
                "result": value,
                "expression": expression,
            })),
            Err(e) => ToolResult::error(
                ErrorCode::ExecutionError,
                format!("failed to evaluate expression: {e}"),
            ),
        }
    }
}

// ── Recursive-descent expression evaluator ────────────────────────────────

/// Evaluate a mathematical expression string.
pub fn evaluate(expr: &str) -> Result<f64, String> {
    let tokens = tokenize(expr)?;
    let mut parser = Parser::new(&tokens);
    let result = parser.parse_expr()?;
    if parser.pos < parser.tokens.len() {
        return Err(format!(
            "unexpected token at position {}: {:?}",
            parser.pos, parser.tokens[parser.pos]
        ));
    }
    Ok(result)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '+' => { tokens.push(Token::Plus); i += 1; }
            '-' => { tokens.push(Token::Minus); i += 1; }
            '*' => { tokens.push(Token::Star); i += 1; }
            '/' => { tokens.push(Token::Slash); i += 1; }
            '^' => { tokens.push(Token::Caret); i += 1; }
            '(' => { tokens.push(Token::LParen); i += 1; }
            ')' => { tokens.push(Token::RParen); i += 1; }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let num_str: String = chars[start..i].iter().collect();
                let num: f64 = num_str
                    .parse()
                    .map_err(|_| format!("invalid number: {num_str}"))?;
                tokens.push(Token::Number(num));
            }
            c if c.is_ascii_lowercase() => {
                let start = i;
                while i < chars.len() && chars[i].is_ascii_lowercase() {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            c => return Err(format!("unexpected character: '{c}'")),
        }
    }

    Ok(tokens)
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a [Token]) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn consume(&mut self) -> Option<&Token> {
        let tok = self.tokens.get(self.pos);
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    // expr = term (('+' | '-') term)*
    fn parse_expr(&mut self) -> Result<f64, String> {
        let mut left = self.parse_term()?;
        while let Some(op) = self.peek() {
            match op {
                Token::Plus => {
                    self.consume();
                    left += self.parse_term()?;
                }
                Token::Minus => {
                    self.consume();
                    left -= self.parse_term()?;
                }
                _ => break,
            }
        }
        Ok(left)
    }

    // term = power (('*' | '/') power)*
    fn parse_term(&mut self) -> Result<f64, String> {
        let mut left = self.parse_power()?;
        while let Some(op) = self.peek() {
            match op {
                Token::Star => {
                    self.consume();
                    left *= self.parse_power()?;
                }
                Token::Slash => {
                    self.consume();
                    let right = self.parse_power()?;
                    if right == 0.0 {
                        return Err("division by zero".into());
                    }
                    left /= right;
                }
                _ => break,
            }
        }
        Ok(left)
    }

    // power = unary ('^' power)?   — right-associative
    fn parse_power(&mut self) -> Result<f64, String> {
        let base = self.parse_unary()?;
        if let Some(Token::Caret) = self.peek() {
            self.consume();
            let exp = self.parse_power()?;
            return Ok(base.powf(exp));
        }
        Ok(base)
    }

    // unary = '-' unary | primary
    fn parse_unary(&mut self) -> Result<f64, String> {
        if let Some(Token::Minus) = self.peek() {
            self.consume();
            let val = self.parse_unary()?;
            return Ok(-val);
        }
        self.parse_primary()
    }

    // primary = NUMBER | IDENT '(' expr ')' | '(' expr ')'
    fn parse_primary(&mut self) -> Result<f64, String> {
        match self.consume().cloned() {
            Some(Token::Number(n)) => Ok(n),
            Some(Token::Ident(name)) => {
                match self.consume() {
                    Some(Token::LParen) => {}
                    _ => return Err(format!("expected '(' after function '{name}'")),
                }
                let arg = self.parse_expr()?;
                match self.consume() {
                    Some(Token::RParen) => {}
                    _ => return Err("expected closing parenthesis".into()),
                }
                match name.as_str() {
                    "sqrt" => {
                        if arg < 0.0 {
                            return Err("square root of negative number".into());
                        }
                        Ok(arg.sqrt())
                    }
                    "abs" => Ok(arg.abs()),
                    other => Err(format!("unknown function: {other}")),
                }
            }
            Some(Token::LParen) => {
                let val = self.parse_expr()?;
                match self.consume() {
                    Some(Token::RParen) => Ok(val),
                    _ => Err("expected closing parenthesis".into()),
                }
            }
            Some(tok) => Err(format!("unexpected token: {tok:?}")),
            None => Err("unexpected end of expression".into()),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────

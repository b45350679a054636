//! Formula Parser
//!
//! Parses arithmetic formula strings into [`Expr`] trees.
//!
//! # Supported Syntax
//!
//! ```text
//! expression := term (("+" | "-") term)*
//! term       := factor (("*" | "/") factor)*
//! factor     := number | variable | "(" expression ")" | "-" factor
//! variable   := [A-Za-z_][A-Za-z0-9_]*
//! ```
//!
//! Operators are left-associative with the usual precedence. There are no
//! function calls and no member access; an identifier is always a variable.

use nom::{
    branch::alt,
    bytes::complete::{take_while, take_while1},
    character::complete::{char, digit1, multispace0},
    combinator::{map, map_res, opt, recognize, value},
    multi::many0,
    sequence::{delimited, pair, preceded},
    IResult,
};

use crate::expr::{BinaryOp, Expr, ExprError};

/// Parse a complete formula string
pub fn parse(input: &str) -> Result<Expr, ExprError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(ExprError::Parse("empty expression".to_string()));
    }

    match parse_expression(input) {
        Ok((remaining, expr)) => {
            if remaining.trim().is_empty() {
                Ok(expr)
            } else {
                Err(ExprError::Parse(format!(
                    "unexpected input after expression: '{}'",
                    remaining.trim()
                )))
            }
        }
        Err(e) => Err(ExprError::Parse(format!("{:?}", e))),
    }
}

/// Parse the additive level (lowest precedence)
fn parse_expression(input: &str) -> IResult<&str, Expr> {
    let (input, first) = parse_term(input)?;
    let (input, rest) = many0(pair(parse_add_op, parse_term))(input)?;
    Ok((input, fold_binary(first, rest)))
}

/// Parse the multiplicative level
fn parse_term(input: &str) -> IResult<&str, Expr> {
    let (input, first) = parse_factor(input)?;
    let (input, rest) = many0(pair(parse_mul_op, parse_factor))(input)?;
    Ok((input, fold_binary(first, rest)))
}

/// Parse a single operand
fn parse_factor(input: &str) -> IResult<&str, Expr> {
    delimited(
        multispace0,
        alt((
            parse_number,
            parse_variable,
            parse_parenthesized,
            parse_negation,
        )),
        multispace0,
    )(input)
}

/// Left-fold a chain of same-precedence operations
fn fold_binary(first: Expr, rest: Vec<(BinaryOp, Expr)>) -> Expr {
    rest.into_iter().fold(first, |lhs, (op, rhs)| Expr::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    })
}

fn parse_add_op(input: &str) -> IResult<&str, BinaryOp> {
    delimited(
        multispace0,
        alt((
            value(BinaryOp::Add, char('+')),
            value(BinaryOp::Sub, char('-')),
        )),
        multispace0,
    )(input)
}

fn parse_mul_op(input: &str) -> IResult<&str, BinaryOp> {
    delimited(
        multispace0,
        alt((
            value(BinaryOp::Mul, char('*')),
            value(BinaryOp::Div, char('/')),
        )),
        multispace0,
    )(input)
}

/// Parse a numeric literal like "3" or "2.5"
fn parse_number(input: &str) -> IResult<&str, Expr> {
    map_res(
        recognize(pair(digit1, opt(pair(char('.'), digit1)))),
        |s: &str| s.parse::<f64>().map(Expr::Number),
    )(input)
}

/// Parse a variable name (target refId)
fn parse_variable(input: &str) -> IResult<&str, Expr> {
    map(
        recognize(pair(
            take_while1(|c: char| c.is_ascii_alphabetic() || c == '_'),
            take_while(|c: char| c.is_ascii_alphanumeric() || c == '_'),
        )),
        |s: &str| Expr::Variable(s.to_string()),
    )(input)
}

/// Parse a parenthesized sub-expression
fn parse_parenthesized(input: &str) -> IResult<&str, Expr> {
    delimited(char('('), parse_expression, char(')'))(input)
}

/// Parse a unary negation
fn parse_negation(input: &str) -> IResult<&str, Expr> {
    map(preceded(char('-'), parse_factor), |inner| {
        Expr::Neg(Box::new(inner))
    })(input)
}

//! Arithmetic Expression Evaluator
//!
//! Compiles and evaluates caller-supplied formulas over named series values,
//! one instant at a time. The grammar is deliberately closed: numbers, named
//! variables (target refIds), `+ - * /`, and parentheses. Identifiers resolve
//! only against the variable table supplied at evaluation time, so a formula
//! can never reach anything outside its inputs.
//!
//! # Examples
//!
//! ```rust
//! use metaquery::expr::Expression;
//! use std::collections::HashMap;
//!
//! let expr = Expression::parse("(A - B) / 2").unwrap();
//!
//! let mut vars = HashMap::new();
//! vars.insert("A".to_string(), 10.0);
//! vars.insert("B".to_string(), 4.0);
//!
//! assert_eq!(expr.eval(&vars).unwrap(), 3.0);
//! ```

mod parser;

use std::collections::HashMap;
use thiserror::Error;

/// Errors raised while compiling or evaluating a formula
#[derive(Debug, Clone, Error)]
pub enum ExprError {
    /// Formula text did not match the grammar
    #[error("parse error: {0}")]
    Parse(String),

    /// Formula referenced a variable missing from the value table
    #[error("unknown variable: {0}")]
    UnknownVariable(String),

    /// Right-hand side of a division evaluated to zero
    #[error("division by zero")]
    DivisionByZero,

    /// Evaluation produced an infinite or NaN result
    #[error("expression result is not finite")]
    NonFinite,
}

/// Result type for expression operations
pub type ExprResult<T> = Result<T, ExprError>;

/// Binary arithmetic operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

/// Parsed formula node
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Numeric literal
    Number(f64),
    /// Named variable, bound at evaluation time
    Variable(String),
    /// Unary negation
    Neg(Box<Expr>),
    /// Binary operation
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

/// A compiled formula, parsed once and evaluated per timestamp
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    root: Expr,
}

impl Expression {
    /// Compile a formula string
    pub fn parse(input: &str) -> ExprResult<Self> {
        let root = parser::parse(input)?;
        Ok(Self { root })
    }

    /// Evaluate against a variable table for one instant
    pub fn eval(&self, vars: &HashMap<String, f64>) -> ExprResult<f64> {
        let value = eval_node(&self.root, vars)?;
        if value.is_finite() {
            Ok(value)
        } else {
            Err(ExprError::NonFinite)
        }
    }

    /// Names of all variables the formula references
    pub fn variables(&self) -> Vec<&str> {
        let mut names = Vec::new();
        collect_variables(&self.root, &mut names);
        names
    }
}

fn eval_node(expr: &Expr, vars: &HashMap<String, f64>) -> ExprResult<f64> {
    match expr {
        Expr::Number(n) => Ok(*n),
        Expr::Variable(name) => vars
            .get(name)
            .copied()
            .ok_or_else(|| ExprError::UnknownVariable(name.clone())),
        Expr::Neg(inner) => Ok(-eval_node(inner, vars)?),
        Expr::Binary { op, lhs, rhs } => {
            let left = eval_node(lhs, vars)?;
            let right = eval_node(rhs, vars)?;
            match op {
                BinaryOp::Add => Ok(left + right),
                BinaryOp::Sub => Ok(left - right),
                BinaryOp::Mul => Ok(left * right),
                BinaryOp::Div => {
                    if right == 0.0 {
                        Err(ExprError::DivisionByZero)
                    } else {
                        Ok(left / right)
                    }
                }
            }
        }
    }
}

fn collect_variables<'a>(expr: &'a Expr, names: &mut Vec<&'a str>) {
    match expr {
        Expr::Number(_) => {}
        Expr::Variable(name) => {
            if !names.contains(&name.as_str()) {
                names.push(name);
            }
        }
        Expr::Neg(inner) => collect_variables(inner, names),
        Expr::Binary { lhs, rhs, .. } => {
            collect_variables(lhs, names);
            collect_variables(rhs, names);
        }
    }
}

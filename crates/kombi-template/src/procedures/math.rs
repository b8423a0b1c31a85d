//! Numeric procedures.

use super::Procedure;
use crate::error::{Result, TemplateError};
use crate::template::format_number;

pub(super) fn procedures() -> Vec<Procedure> {
    vec![
        binary("sum", |a, b| Ok(a + b)),
        binary("sub", |a, b| Ok(a - b)),
        binary("mult", |a, b| Ok(a * b)),
        binary("div", |a, b| {
            if b == 0.0 {
                Err(TemplateError::procedure("div", "division by zero"))
            } else {
                Ok(a / b)
            }
        }),
        binary("min", |a, b| Ok(a.min(b))),
        binary("max", |a, b| Ok(a.max(b))),
        Procedure::new("pad", 2, Some(2), |args| {
            let width: usize = args[1].trim().parse().map_err(|_| {
                TemplateError::procedure("pad", format!("invalid width: {}", args[1]))
            })?;
            Ok(pad(args[0].trim(), width))
        }),
    ]
}

fn binary<F>(name: &'static str, op: F) -> Procedure
where
    F: Fn(f64, f64) -> Result<f64> + Send + Sync + 'static,
{
    Procedure::new(name, 2, Some(2), move |args| {
        let a = number(name, &args[0])?;
        let b = number(name, &args[1])?;
        op(a, b).map(format_number)
    })
}

fn number(name: &str, text: &str) -> Result<f64> {
    text.trim()
        .parse()
        .map_err(|_| TemplateError::procedure(name, format!("not a number: {text:?}")))
}

/// Left-pad with zeros, keeping a leading minus sign in front.
fn pad(value: &str, width: usize) -> String {
    match value.strip_prefix('-') {
        Some(rest) => format!("-{:0>width$}", rest, width = width.saturating_sub(1)),
        None => format!("{value:0>width$}"),
    }
}

// SPDX-FileCopyrightText: 2026 Velocity Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A compiler stand-in strict enough to catch broken rewrites.

use std::sync::Arc;

use velocity_core::{ModuleFactory, ModuleId, RebindCompiler, SourceCompiler, VelocityError};

/// Accepts source whose brackets balance outside string literals, then
/// rebinds the raw factory like the default compiler.
#[derive(Debug, Clone, Copy, Default)]
pub struct BracketCompiler;

fn check_brackets(source: &str) -> Result<(), String> {
    let mut stack = Vec::new();
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (offset, c) in source.char_indices() {
        if let Some(q) = quote {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                _ if c == q => quote = None,
                _ => {}
            }
            continue;
        }
        match c {
            '"' | '\'' | '`' => quote = Some(c),
            '(' | '[' | '{' => stack.push(c),
            ')' | ']' | '}' => {
                let open = match c {
                    ')' => '(',
                    ']' => '[',
                    _ => '{',
                };
                if stack.pop() != Some(open) {
                    return Err(format!("unexpected '{c}' at offset {offset}"));
                }
            }
            _ => {}
        }
    }
    if let Some(q) = quote {
        return Err(format!("unterminated string starting with {q}"));
    }
    match stack.last() {
        Some(open) => Err(format!("unclosed '{open}'")),
        None => Ok(()),
    }
}

impl SourceCompiler for BracketCompiler {
    fn validate(&self, source: &str) -> Result<(), VelocityError> {
        check_brackets(source).map_err(|message| VelocityError::Internal(format!("syntax error: {message}")))
    }

    fn compile(
        &self,
        id: &ModuleId,
        source: Arc<str>,
        raw: &ModuleFactory,
    ) -> Result<ModuleFactory, VelocityError> {
        check_brackets(&source).map_err(|message| VelocityError::ModuleExecution {
            id: id.clone(),
            message: format!("syntax error: {message}"),
        })?;
        RebindCompiler.compile(id, source, raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balanced_source_passes() {
        assert!(BracketCompiler.validate(r#"function(e){return[e,"(",')']}"#).is_ok());
    }

    #[test]
    fn unbalanced_source_fails() {
        assert!(BracketCompiler.validate("function(e){return[e}").is_err());
        assert!(BracketCompiler.validate("children:[INJECTED,").is_err());
        assert!(BracketCompiler.validate(r#"x("abc)"#).is_err());
    }

    #[test]
    fn compile_reports_the_module() {
        let raw = ModuleFactory::exporting(velocity_core::ExportValue::Undefined);
        let err = BracketCompiler
            .compile(&ModuleId::Numeric(9), Arc::from("{"), &raw)
            .unwrap_err();
        assert!(err.to_string().contains('9'));
    }
}

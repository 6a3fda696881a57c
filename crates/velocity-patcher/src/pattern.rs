// SPDX-FileCopyrightText: 2026 Velocity Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Patch match patterns.
//!
//! Patterns are written against minified host source, where identifiers are
//! renamed on every release. `\i` stands for "any minified identifier" and is
//! expanded before compilation. Patterns may be given raw (`foo\(\)`) or in
//! literal form with flags (`/foo\(\)/g`).
//!
//! The patch corpus relies on lookbehind and lookahead, so patterns compile
//! with `fancy-regex` rather than the linear-time `regex` engine.

use std::fmt;

use fancy_regex::Regex;
use velocity_core::VelocityError;

/// Expansion of `\i`: a minified JavaScript identifier.
pub const IDENTIFIER_CLASS: &str = r"(?:[A-Za-z_$][\w$]*)";

/// Flags accepted in literal form.
const LITERAL_FLAGS: &str = "gimsuy";

/// Replace every unescaped `\i` with [`IDENTIFIER_CLASS`].
///
/// An escaped backslash followed by `i` (`\\i`) is a literal backslash and
/// an `i`, and is left alone.
pub fn canonicalize(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    let mut chars = pattern.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('i') => out.push_str(IDENTIFIER_CLASS),
            Some(next) => {
                out.push('\\');
                out.push(next);
            }
            None => out.push('\\'),
        }
    }

    out
}

/// A compiled patch pattern.
#[derive(Clone)]
pub struct PatchPattern {
    written: String,
    regex: Regex,
    global: bool,
}

impl PatchPattern {
    /// Compile a raw pattern.
    pub fn new(pattern: &str, global: bool) -> Result<Self, VelocityError> {
        Self::build(pattern, pattern, "", global)
    }

    /// Compile a pattern written either raw or as `/body/flags`.
    ///
    /// `g` makes the pattern replace every match; `i`, `m` and `s` map to the
    /// inline flags of the same name. `u` and `y` are accepted and ignored.
    pub fn parse(written: &str) -> Result<Self, VelocityError> {
        match split_literal(written) {
            Some((body, flags)) => {
                let global = flags.contains('g');
                let inline: String = flags.chars().filter(|f| "ims".contains(*f)).collect();
                Self::build(written, body, &inline, global)
            }
            None => Self::build(written, written, "", false),
        }
    }

    fn build(written: &str, body: &str, inline: &str, global: bool) -> Result<Self, VelocityError> {
        let mut source = String::new();
        if !inline.is_empty() {
            source.push_str("(?");
            source.push_str(inline);
            source.push(')');
        }
        source.push_str(&canonicalize(body));

        let regex = Regex::new(&source).map_err(|e| VelocityError::InvalidPattern {
            pattern: written.to_string(),
            message: e.to_string(),
        })?;

        Ok(Self {
            written: written.to_string(),
            regex,
            global,
        })
    }

    /// The pattern as the plugin author wrote it.
    pub fn as_written(&self) -> &str {
        &self.written
    }

    /// The compiled (canonicalized) expression.
    pub fn regex(&self) -> &Regex {
        &self.regex
    }

    pub fn is_global(&self) -> bool {
        self.global
    }
}

impl fmt::Debug for PatchPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PatchPattern")
            .field("written", &self.written)
            .field("global", &self.global)
            .finish()
    }
}

/// Split `/body/flags` into its parts, if `written` is in literal form.
fn split_literal(written: &str) -> Option<(&str, &str)> {
    let rest = written.strip_prefix('/')?;
    let close = rest.rfind('/')?;
    let (body, flags) = (&rest[..close], &rest[close + 1..]);
    if body.is_empty() || !flags.chars().all(|f| LITERAL_FLAGS.contains(f)) {
        return None;
    }
    Some((body, flags))
}

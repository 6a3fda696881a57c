// SPDX-FileCopyrightText: 2026 Velocity Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Replacement templates.
//!
//! Replacement text follows JavaScript `String.prototype.replace` rules,
//! since that is how patch authors write them: `$&` is the whole match,
//! `$1`..`$99` are groups, `` $` `` and `$'` are the text before and after
//! the match, and `$$` is a literal dollar sign.

use fancy_regex::Captures;

/// Placeholder for the owning plugin's runtime reference.
pub const SELF_TOKEN: &str = "$self";

/// Captured groups of one match, handed to function replacements.
#[derive(Debug, Clone)]
pub struct MatchGroups<'t> {
    groups: Vec<Option<&'t str>>,
    start: usize,
    end: usize,
    haystack: &'t str,
}

impl<'t> MatchGroups<'t> {
    pub(crate) fn from_captures(caps: &Captures<'t>, haystack: &'t str) -> Option<Self> {
        let whole = caps.get(0)?;
        let groups = (0..caps.len()).map(|i| caps.get(i).map(|m| m.as_str())).collect();
        Some(Self {
            groups,
            start: whole.start(),
            end: whole.end(),
            haystack,
        })
    }

    /// The whole match.
    pub fn whole(&self) -> &'t str {
        &self.haystack[self.start..self.end]
    }

    /// Group `index`; 0 is the whole match. Unmatched groups are `None`.
    pub fn get(&self, index: usize) -> Option<&'t str> {
        self.groups.get(index).copied().flatten()
    }

    /// Group `index`, or the empty string when it did not participate.
    pub fn group(&self, index: usize) -> &'t str {
        self.get(index).unwrap_or("")
    }

    /// Number of capture groups, excluding the whole match.
    pub fn len(&self) -> usize {
        self.groups.len().saturating_sub(1)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn before(&self) -> &'t str {
        &self.haystack[..self.start]
    }

    pub fn after(&self) -> &'t str {
        &self.haystack[self.end..]
    }
}

/// Expand a replacement template against one match.
pub fn expand(template: &str, groups: &MatchGroups<'_>) -> String {
    let bytes = template.as_bytes();
    let mut out = String::with_capacity(template.len());
    let mut i = 0;
    let mut literal_start = 0;

    while i < bytes.len() {
        if bytes[i] != b'$' || i + 1 >= bytes.len() {
            i += 1;
            continue;
        }

        let (expansion, consumed): (Option<&str>, usize) = match bytes[i + 1] {
            b'$' => (Some("$"), 2),
            b'&' => (Some(groups.whole()), 2),
            b'`' => (Some(groups.before()), 2),
            b'\'' => (Some(groups.after()), 2),
            b'0'..=b'9' => match group_reference(bytes, i + 1, groups.len()) {
                Some((index, width)) => (Some(groups.group(index)), 1 + width),
                None => (None, 1),
            },
            _ => (None, 1),
        };

        match expansion {
            Some(text) => {
                out.push_str(&template[literal_start..i]);
                out.push_str(text);
                i += consumed;
                literal_start = i;
            }
            None => i += consumed,
        }
    }

    out.push_str(&template[literal_start..]);
    out
}

/// Parse `$n` / `$nn` at `at`. Two digits win when that group exists.
fn group_reference(bytes: &[u8], at: usize, group_count: usize) -> Option<(usize, usize)> {
    let first = usize::from(bytes[at] - b'0');
    if let Some(second) = bytes.get(at + 1).filter(|b| b.is_ascii_digit()) {
        let two = first * 10 + usize::from(second - b'0');
        if two >= 1 && two <= group_count {
            return Some((two, 2));
        }
    }
    (first >= 1 && first <= group_count).then_some((first, 1))
}

/// The runtime reference expression `$self` expands to.
pub fn self_reference(plugin: &str) -> String {
    format!("Velocity.Plugins.plugins[{}]", serde_json::Value::from(plugin))
}

// SPDX-FileCopyrightText: 2026 Velocity Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Structural signatures that identify a module without knowing its id.
//!
//! Host modules are minified and their ids change between builds, so lookups
//! describe what a module contains instead: substrings of its source, the
//! names of the properties it exports, the text of the component it renders,
//! or the display name of the store it constructs.

use std::fmt;

use regex::Regex;
use tracing::trace;
use velocity_core::{Cardinality, ExportValue, HostObject, MatchKind, VelocityError};

/// One piece of evidence for code-based filters.
#[derive(Debug, Clone)]
pub enum Token {
    /// A plain substring.
    Literal(String),
    /// A regular expression tested anywhere in the text.
    Pattern(Regex),
}

impl Token {
    pub fn literal(text: impl Into<String>) -> Self {
        Token::Literal(text.into())
    }

    /// Compile a regex token.
    pub fn pattern(pattern: &str) -> Result<Self, VelocityError> {
        Regex::new(pattern)
            .map(Token::Pattern)
            .map_err(|e| VelocityError::InvalidPattern {
                pattern: pattern.to_string(),
                message: e.to_string(),
            })
    }

    pub fn is_in(&self, text: &str) -> bool {
        match self {
            Token::Literal(s) => text.contains(s.as_str()),
            Token::Pattern(re) => re.is_match(text),
        }
    }
}

impl From<&str> for Token {
    fn from(text: &str) -> Self {
        Token::Literal(text.to_string())
    }
}

impl From<String> for Token {
    fn from(text: String) -> Self {
        Token::Literal(text)
    }
}

impl From<Regex> for Token {
    fn from(re: Regex) -> Self {
        Token::Pattern(re)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Literal(s) => write!(f, "{s:?}"),
            Token::Pattern(re) => write!(f, "/{}/", re.as_str()),
        }
    }
}

/// A structural predicate over a module.
///
/// Evaluation is total: values of the wrong shape simply do not match.
#[derive(Debug, Clone)]
pub enum Filter {
    /// Every token occurs in the module's unexecuted source.
    Code(Vec<Token>),
    /// The export, or one of its members, has every named property.
    Props(Vec<String>),
    /// The export, or one of its members, is a component whose render
    /// function contains every token.
    ComponentCode(Vec<Token>),
    /// The export, or one of its members, is a store whose constructor
    /// display name is exactly this.
    StoreName(String),
}

impl Filter {
    pub fn by_code<I, T>(tokens: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Token>,
    {
        Filter::Code(tokens.into_iter().map(Into::into).collect())
    }

    pub fn by_props<I, S>(props: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Filter::Props(props.into_iter().map(Into::into).collect())
    }

    pub fn component_by_code<I, T>(tokens: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Token>,
    {
        Filter::ComponentCode(tokens.into_iter().map(Into::into).collect())
    }

    pub fn by_store_name(name: impl Into<String>) -> Self {
        Filter::StoreName(name.into())
    }

    pub fn kind(&self) -> MatchKind {
        match self {
            Filter::Code(_) => MatchKind::Code,
            Filter::Props(_) => MatchKind::Props,
            Filter::ComponentCode(_) => MatchKind::ComponentCode,
            Filter::StoreName(_) => MatchKind::StoreName,
        }
    }

    /// True when the filter has nothing to match on.
    ///
    /// An empty token list would match every module, which is never what a
    /// caller wants.
    pub fn is_empty(&self) -> bool {
        match self {
            Filter::Code(t) | Filter::ComponentCode(t) => t.is_empty(),
            Filter::Props(p) => p.is_empty(),
            Filter::StoreName(n) => n.is_empty(),
        }
    }

    /// Test a module's raw source. Only code filters look at source.
    pub fn matches_source(&self, source: &str) -> bool {
        match self {
            Filter::Code(tokens) => !tokens.is_empty() && tokens.iter().all(|t| t.is_in(source)),
            _ => false,
        }
    }

    /// Test a single export value. Code filters never match values.
    pub fn matches_value(&self, value: &ExportValue) -> bool {
        match self {
            Filter::Code(_) => false,
            Filter::Props(props) => match value {
                ExportValue::Object(obj) => {
                    !props.is_empty() && props.iter().all(|p| obj.has(p))
                }
                _ => false,
            },
            Filter::ComponentCode(tokens) => {
                !tokens.is_empty() && component_matches(tokens, value)
            }
            Filter::StoreName(name) => value
                .as_object()
                .and_then(HostObject::display_name)
                .is_some_and(|n| n == name),
        }
    }

    /// Select the value a lookup resolves to for one executed module.
    ///
    /// Code filters resolve to the whole export object. The others check the
    /// export itself first and then each named member in key order.
    pub fn select(&self, source: &str, exports: &ExportValue) -> Option<ExportValue> {
        if exports.is_undefined() {
            trace!(filter = %self, "skipping module without exports");
            return None;
        }

        if let Filter::Code(_) = self {
            return self.matches_source(source).then(|| exports.clone());
        }

        if self.matches_value(exports) {
            return Some(exports.clone());
        }

        let obj = exports.as_object()?;
        obj.members()
            .find(|(_, member)| self.matches_value(member))
            .map(|(_, member)| member.clone())
    }
}

/// Components come either as bare render functions or wrapped in a
/// `$$typeof` object (memo, forwardRef) that holds the render function under
/// `type`, `type.render`, or `render`.
fn component_matches(tokens: &[Token], value: &ExportValue) -> bool {
    let render_matches = |v: &ExportValue| {
        v.as_function()
            .is_some_and(|f| tokens.iter().all(|t| t.is_in(f.source())))
    };

    match value {
        ExportValue::Function(_) => render_matches(value),
        ExportValue::Object(obj) if obj.has("$$typeof") => {
            if let Some(inner) = obj.get("type") {
                if let Some(render) = inner.get("render") {
                    return render_matches(render);
                }
                return render_matches(inner);
            }
            obj.get("render").is_some_and(render_matches)
        }
        _ => false,
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join<T: fmt::Display>(items: &[T]) -> String {
            items
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        }

        match self {
            Filter::Code(tokens) => write!(f, "byCode({})", join(tokens)),
            Filter::Props(props) => {
                let quoted: Vec<String> = props.iter().map(|p| format!("{p:?}")).collect();
                write!(f, "byProps({})", quoted.join(", "))
            }
            Filter::ComponentCode(tokens) => write!(f, "componentByCode({})", join(tokens)),
            Filter::StoreName(name) => write!(f, "byStoreName({name:?})"),
        }
    }
}

/// A filter together with how many matches the caller expects.
#[derive(Debug, Clone)]
pub struct MatchRequest {
    pub filter: Filter,
    pub cardinality: Cardinality,
}

impl MatchRequest {
    pub fn new(filter: Filter, cardinality: Cardinality) -> Self {
        Self { filter, cardinality }
    }

    pub fn one(filter: Filter) -> Self {
        Self::new(filter, Cardinality::One)
    }

    pub fn any(filter: Filter) -> Self {
        Self::new(filter, Cardinality::Any)
    }

    pub fn all(filter: Filter) -> Self {
        Self::new(filter, Cardinality::All)
    }

    pub fn kind(&self) -> MatchKind {
        self.filter.kind()
    }
}

impl fmt::Display for MatchRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.filter, self.cardinality)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use velocity_core::HostFunction;

    fn noop(source: &str) -> ExportValue {
        HostFunction::returning(source, ExportValue::Undefined).into()
    }

    fn user_utils() -> ExportValue {
        HostObject::builder()
            .member("getUser", noop("function(e){return n.get(e)}"))
            .member("getAvatarURL", noop("function(e){return e.avatar}"))
            .build()
            .into()
    }

    #[test]
    fn code_filter_requires_every_token() {
        let filter = Filter::by_code(["getAvatarURL", ".avatar"]);
        assert!(filter.matches_source("e.getAvatarURL=function(t){return t.avatar}"));
        assert!(!filter.matches_source("e.getAvatarURL=function(t){return null}"));
    }

    #[test]
    fn regex_tokens_match_anywhere() {
        let filter = Filter::by_code([Token::pattern(r"\.USER_PROFILE_\w+").unwrap()]);
        assert!(filter.matches_source("x(n.USER_PROFILE_MODAL)"));
        assert!(!filter.matches_source("x(n.USER_MODAL)"));
    }

    #[test]
    fn code_filter_resolves_to_whole_exports() {
        let exports = user_utils();
        let selected = Filter::by_code(["getAvatarURL"])
            .select("getAvatarURL", &exports)
            .unwrap();
        assert!(selected.same_value(&exports));
    }

    #[test]
    fn props_filter_checks_exports_then_members() {
        let direct = user_utils();
        let filter = Filter::by_props(["getUser", "getAvatarURL"]);
        assert!(filter.select("", &direct).unwrap().same_value(&direct));

        let wrapped: ExportValue = HostObject::builder()
            .member("Z", direct.clone())
            .build()
            .into();
        assert!(filter.select("", &wrapped).unwrap().same_value(&direct));

        assert!(Filter::by_props(["getUser", "missing"]).select("", &wrapped).is_none());
    }

    #[test]
    fn undefined_exports_never_match() {
        assert!(Filter::by_code(["x"]).select("x", &ExportValue::Undefined).is_none());
        assert!(Filter::by_props(["x"]).select("", &ExportValue::Undefined).is_none());
    }

    #[test]
    fn empty_filters_match_nothing() {
        let empty: [&str; 0] = [];
        assert!(Filter::by_code(empty).is_empty());
        assert!(!Filter::by_code(empty).matches_source("anything"));
        assert!(!Filter::by_props(empty).matches_value(&user_utils()));
    }

    #[test]
    fn component_filter_sees_through_wrappers() {
        let render = noop("function(e){return jsx(\"div\",{className:\"avatarDecoration\"})}");
        let memo: ExportValue = HostObject::builder()
            .member("$$typeof", "react.memo")
            .member("type", render.clone())
            .build()
            .into();
        let forward_ref: ExportValue = HostObject::builder()
            .member("$$typeof", "react.forward_ref")
            .member("render", render.clone())
            .build()
            .into();
        let memo_forward: ExportValue = HostObject::builder()
            .member("$$typeof", "react.memo")
            .member(
                "type",
                HostObject::builder()
                    .member("$$typeof", "react.forward_ref")
                    .member("render", render.clone())
                    .build(),
            )
            .build()
            .into();

        let filter = Filter::component_by_code(["avatarDecoration"]);
        assert!(filter.matches_value(&render));
        assert!(filter.matches_value(&memo));
        assert!(filter.matches_value(&forward_ref));
        assert!(filter.matches_value(&memo_forward));

        let not_component: ExportValue = HostObject::builder()
            .member("type", render)
            .build()
            .into();
        assert!(!filter.matches_value(&not_component));
    }

    #[test]
    fn store_filter_compares_display_name() {
        let store: ExportValue = HostObject::builder()
            .display_name("UserStore")
            .member("getUser", noop("function(){}"))
            .build()
            .into();
        assert!(Filter::by_store_name("UserStore").matches_value(&store));
        assert!(!Filter::by_store_name("User").matches_value(&store));
        assert!(!Filter::by_store_name("UserStore").matches_value(&user_utils()));
    }

    #[test]
    fn display_is_readable() {
        let request = MatchRequest::one(Filter::by_props(["a", "b"]));
        assert_eq!(request.to_string(), "byProps(\"a\", \"b\") [ONE]");
        assert_eq!(request.kind(), MatchKind::Props);
    }
}

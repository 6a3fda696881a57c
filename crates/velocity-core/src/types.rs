// SPDX-FileCopyrightText: 2026 Velocity Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared by the module engine and the plugin runtime.

use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Opaque key of a module in the host bundle.
///
/// Production bundles use numeric ids while development bundles use
/// path-like strings; both forms are kept rather than stringified.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ModuleId {
    Numeric(u64),
    Named(String),
}

impl ModuleId {
    /// Parse a raw id, preferring the numeric form when the text is all digits.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().parse::<u64>() {
            Ok(n) => ModuleId::Numeric(n),
            Err(_) => ModuleId::Named(raw.to_string()),
        }
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModuleId::Numeric(n) => write!(f, "{n}"),
            ModuleId::Named(s) => write!(f, "{s}"),
        }
    }
}

impl From<u64> for ModuleId {
    fn from(id: u64) -> Self {
        ModuleId::Numeric(id)
    }
}

impl From<&str> for ModuleId {
    fn from(raw: &str) -> Self {
        ModuleId::parse(raw)
    }
}

impl From<String> for ModuleId {
    fn from(raw: String) -> Self {
        ModuleId::parse(&raw)
    }
}

/// How many candidates a lookup expects.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
#[serde(rename_all = "UPPERCASE")]
pub enum Cardinality {
    /// Exactly one candidate; several is an ambiguity error.
    #[default]
    One,
    /// The first candidate in definition order.
    Any,
    /// Every candidate.
    All,
}

/// The kind of structural evidence a lookup matches on.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchKind {
    Code,
    Props,
    ComponentCode,
    StoreName,
}

/// Lifecycle of a module as seen by the interceptor.
///
/// A module that no rule targets goes straight from `Intercepted` to
/// `Executed`; `Patched` is only entered when its source was rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
pub enum ModuleState {
    Intercepted,
    Patched,
    Executed,
}

/// Named context menus a plugin can inject items into.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString, Serialize,
    Deserialize,
)]
pub enum ContextMenuType {
    /// Right-click with developer mode on (copy id, view object).
    #[strum(serialize = "dev-context")]
    #[serde(rename = "dev-context")]
    DevContext,
    #[strum(serialize = "user-context")]
    #[serde(rename = "user-context")]
    UserContext,
    #[strum(serialize = "stream-context")]
    #[serde(rename = "stream-context")]
    StreamContext,
    #[strum(serialize = "message")]
    #[serde(rename = "message")]
    Message,
    /// Emoji, sticker and gif picker.
    #[strum(serialize = "expression-picker")]
    #[serde(rename = "expression-picker")]
    ExpressionPicker,
    #[strum(serialize = "image-context")]
    #[serde(rename = "image-context")]
    ImageContext,
    #[strum(serialize = "channel-context")]
    #[serde(rename = "channel-context")]
    ChannelContext,
    #[strum(serialize = "thread-context")]
    #[serde(rename = "thread-context")]
    ThreadContext,
    /// Group DM entry in the DM list.
    #[strum(serialize = "gdm-context")]
    #[serde(rename = "gdm-context")]
    GdmContext,
    #[strum(serialize = "guild-context")]
    #[serde(rename = "guild-context")]
    GuildContext,
    /// Dropdown under the server name.
    #[strum(serialize = "guild-header-popout")]
    #[serde(rename = "guild-header-popout")]
    GuildHeaderPopout,
    #[strum(serialize = "textarea-context")]
    #[serde(rename = "textarea-context")]
    TextareaContext,
    #[strum(serialize = "guild-settings-role-context")]
    #[serde(rename = "guild-settings-role-context")]
    GuildSettingsRoleContext,
}

impl ContextMenuType {
    /// Every menu the host is known to render, in declaration order.
    pub const ALL: &'static [ContextMenuType] = &[
        ContextMenuType::DevContext,
        ContextMenuType::UserContext,
        ContextMenuType::StreamContext,
        ContextMenuType::Message,
        ContextMenuType::ExpressionPicker,
        ContextMenuType::ImageContext,
        ContextMenuType::ChannelContext,
        ContextMenuType::ThreadContext,
        ContextMenuType::GdmContext,
        ContextMenuType::GuildContext,
        ContextMenuType::GuildHeaderPopout,
        ContextMenuType::TextareaContext,
        ContextMenuType::GuildSettingsRoleContext,
    ];
}

// SPDX-FileCopyrightText: 2026 Velocity Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lookups for the host's singleton state containers.
//!
//! A store is found by its constructor display name and only counts once it
//! exposes the change-listener contract. Each name is subscribed at most
//! once, however many callers ask for it.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info};
use velocity_core::{ExportValue, HostFunction, VelocityError};

use crate::filter::Filter;
use crate::resolver::{LazyRef, LazyResolver, ShapeGuard};

/// Stores the host is known to construct, pre-subscribed by
/// [`StoreRegistry::watch_well_known`].
pub const WELL_KNOWN_STORES: &[&str] = &[
    "ActiveJoinedThreadsStore",
    "ApplicationCommandIndexStore",
    "ApplicationStreamPreviewStore",
    "ApplicationStreamingStore",
    "AuthSessionsStore",
    "AuthenticationStore",
    "ChannelMemberStore",
    "ChannelRTCStore",
    "ChannelStore",
    "ClientThemesBackgroundStore",
    "DraftStore",
    "EmojiStore",
    "ExpandedGuildFolderStore",
    "GuildAvailabilityStore",
    "GuildChannelStore",
    "GuildMemberCountStore",
    "GuildMemberStore",
    "GuildRoleStore",
    "GuildStore",
    "MediaEngineStore",
    "MessageStore",
    "OverlayRTCConnectionStore",
    "PermissionStore",
    "PresenceStore",
    "PrivateChannelSortStore",
    "QuestsStore",
    "ReadStateStore",
    "RelationshipStore",
    "RunningGameStore",
    "SelectedChannelStore",
    "SelectedGuildStore",
    "SessionsStore",
    "SortedGuildStore",
    "StickersStore",
    "StreamerModeStore",
    "ThemeStore",
    "ThreadMemberListStore",
    "TypingStore",
    "UploadStore",
    "UserAffinitiesV2Store",
    "UserGuildJoinRequestStore",
    "UserGuildSettingsStore",
    "UserProfileStore",
    "UserSettingsProtoStore",
    "UserStore",
    "VoiceStateStore",
    "WindowStore",
];

const ADD_LISTENER: &str = "addChangeListener";
const REMOVE_LISTENER: &str = "removeChangeListener";

/// Reject values that lack the change-listener contract.
fn listener_contract(value: &ExportValue) -> Result<(), VelocityError> {
    for member in [ADD_LISTENER, REMOVE_LISTENER] {
        if value.get(member).and_then(ExportValue::as_function).is_none() {
            return Err(VelocityError::HostShape {
                name: value.describe(),
                member: member.to_string(),
            });
        }
    }
    Ok(())
}

/// A store whose shape has been checked.
#[derive(Debug, Clone)]
pub struct StoreHandle {
    name: String,
    value: ExportValue,
}

impl StoreHandle {
    /// Wrap `value` after checking it has the listener contract.
    pub fn validate(name: impl Into<String>, value: ExportValue) -> Result<Self, VelocityError> {
        listener_contract(&value)?;
        Ok(Self {
            name: name.into(),
            value,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &ExportValue {
        &self.value
    }

    pub fn add_change_listener(&self, listener: HostFunction) -> Result<(), VelocityError> {
        self.value
            .call_method(ADD_LISTENER, &[listener.into()])
            .map(drop)
    }

    pub fn remove_change_listener(&self, listener: HostFunction) -> Result<(), VelocityError> {
        self.value
            .call_method(REMOVE_LISTENER, &[listener.into()])
            .map(drop)
    }

    /// Call any other method on the store.
    pub fn call(&self, method: &str, args: &[ExportValue]) -> Result<ExportValue, VelocityError> {
        self.value.call_method(method, args)
    }
}

/// One lazy subscription per store name.
pub struct StoreRegistry {
    resolver: Arc<LazyResolver>,
    entries: Mutex<BTreeMap<String, LazyRef>>,
}

impl StoreRegistry {
    pub fn new(resolver: Arc<LazyResolver>) -> Self {
        Self {
            resolver,
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    /// The shared reference for `name`, subscribing on first use.
    pub fn lazy_store(&self, name: &str) -> LazyRef {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = entries.get(name) {
            return existing.clone();
        }
        let guard: ShapeGuard = Arc::new(listener_contract);
        let lazy = self
            .resolver
            .wait_for_shape(Filter::by_store_name(name), guard);
        debug!(store = name, state = lazy.state().label(), "store subscribed");
        entries.insert(name.to_string(), lazy.clone());
        lazy
    }

    /// Run `callback` with the store once it is found with a valid shape.
    pub fn wait_for_store<F>(&self, name: &str, callback: F)
    where
        F: FnOnce(StoreHandle) + Send + 'static,
    {
        let owned = name.to_string();
        self.lazy_store(name).on_resolved(move |value| {
            // The guard already checked the contract, so this cannot fail.
            if let Ok(handle) = StoreHandle::validate(owned, value.clone()) {
                callback(handle);
            }
        });
    }

    /// The store, if it has already been found.
    pub fn store(&self, name: &str) -> Option<StoreHandle> {
        let value = self.lazy_store(name).get()?;
        StoreHandle::validate(name, value).ok()
    }

    /// Subscribe to every store in [`WELL_KNOWN_STORES`].
    pub fn watch_well_known(&self) -> usize {
        for name in WELL_KNOWN_STORES {
            self.lazy_store(name);
        }
        info!(count = WELL_KNOWN_STORES.len(), "watching well-known stores");
        WELL_KNOWN_STORES.len()
    }

    /// Names of subscribed stores that have resolved.
    pub fn resolved_names(&self) -> Vec<String> {
        self.names_where(|lazy| !lazy.is_pending())
    }

    /// Names of subscribed stores still waiting.
    pub fn pending_names(&self) -> Vec<String> {
        self.names_where(LazyRef::is_pending)
    }

    fn names_where(&self, keep: impl Fn(&LazyRef) -> bool) -> Vec<String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(_, lazy)| keep(lazy))
            .map(|(name, _)| name.clone())
            .collect()
    }
}

impl std::fmt::Debug for StoreRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        f.debug_struct("StoreRegistry")
            .field("subscriptions", &count)
            .finish()
    }
}

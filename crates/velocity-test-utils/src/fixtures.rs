// SPDX-FileCopyrightText: 2026 Velocity Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Captured module sources and the exports their factories produce.

use std::sync::Arc;

use velocity_core::{ExportValue, HostObject, ModuleFactory, ModuleId};

/// Source of the account panel, as minified by the host build.
pub const ACCOUNT_SPEAKING_SOURCE: &str = r#"function(e,t,n){"use strict";n.d(t,{Z:()=>u});var r=n(735250);function u(e){let{buttons:t}=e;return(0,r.jsx)("div",{className:"ACCOUNT_SPEAKING",buttons,children:[A,B]})}}"#;

/// Source of the avatar helper module.
pub const AVATAR_SOURCE: &str = "function(e){return e.getAvatarURL}";

pub const USER_STORE_SOURCE: &str = r#"function(e,t,n){class a extends n.Store{getCurrentUser(){return s}getUser(e){return l[e]}}a.displayName="UserStore"}"#;

pub const FLUX_SOURCE: &str = "function(e,t,n){t.connectStores=function(e,t){return e};t.Store=class{}}";

type ExportsFn = Arc<dyn Fn(&str) -> ExportValue + Send + Sync>;

/// One module as the host would define it.
#[derive(Clone)]
pub struct ModuleFixture {
    pub id: ModuleId,
    pub source: String,
    exports: ExportsFn,
}

impl ModuleFixture {
    /// A module whose factory returns `exports(effective_source)`.
    pub fn new<F>(id: impl Into<ModuleId>, source: impl Into<String>, exports: F) -> Self
    where
        F: Fn(&str) -> ExportValue + Send + Sync + 'static,
    {
        Self {
            id: id.into(),
            source: source.into(),
            exports: Arc::new(exports),
        }
    }

    /// A module that exports `{ source: <the text it ran with> }`, so tests
    /// can see whether a patch reached execution.
    pub fn echoing(id: impl Into<ModuleId>, source: impl Into<String>) -> Self {
        Self::new(id, source, |effective| {
            HostObject::builder().member("source", effective).build().into()
        })
    }

    pub fn factory(&self) -> ModuleFactory {
        let exports = Arc::clone(&self.exports);
        ModuleFactory::new(move |scope| Ok(exports(scope.source())))
    }
}

impl std::fmt::Debug for ModuleFixture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleFixture")
            .field("id", &self.id)
            .field("source", &self.source)
            .finish()
    }
}

/// A store object with the change-listener contract and a constant getter.
pub fn store_object(name: &str, getter: &str, value: ExportValue) -> ExportValue {
    HostObject::builder()
        .display_name(name)
        .function("addChangeListener", "function(e){this._changeCallbacks.add(e)}", |_| {
            Ok(ExportValue::Undefined)
        })
        .function("removeChangeListener", "function(e){this._changeCallbacks.delete(e)}", |_| {
            Ok(ExportValue::Undefined)
        })
        .function(getter, "function(){return s}", move |_| Ok(value.clone()))
        .build()
        .into()
}

/// Module 42: exports `{ getAvatarURL }` returning `"u"`.
pub fn avatar_module() -> ModuleFixture {
    ModuleFixture::new(42u64, AVATAR_SOURCE, |_| {
        HostObject::builder()
            .function("getAvatarURL", "()=>\"u\"", |_| Ok("u".into()))
            .build()
            .into()
    })
}

pub fn account_panel() -> ModuleFixture {
    ModuleFixture::echoing(1337u64, ACCOUNT_SPEAKING_SOURCE)
}

pub fn user_store() -> ModuleFixture {
    ModuleFixture::new(200u64, USER_STORE_SOURCE, |_| {
        store_object("UserStore", "getCurrentUser", "current-user".into())
    })
}

pub fn flux_module() -> ModuleFixture {
    ModuleFixture::new(300u64, FLUX_SOURCE, |_| {
        HostObject::builder()
            .function("connectStores", "function(e,t){return e}", |args| {
                Ok(args.first().cloned().unwrap_or(ExportValue::Undefined))
            })
            .member("Store", HostObject::builder().display_name("Store").build())
            .build()
            .into()
    })
}

fn xy_exports(tag: &str) -> ExportValue {
    HostObject::builder()
        .member("x", tag)
        .member("y", tag)
        .build()
        .into()
}

/// Two unrelated modules that both export `x` and `y`.
pub fn ambiguous_pair() -> [ModuleFixture; 2] {
    [
        ModuleFixture::new(100u64, "function(e,t){t.x=1;t.y=2}", |_| xy_exports("first")),
        ModuleFixture::new(101u64, "function(e,t){t.y=3;t.x=4}", |_| xy_exports("second")),
    ]
}

/// Every fixture, in the order the host would define them.
pub fn corpus() -> Vec<ModuleFixture> {
    let mut modules = vec![flux_module(), account_panel(), avatar_module(), user_store()];
    modules.extend(ambiguous_pair());
    modules
}

// SPDX-FileCopyrightText: 2026 Velocity Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the plugin lifecycle.

use std::sync::{Arc, Mutex, RwLock};

use tracing_test::traced_test;
use velocity_config::{PluginConfig, VelocityConfig};
use velocity_core::{ExportValue, ModuleId, VelocityError};
use velocity_patcher::{DiagnosticsSink, PatchDef, PatchDiagnostics, PatchReport, RuleBook, RuleReport, RuleStatus};
use velocity_plugin::{
    FluxHandler, MenuItem, MenuPatch, Plugin, PluginContext, PluginManifest, PluginRuntime,
    PluginStatus, Services,
};
use velocity_webpack::{LazyResolver, ModuleRegistry};

type Journal = Arc<Mutex<Vec<String>>>;

struct TestPlugin {
    manifest: PluginManifest,
    patches: Vec<PatchDef>,
    fail_start: bool,
    journal: Journal,
}

impl TestPlugin {
    fn new(manifest: PluginManifest, journal: &Journal) -> Self {
        Self {
            manifest,
            patches: Vec::new(),
            fail_start: false,
            journal: Arc::clone(journal),
        }
    }

    fn patch(mut self, def: PatchDef) -> Self {
        self.patches.push(def);
        self
    }

    fn failing(mut self) -> Self {
        self.fail_start = true;
        self
    }
}

impl Plugin for TestPlugin {
    fn manifest(&self) -> PluginManifest {
        self.manifest.clone()
    }

    fn patches(&self) -> Vec<PatchDef> {
        self.patches.clone()
    }

    fn flux_handlers(&self) -> Vec<(String, FluxHandler)> {
        let journal = Arc::clone(&self.journal);
        let name = self.manifest.name.clone();
        vec![(
            "CHANNEL_SELECT".to_string(),
            Arc::new(move |_: &ExportValue| {
                journal.lock().unwrap().push(format!("flux:{name}"));
                Ok(())
            }),
        )]
    }

    fn context_menus(&self) -> Vec<(String, MenuPatch)> {
        let id = format!("{}-item", self.manifest.name);
        vec![(
            "channel-context".to_string(),
            Arc::new(move |items: &mut Vec<MenuItem>, _: &ExportValue| {
                items.push(MenuItem::item(id.clone(), "Injected"));
                Ok(())
            }),
        )]
    }

    fn start(&self, ctx: &PluginContext) -> Result<(), VelocityError> {
        if self.fail_start {
            return Err(VelocityError::Internal("no settings".into()));
        }
        let suffix = if ctx.flag("verbose", false) { "+verbose" } else { "" };
        self.journal
            .lock()
            .unwrap()
            .push(format!("start:{}{suffix}", ctx.name()));
        Ok(())
    }

    fn stop(&self, ctx: &PluginContext) -> Result<(), VelocityError> {
        self.journal.lock().unwrap().push(format!("stop:{}", ctx.name()));
        Ok(())
    }
}

struct Fixture {
    runtime: PluginRuntime,
    rules: Arc<RwLock<RuleBook>>,
    diagnostics: Arc<PatchDiagnostics>,
    journal: Journal,
}

fn fixture() -> Fixture {
    let rules = Arc::new(RwLock::new(RuleBook::new()));
    let diagnostics = Arc::new(PatchDiagnostics::default());
    let resolver = Arc::new(LazyResolver::new(Arc::new(ModuleRegistry::new())));
    let runtime = PluginRuntime::new(
        Arc::clone(&rules),
        Arc::clone(&diagnostics),
        Services::new(resolver),
    )
    .unwrap();
    Fixture {
        runtime,
        rules,
        diagnostics,
        journal: Arc::new(Mutex::new(Vec::new())),
    }
}

fn config_with(entries: &[(&str, bool)]) -> VelocityConfig {
    let mut config = VelocityConfig::default();
    for (name, enabled) in entries {
        config.plugins.insert(
            name.to_string(),
            PluginConfig {
                enabled: Some(*enabled),
                settings: toml::Table::new(),
            },
        );
    }
    config
}

fn journal(f: &Fixture) -> Vec<String> {
    f.journal.lock().unwrap().clone()
}

#[test]
fn configuration_selects_plugins_and_dependencies() {
    let mut f = fixture();
    let j = Arc::clone(&f.journal);
    f.runtime
        .register(Arc::new(TestPlugin::new(PluginManifest::new("Settings", "").required(), &j)))
        .unwrap();
    f.runtime
        .register(Arc::new(TestPlugin::new(
            PluginManifest::new("MessageLogger", "").depends_on("MessageEvents"),
            &j,
        )))
        .unwrap();
    f.runtime
        .register(Arc::new(TestPlugin::new(PluginManifest::new("MessageEvents", ""), &j)))
        .unwrap();
    f.runtime
        .register(Arc::new(TestPlugin::new(
            PluginManifest::new("NoTrack", "").enabled_by_default(),
            &j,
        )))
        .unwrap();

    let forced = f
        .runtime
        .configure(&config_with(&[("MessageLogger", true), ("NoTrack", false), ("Settings", false)]))
        .unwrap();

    assert_eq!(forced, vec!["MessageEvents"]);
    assert_eq!(
        f.runtime.start_order(),
        ["Settings", "MessageEvents", "MessageLogger"]
    );
    assert_eq!(f.runtime.status("NoTrack"), Some(PluginStatus::Disabled));
}

#[test]
fn dependency_cycles_are_reported() {
    let mut f = fixture();
    let j = Arc::clone(&f.journal);
    for (name, dep) in [("A", "B"), ("B", "A")] {
        f.runtime
            .register(Arc::new(TestPlugin::new(
                PluginManifest::new(name, "").enabled_by_default().depends_on(dep),
                &j,
            )))
            .unwrap();
    }
    let err = f.runtime.configure(&VelocityConfig::default()).unwrap_err();
    assert!(matches!(err, VelocityError::DependencyCycle(ref names) if names == "A, B"));
}

#[test]
fn incompatible_plugins_are_rejected() {
    let mut f = fixture();
    let j = Arc::clone(&f.journal);
    let err = f
        .runtime
        .register(Arc::new(TestPlugin::new(
            PluginManifest::new("Future", "").min_velocity_version("99.0.0"),
            &j,
        )))
        .unwrap_err();
    assert!(err.to_string().contains("99.0.0"), "got: {err}");
}

#[test]
fn patches_are_collected_in_start_order() {
    let mut f = fixture();
    let j = Arc::clone(&f.journal);
    f.runtime
        .register(Arc::new(
            TestPlugin::new(PluginManifest::new("Later", "").enabled_by_default().depends_on("Base"), &j)
                .patch(PatchDef::new("ACCOUNT_SPEAKING").replace(r"children:\[", "children:[LATER,")),
        ))
        .unwrap();
    f.runtime
        .register(Arc::new(
            TestPlugin::new(PluginManifest::new("Base", "").enabled_by_default(), &j)
                .patch(PatchDef::new("ACCOUNT_SPEAKING").replace(r"children:\[", "children:[BASE,"))
                .patch(PatchDef::new("broken").replace("(", "x")),
        ))
        .unwrap();
    f.runtime.configure(&VelocityConfig::default()).unwrap();

    assert_eq!(f.runtime.collect_patches(), 2);
    let owners: Vec<String> = f
        .rules
        .read()
        .unwrap()
        .rules()
        .iter()
        .map(|r| r.owner.clone())
        .collect();
    assert_eq!(owners, vec!["Base", "Later"]);
    assert_eq!(f.runtime.entry("Base").unwrap().patch_errors.len(), 1);

    // A second collection does not register anything twice.
    assert_eq!(f.runtime.collect_patches(), 0);
}

#[test]
fn start_subscribes_handlers_and_menus() {
    let mut f = fixture();
    let j = Arc::clone(&f.journal);
    f.runtime
        .register(Arc::new(TestPlugin::new(
            PluginManifest::new("ShowHiddenChannels", "").enabled_by_default(),
            &j,
        )))
        .unwrap();
    let mut config = config_with(&[]);
    let mut settings = toml::Table::new();
    settings.insert("verbose".into(), toml::Value::Boolean(true));
    config.plugins.insert(
        "ShowHiddenChannels".into(),
        PluginConfig {
            enabled: None,
            settings,
        },
    );
    f.runtime.configure(&config).unwrap();
    f.runtime.collect_patches();

    assert_eq!(f.runtime.start_all(), 1);
    assert_eq!(f.runtime.status("ShowHiddenChannels"), Some(PluginStatus::Running));

    let services = f.runtime.services().clone();
    let report = services.flux.dispatch("CHANNEL_SELECT", &ExportValue::Undefined);
    assert_eq!(report.delivered, 1);

    let mut items = Vec::new();
    services.menus.apply("channel-context", &mut items, &ExportValue::Undefined);
    assert_eq!(items[0].id.as_deref(), Some("ShowHiddenChannels-item"));

    assert_eq!(
        journal(&f),
        vec!["start:ShowHiddenChannels+verbose", "flux:ShowHiddenChannels"]
    );
}

#[traced_test]
#[test]
fn failed_start_is_contained() {
    let mut f = fixture();
    let j = Arc::clone(&f.journal);
    f.runtime
        .register(Arc::new(
            TestPlugin::new(PluginManifest::new("Broken", "").enabled_by_default(), &j)
                .failing()
                .patch(PatchDef::new("token").replace("token", "patched")),
        ))
        .unwrap();
    f.runtime
        .register(Arc::new(TestPlugin::new(
            PluginManifest::new("NeedsBroken", "").enabled_by_default().depends_on("Broken"),
            &j,
        )))
        .unwrap();
    f.runtime
        .register(Arc::new(TestPlugin::new(
            PluginManifest::new("Independent", "").enabled_by_default(),
            &j,
        )))
        .unwrap();
    f.runtime.configure(&VelocityConfig::default()).unwrap();
    f.runtime.collect_patches();

    assert_eq!(f.runtime.start_all(), 1);
    assert!(matches!(f.runtime.status("Broken"), Some(PluginStatus::Failed(_))));
    assert!(matches!(
        f.runtime.status("NeedsBroken"),
        Some(PluginStatus::Failed(reason)) if reason.contains("dependency Broken")
    ));
    assert_eq!(f.runtime.status("Independent"), Some(PluginStatus::Running));

    let services = f.runtime.services();
    assert_eq!(services.flux.handler_count("CHANNEL_SELECT"), 1);
    assert!(f.rules.read().unwrap().owned_by("Broken").is_empty());
    assert!(logs_contain("plugin failed to start"));
}

#[traced_test]
#[test]
fn essential_patch_failures_degrade_the_plugin() {
    let mut f = fixture();
    let j = Arc::clone(&f.journal);
    f.runtime
        .register(Arc::new(
            TestPlugin::new(
                PluginManifest::new("FakeNitro", "").enabled_by_default().essential_patches(),
                &j,
            )
            .patch(PatchDef::new("canUseEmojisEverywhere").replace(r"return \i\.premiumType", "return true")),
        ))
        .unwrap();
    f.runtime
        .register(Arc::new(
            TestPlugin::new(PluginManifest::new("Cosmetic", "").enabled_by_default(), &j)
                .patch(PatchDef::new("avatarDecoration").replace("nothing-here", "x")),
        ))
        .unwrap();
    f.runtime.configure(&VelocityConfig::default()).unwrap();
    f.runtime.collect_patches();

    let failed = |owner: &str, rule| RuleReport {
        rule,
        owner: owner.to_string(),
        find: "token".to_string(),
        no_warn: false,
        status: RuleStatus::Failed {
            replacement: 0,
            reverted: false,
        },
    };
    let nitro_rule = f.runtime.entry("FakeNitro").unwrap().rules[0];
    let cosmetic_rule = f.runtime.entry("Cosmetic").unwrap().rules[0];
    f.diagnostics.record(PatchReport {
        module: ModuleId::Numeric(7),
        rules: vec![failed("FakeNitro", nitro_rule), failed("Cosmetic", cosmetic_rule)],
        log: Vec::new(),
        fell_back: None,
    });

    f.runtime.start_all();
    match f.runtime.status("FakeNitro") {
        Some(PluginStatus::Degraded(problems)) => {
            assert_eq!(problems.len(), 1);
            assert!(problems[0].contains("module 7"));
        }
        other => panic!("expected degraded, got {other:?}"),
    }
    assert_eq!(f.runtime.status("Cosmetic"), Some(PluginStatus::Running));
    assert!(logs_contain("essential patches failed"));
}

#[test]
fn stopping_runs_dependents_first_and_detaches() {
    let mut f = fixture();
    let j = Arc::clone(&f.journal);
    f.runtime
        .register(Arc::new(
            TestPlugin::new(PluginManifest::new("Api", "").enabled_by_default(), &j)
                .patch(PatchDef::new("token").replace("token", "patched").all()),
        ))
        .unwrap();
    f.runtime
        .register(Arc::new(TestPlugin::new(
            PluginManifest::new("Ui", "").enabled_by_default().depends_on("Api"),
            &j,
        )))
        .unwrap();
    f.runtime.configure(&VelocityConfig::default()).unwrap();
    f.runtime.collect_patches();
    f.runtime.start_all();

    f.runtime.stop("Api").unwrap();
    let log = journal(&f);
    assert_eq!(&log[log.len() - 2..], ["stop:Ui", "stop:Api"]);
    assert_eq!(f.runtime.status("Api"), Some(PluginStatus::Disabled));
    assert_eq!(f.runtime.status("Ui"), Some(PluginStatus::Disabled));
    assert!(f.rules.read().unwrap().is_empty());
    assert_eq!(f.runtime.services().flux.handler_count("CHANNEL_SELECT"), 0);

    // Starting again pulls the dependency back in.
    assert_eq!(f.runtime.start("Ui").unwrap(), PluginStatus::Running);
    assert_eq!(f.runtime.status("Api"), Some(PluginStatus::Running));
    assert_eq!(f.rules.read().unwrap().len(), 1);
}

#[test]
fn required_plugins_cannot_be_stopped() {
    let mut f = fixture();
    let j = Arc::clone(&f.journal);
    f.runtime
        .register(Arc::new(TestPlugin::new(PluginManifest::new("Settings", "").required(), &j)))
        .unwrap();
    f.runtime.configure(&VelocityConfig::default()).unwrap();
    f.runtime.start_all();

    assert!(f.runtime.stop("Settings").is_err());
    assert!(matches!(
        f.runtime.stop("Nope"),
        Err(VelocityError::PluginNotFound(_))
    ));

    f.runtime.stop_all();
    assert_eq!(journal(&f), vec!["start:Settings", "stop:Settings"]);
}

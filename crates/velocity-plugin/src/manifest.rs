// SPDX-FileCopyrightText: 2026 Velocity Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Plugin manifests, declared in code or parsed from `plugin.toml`.

use semver::Version;
use serde::{Deserialize, Serialize};
use velocity_core::VelocityError;

/// Metadata describing a plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginManifest {
    /// Unique name. Also the key `$self` resolves through.
    pub name: String,
    pub description: String,
    pub authors: Vec<String>,
    /// Semantic version string.
    pub version: String,
    /// Always enabled, whatever the configuration says.
    pub required: bool,
    pub enabled_by_default: bool,
    /// The plugin cannot work without its patches; a failed patch marks it
    /// degraded at start.
    pub essential_patches: bool,
    /// Plugins that must start first. Enabling this plugin enables them.
    pub dependencies: Vec<String>,
    /// Oldest Velocity release the plugin supports.
    pub min_velocity_version: Option<String>,
}

impl PluginManifest {
    /// A manifest with defaults for everything but the name and description.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            authors: Vec::new(),
            version: "0.1.0".to_string(),
            required: false,
            enabled_by_default: false,
            essential_patches: false,
            dependencies: Vec::new(),
            min_velocity_version: None,
        }
    }

    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.authors.push(author.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn enabled_by_default(mut self) -> Self {
        self.enabled_by_default = true;
        self
    }

    pub fn essential_patches(mut self) -> Self {
        self.essential_patches = true;
        self
    }

    pub fn depends_on(mut self, plugin: impl Into<String>) -> Self {
        self.dependencies.push(plugin.into());
        self
    }

    pub fn min_velocity_version(mut self, version: impl Into<String>) -> Self {
        self.min_velocity_version = Some(version.into());
        self
    }

    /// Check the manifest against the running Velocity version.
    pub fn check_compatible(&self, running: &Version) -> Result<(), VelocityError> {
        let Some(min) = &self.min_velocity_version else {
            return Ok(());
        };
        let min = Version::parse(min).map_err(|e| {
            VelocityError::Config(format!(
                "plugin {}: invalid min_velocity_version '{min}': {e}",
                self.name
            ))
        })?;
        if *running < min {
            return Err(VelocityError::Plugin {
                plugin: self.name.clone(),
                message: format!("requires Velocity {min} or newer, running {running}"),
            });
        }
        Ok(())
    }
}

/// Intermediate TOML struct for `plugin.toml`.
#[derive(Debug, Deserialize)]
struct PluginManifestFile {
    plugin: PluginSection,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PluginSection {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    authors: Vec<String>,
    version: String,
    #[serde(default)]
    required: bool,
    #[serde(default)]
    enabled_by_default: bool,
    #[serde(default)]
    essential_patches: bool,
    #[serde(default)]
    dependencies: Vec<String>,
    min_velocity_version: Option<String>,
}

/// Parse a `plugin.toml` document.
///
/// The name must be non-empty and both versions must be valid semver.
pub fn parse_plugin_manifest(toml_content: &str) -> Result<PluginManifest, VelocityError> {
    let file: PluginManifestFile = toml::from_str(toml_content)
        .map_err(|e| VelocityError::Config(format!("invalid plugin manifest: {e}")))?;
    let section = file.plugin;

    if section.name.trim().is_empty() {
        return Err(VelocityError::Config(
            "plugin manifest: name must not be empty".to_string(),
        ));
    }

    Version::parse(&section.version).map_err(|e| {
        VelocityError::Config(format!(
            "plugin manifest {}: invalid version '{}': {e}",
            section.name, section.version
        ))
    })?;

    if let Some(min) = &section.min_velocity_version {
        Version::parse(min).map_err(|e| {
            VelocityError::Config(format!(
                "plugin manifest {}: invalid min_velocity_version '{min}': {e}",
                section.name
            ))
        })?;
    }

    if section.dependencies.contains(&section.name) {
        return Err(VelocityError::Config(format!(
            "plugin manifest {}: a plugin cannot depend on itself",
            section.name
        )));
    }

    Ok(PluginManifest {
        name: section.name,
        description: section.description,
        authors: section.authors,
        version: section.version,
        required: section.required,
        enabled_by_default: section.enabled_by_default,
        essential_patches: section.essential_patches,
        dependencies: section.dependencies,
        min_velocity_version: section.min_velocity_version,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_manifest() {
        let toml = r#"
[plugin]
name = "MessageLogger"
description = "Keeps deleted and edited messages"
authors = ["Velocity Contributors"]
version = "1.2.0"
enabled_by_default = true
essential_patches = true
dependencies = ["MessageEventsAPI"]
min_velocity_version = "0.1.0"
"#;
        let manifest = parse_plugin_manifest(toml).unwrap();
        assert_eq!(manifest.name, "MessageLogger");
        assert_eq!(manifest.authors, vec!["Velocity Contributors"]);
        assert!(manifest.enabled_by_default);
        assert!(manifest.essential_patches);
        assert!(!manifest.required);
        assert_eq!(manifest.dependencies, vec!["MessageEventsAPI"]);
    }

    #[test]
    fn parse_minimal_manifest() {
        let manifest = parse_plugin_manifest("[plugin]\nname = \"NoTrack\"\nversion = \"1.0.0\"\n").unwrap();
        assert_eq!(manifest.name, "NoTrack");
        assert!(manifest.description.is_empty());
        assert!(manifest.dependencies.is_empty());
        assert!(manifest.min_velocity_version.is_none());
    }

    #[test]
    fn rejects_empty_name_and_bad_versions() {
        let empty = parse_plugin_manifest("[plugin]\nname = \"\"\nversion = \"1.0.0\"\n");
        assert!(empty.unwrap_err().to_string().contains("name must not be empty"));

        let bad = parse_plugin_manifest("[plugin]\nname = \"X\"\nversion = \"one\"\n");
        assert!(bad.unwrap_err().to_string().contains("invalid version"));

        let unknown = parse_plugin_manifest("[plugin]\nname = \"X\"\nversion = \"1.0.0\"\nadapter = 1\n");
        assert!(unknown.is_err());
    }

    #[test]
    fn rejects_self_dependency() {
        let toml = "[plugin]\nname = \"X\"\nversion = \"1.0.0\"\ndependencies = [\"X\"]\n";
        assert!(parse_plugin_manifest(toml).is_err());
    }

    #[test]
    fn min_version_is_enforced() {
        let manifest = PluginManifest::new("Future", "").min_velocity_version("2.0.0");
        let running = Version::new(0, 1, 0);
        assert!(matches!(
            manifest.check_compatible(&running),
            Err(VelocityError::Plugin { .. })
        ));
        assert!(PluginManifest::new("Any", "").check_compatible(&running).is_ok());
    }
}

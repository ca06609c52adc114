// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout of the configuration file that toolbelt uses to
//! simplify the process of serialization and deserialization. File I/O is
//! left to the caller to figure out.

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    path::PathBuf,
    str::FromStr,
};

/// Toolbelt configuration layout.
///
/// Every section and field is optional. Missing fields take their default
/// values, so an empty file is a valid configuration.
///
/// # General Layout
///
/// ```toml
/// [conda]
/// exe = "$CONDA_EXE"
/// env = "$CONDA_PREFIX"
///
/// [snapshot]
/// output_dir = "~/envs"
/// generalize_git_remotes = false
///
/// [flatten]
/// root = "$..*"
/// ```
///
/// Fields naming paths or environments go through shell expansion when
/// parsed, so they may refer to environment variables or `~`.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ToolbeltConfig {
    /// Conda installation to query.
    pub conda: CondaSettings,

    /// Environment snapshot settings.
    pub snapshot: SnapshotSettings,

    /// JSON flattening settings.
    pub flatten: FlattenSettings,
}

impl FromStr for ToolbeltConfig {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut config: ToolbeltConfig =
            toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on every path-like field.
        config.conda.exe = config.conda.exe.map(expand_path).transpose()?;
        config.conda.env = config.conda.env.map(expand).transpose()?;
        config.snapshot.output_dir = config.snapshot.output_dir.map(expand_path).transpose()?;

        Ok(config)
    }
}

impl Display for ToolbeltConfig {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Conda installation settings.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CondaSettings {
    /// Path to conda executable. Falls back to `$CONDA_EXE` when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exe: Option<PathBuf>,

    /// Environment name or prefix. Falls back to `$CONDA_PREFIX` when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env: Option<String>,
}

/// Environment snapshot settings.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SnapshotSettings {
    /// Directory to write `environment.yml` into. Current directory when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,

    /// Record Git remotes without their commit or tag reference.
    pub generalize_git_remotes: bool,
}

/// JSON flattening settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FlattenSettings {
    /// Traversal-root expression.
    pub root: String,
}

impl Default for FlattenSettings {
    fn default() -> Self {
        Self {
            root: "$..*".into(),
        }
    }
}

fn expand(value: String) -> Result<String> {
    Ok(shellexpand::full(value.as_str())
        .map_err(ConfigError::ShellExpansion)?
        .into_owned())
}

fn expand_path(path: PathBuf) -> Result<PathBuf> {
    expand(path.to_string_lossy().into_owned()).map(PathBuf::from)
}

/// Configuration error types.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;

    #[sealed_test(env = [("BLAH", "/home/blah/blah"), ("CONDA", "/opt/conda")])]
    fn deserialize_toolbelt_config() -> anyhow::Result<()> {
        let result: ToolbeltConfig = r#"
            [conda]
            exe = "$CONDA/bin/conda"
            env = "$BLAH/envs/gis"

            [snapshot]
            output_dir = "$BLAH/snapshots"
            generalize_git_remotes = true

            [flatten]
            root = "$[*]..*"
        "#
        .parse()?;

        let expect = ToolbeltConfig {
            conda: CondaSettings {
                exe: Some("/opt/conda/bin/conda".into()),
                env: Some("/home/blah/blah/envs/gis".into()),
            },
            snapshot: SnapshotSettings {
                output_dir: Some("/home/blah/blah/snapshots".into()),
                generalize_git_remotes: true,
            },
            flatten: FlattenSettings {
                root: "$[*]..*".into(),
            },
        };

        assert_eq!(result, expect);

        Ok(())
    }

    #[test]
    fn deserialize_partial_toolbelt_config() -> anyhow::Result<()> {
        let result: ToolbeltConfig = r#"
            [snapshot]
            generalize_git_remotes = true
        "#
        .parse()?;

        let mut expect = ToolbeltConfig::default();
        expect.snapshot.generalize_git_remotes = true;
        assert_eq!(result, expect);
        assert_eq!(result.flatten.root, "$..*");

        let result: ToolbeltConfig = "".parse()?;
        assert_eq!(result, ToolbeltConfig::default());

        Ok(())
    }

    #[sealed_test]
    fn deserialize_reports_unset_variable() {
        std::env::remove_var("TOOLBELT_NOT_SET");
        let result = r#"
            [conda]
            env = "$TOOLBELT_NOT_SET"
        "#
        .parse::<ToolbeltConfig>();

        assert!(matches!(result, Err(ConfigError::ShellExpansion(_))));
    }

    #[test]
    fn serialize_toolbelt_config() {
        let result = ToolbeltConfig {
            conda: CondaSettings {
                exe: Some("/opt/conda/bin/conda".into()),
                env: Some("gis".into()),
            },
            snapshot: SnapshotSettings {
                output_dir: None,
                generalize_git_remotes: true,
            },
            flatten: FlattenSettings::default(),
        }
        .to_string();

        let expect = indoc! {r#"
            [conda]
            exe = "/opt/conda/bin/conda"
            env = "gis"

            [snapshot]
            generalize_git_remotes = true

            [flatten]
            root = "$..*"
        "#};

        assert_eq!(result, expect);
    }
}

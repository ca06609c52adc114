// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Package manager access.
//!
//! Package listings come from external package managers. The
//! [`PackageSource`] trait is the layer of indirection between the listing
//! logic and those package managers, so that the listing logic can be fed
//! canned output instead of needing a live conda installation.

use serde::Deserialize;
use std::{
    ffi::OsStr,
    fmt::Debug,
    future::Future,
    path::{Path, PathBuf},
};
use tokio::process::Command;
use tracing::{debug, instrument};

/// Raw output of package manager queries for one environment.
pub trait PackageSource: Send + Sync {
    /// Output of `conda list --json`.
    fn conda_list(&self) -> impl Future<Output = Result<String>> + Send;

    /// Output of `conda env export --no-builds`.
    fn conda_export(&self) -> impl Future<Output = Result<String>> + Send;

    /// Output of `python -m pip freeze`.
    fn pip_freeze(&self) -> impl Future<Output = Result<String>> + Send;

    /// Output of `python -m pip show <name>`.
    fn pip_show(&self, name: &str) -> impl Future<Output = Result<String>> + Send;
}

/// Package manager access through the conda executable.
///
/// Pip is accessed through the python interpreter of the environment itself,
/// so that pip lists what is installed in that environment rather than
/// whatever happens to be first on `$PATH`.
#[derive(Clone, Debug)]
pub struct CondaCli {
    conda_exe: PathBuf,
    prefix: PathBuf,
}

impl CondaCli {
    /// Open environment by name or prefix.
    ///
    /// # Errors
    ///
    /// - Return [`SourceError::MissingConda`] if conda executable does not exist.
    /// - Return [`SourceError::Syscall`] if environments cannot be listed.
    /// - Return [`SourceError::UnknownEnv`] or [`SourceError::AmbiguousEnv`]
    ///   if environment cannot be resolved.
    #[instrument(skip(conda_exe), level = "debug")]
    pub async fn open(conda_exe: impl Into<PathBuf>, env: &str) -> Result<Self> {
        let conda_exe = conda_exe.into();
        let prefix = list_envs(&conda_exe).await?.resolve(env)?;
        debug!("resolved environment {env:?} to {}", prefix.display());

        Ok(Self { conda_exe, prefix })
    }

    /// Prefix of environment.
    pub fn prefix(&self) -> &Path {
        self.prefix.as_path()
    }

    fn python(&self) -> PathBuf {
        if cfg!(windows) {
            self.prefix.join("python.exe")
        } else {
            self.prefix.join("bin").join("python")
        }
    }

    async fn conda(&self, args: &[&str]) -> Result<String> {
        let mut full_args = args.iter().map(OsStr::new).collect::<Vec<_>>();
        full_args.extend([OsStr::new("--prefix"), self.prefix.as_os_str()]);
        syscall_non_interactive(&self.conda_exe, full_args).await
    }

    async fn pip(&self, args: &[&str]) -> Result<String> {
        let full_args = ["-m", "pip"].iter().chain(args).copied();
        syscall_non_interactive(self.python(), full_args).await
    }
}

impl PackageSource for CondaCli {
    async fn conda_list(&self) -> Result<String> {
        self.conda(&["list", "--json"]).await
    }

    async fn conda_export(&self) -> Result<String> {
        self.conda(&["env", "export", "--no-builds"]).await
    }

    async fn pip_freeze(&self) -> Result<String> {
        self.pip(&["freeze"]).await
    }

    async fn pip_show(&self, name: &str) -> Result<String> {
        self.pip(&["show", name]).await
    }
}

/// List conda environments known to conda executable.
///
/// # Errors
///
/// - Return [`SourceError::MissingConda`] if conda executable does not exist.
/// - Return [`SourceError::Syscall`] if conda cannot be run.
/// - Return [`SourceError::EnvList`] if conda output is malformed.
pub async fn list_envs(conda_exe: impl AsRef<Path>) -> Result<Environments> {
    let conda_exe = conda_exe.as_ref();
    if !conda_exe.exists() {
        return Err(SourceError::MissingConda {
            path: conda_exe.to_path_buf(),
        });
    }

    let output = syscall_non_interactive(conda_exe, ["env", "list", "--json"]).await?;
    Environments::parse(&output)
}

/// Conda environments, as listed by `conda env list --json`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct Environments {
    envs: Vec<PathBuf>,
}

impl Environments {
    /// Parse conda environment listing.
    ///
    /// # Errors
    ///
    /// - Return [`SourceError::EnvList`] if listing is not valid JSON.
    pub fn parse(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Iterate through environment names and prefixes.
    ///
    /// The name of an environment is the last component of its prefix.
    pub fn iter(&self) -> impl Iterator<Item = (String, &Path)> {
        self.envs.iter().map(|prefix| {
            let name = prefix
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            (name, prefix.as_path())
        })
    }

    /// Resolve environment name or prefix into a listed prefix.
    ///
    /// Bare names must match the name of exactly one environment. Anything
    /// containing a path separator is treated as a prefix, and must be listed
    /// as is.
    ///
    /// # Errors
    ///
    /// - Return [`SourceError::UnknownEnv`] if environment is not listed.
    /// - Return [`SourceError::AmbiguousEnv`] if name matches more than one
    ///   environment.
    pub fn resolve(&self, env: &str) -> Result<PathBuf> {
        let is_name = Path::new(env)
            .parent()
            .is_none_or(|parent| parent.as_os_str().is_empty());

        if !is_name {
            return self
                .envs
                .iter()
                .find(|prefix| prefix.as_path() == Path::new(env))
                .cloned()
                .ok_or_else(|| SourceError::UnknownEnv { env: env.into() });
        }

        let mut matches = self
            .iter()
            .filter(|(name, _)| name == env)
            .map(|(_, prefix)| prefix.to_path_buf())
            .collect::<Vec<_>>();

        match matches.len() {
            0 => Err(SourceError::UnknownEnv { env: env.into() }),
            1 => Ok(matches.remove(0)),
            count => Err(SourceError::AmbiguousEnv {
                env: env.into(),
                count,
            }),
        }
    }
}

#[instrument(skip(args), level = "debug")]
async fn syscall_non_interactive(
    cmd: impl AsRef<OsStr> + Debug,
    args: impl IntoIterator<Item = impl AsRef<OsStr>>,
) -> Result<String> {
    let output = Command::new(cmd.as_ref()).args(args).output().await?;
    let stdout = String::from_utf8_lossy(output.stdout.as_slice()).into_owned();

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(output.stderr.as_slice()).into_owned();
        return Err(SourceError::Syscall(std::io::Error::other(format!(
            "command {:?} failed:\n{}",
            cmd.as_ref(),
            stderr.trim_end()
        ))));
    }

    Ok(stdout)
}

/// Package manager access error types.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// Conda executable cannot be found.
    #[error("conda executable {:?} does not exist", path.display())]
    MissingConda { path: PathBuf },

    /// Environment is not known to conda.
    #[error("cannot find conda environment {env:?}, try specifying its full prefix")]
    UnknownEnv { env: String },

    /// Environment name matches multiple environments.
    #[error("{count} conda environments go by the name {env:?}, try specifying its full prefix")]
    AmbiguousEnv { env: String, count: usize },

    /// Conda environment listing cannot be parsed.
    #[error("failed to parse conda environment listing")]
    EnvList(#[from] serde_json::Error),

    /// External package manager call fails.
    #[error(transparent)]
    Syscall(#[from] std::io::Error),
}

/// Friendly result alias :3
pub type Result<T, E = SourceError> = std::result::Result<T, E>;

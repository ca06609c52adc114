// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Installed package listings.
//!
//! Conda environments are often populated by two package managers at once:
//! conda itself, and pip running inside the environment. Conda snapshots
//! tend to miss packages installed by pip, and they never record where a
//! package installed straight from a Git remote came from. This module
//! combines what both package managers report into one listing that can be
//! used to reproduce the environment later on.
//!
//! # Listing Packages
//!
//! Packages reported by conda make up the __primary__ listing. Packages
//! reported by `pip freeze` make up the __secondary__ listing. The secondary
//! listing is [reconciled](reconcile) against the primary one so that only
//! packages that pip alone knows about get added to the final listing.
//!
//! # Environment Snapshots
//!
//! An environment snapshot is the `environment.yml` text produced by
//! `conda env export`, with its `pip:` section regenerated from the
//! reconciled listing. Packages installed from Git remotes are recorded by
//! remote rather than by version, so that they can be reinstalled from the
//! same source.

pub mod reconcile;
pub mod snapshot;
pub mod source;

use crate::packages::{
    reconcile::{reconcile, PackageIndex, Reconciliation},
    snapshot::{
        merged_listing, parse_conda_list, parse_pip_freeze, parse_pip_show, CondaExport,
        PYPI_CHANNEL,
    },
    source::PackageSource,
};

use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

/// Installed package record.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct Package {
    /// Name as reported by the package manager.
    pub name: String,

    /// Version string as reported by the package manager.
    pub version: String,

    /// Channel the package was installed from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,

    /// Source-control origin the package was installed from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote: Option<String>,
}

impl Package {
    /// Construct new package record.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            ..Default::default()
        }
    }

    /// Set channel of package record.
    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    /// Set remote of package record.
    pub fn with_remote(mut self, remote: impl Into<String>) -> Self {
        self.remote = Some(remote.into());
        self
    }

    /// Name of package after normalization.
    pub fn normalized_name(&self) -> String {
        normalize_name(&self.name)
    }
}

/// Normalize package name for cross-ecosystem matching.
///
/// Lowercases name, and collapses `_` into `-`.
pub fn normalize_name(name: &str) -> String {
    name.to_lowercase().replace('_', "-")
}

/// Combined package listing of an environment.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PackageListing {
    /// Primary packages plus secondary-only packages, sorted by name.
    pub packages: Vec<Package>,

    /// How the secondary listing was reconciled.
    pub reconciliation: Reconciliation,
}

/// List packages installed in environment by both conda and pip.
///
/// Queries conda and pip concurrently. Pip packages that conda does not know
/// about, and whose version pip freeze did not report, are looked up through
/// pip show before being reconciled.
///
/// # Errors
///
/// - Return [`PackagesError::Source`] if package manager cannot be queried.
/// - Return [`PackagesError::Snapshot`] if package manager output is malformed.
/// - Return [`PackagesError::MissingVersion`] if pip show reports no version.
#[instrument(skip(source), level = "debug")]
pub async fn list_packages(source: &impl PackageSource) -> Result<PackageListing> {
    let (conda_list, pip_freeze) = tokio::try_join!(source.conda_list(), source.pip_freeze())?;
    let primary = parse_conda_list(&conda_list)?;
    let index = PackageIndex::new(&primary);

    let candidates = parse_pip_freeze(&pip_freeze)
        .into_iter()
        .filter(|frozen| !index.contains(&frozen.name))
        .collect::<Vec<_>>();

    if candidates.is_empty() {
        info!("pip does not provide any extra packages");
        let reconciliation = Reconciliation::default();
        return Ok(PackageListing {
            packages: merged_listing(&primary, &reconciliation),
            reconciliation,
        });
    }

    let secondary = try_join_all(candidates.into_iter().map(|frozen| async move {
        let version = match &frozen.version {
            Some(version) => version.clone(),
            None => parse_pip_show(&source.pip_show(&frozen.name).await?).ok_or_else(|| {
                PackagesError::MissingVersion {
                    name: frozen.name.clone(),
                }
            })?,
        };

        Ok::<_, PackagesError>(frozen.into_package(version))
    }))
    .await?;

    let reconciliation = reconcile(&primary, &secondary);
    let packages = merged_listing(&primary, &reconciliation);

    Ok(PackageListing {
        packages,
        reconciliation,
    })
}

/// Produce `environment.yml` snapshot text of environment.
///
/// Regenerates the pip section of the conda export from the reconciled
/// package listing. If pip provides no extra packages, then the conda export
/// is returned untouched.
///
/// # Errors
///
/// - Return [`PackagesError::Source`] if package manager cannot be queried.
/// - Return [`PackagesError::Snapshot`] if package manager output is malformed,
///   or if a pip package has an unrecognized remote.
/// - Return [`PackagesError::MissingVersion`] if pip show reports no version.
#[instrument(skip(source), level = "debug")]
pub async fn env_snapshot(
    source: &impl PackageSource,
    generalize_git_remotes: bool,
) -> Result<String> {
    let (listing, export) = tokio::try_join!(list_packages(source), async {
        source.conda_export().await.map_err(PackagesError::from)
    })?;

    let pip = listing
        .packages
        .into_iter()
        .filter(|package| package.channel.as_deref() == Some(PYPI_CHANNEL))
        .collect::<Vec<_>>();

    if pip.is_empty() {
        return Ok(export);
    }

    info!("regenerate pip section with {} packages", pip.len());
    let export = CondaExport::parse(&export)?;

    Ok(export.render_with_pip(&pip, generalize_git_remotes)?)
}

/// Package listing error types.
#[derive(Debug, thiserror::Error)]
pub enum PackagesError {
    /// Package manager cannot be queried.
    #[error(transparent)]
    Source(#[from] crate::packages::source::SourceError),

    /// Package manager output cannot be parsed.
    #[error(transparent)]
    Snapshot(#[from] crate::packages::snapshot::SnapshotError),

    /// Pip show did not report a version for a package.
    #[error("pip does not report a version for {name:?}")]
    MissingVersion { name: String },
}

/// Friendly result alias :3
pub type Result<T, E = PackagesError> = std::result::Result<T, E>;

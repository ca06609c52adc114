// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Package listing reconciliation.
//!
//! Two package managers installing into the same environment rarely agree on
//! what they installed. Conda knows nothing about packages installed by pip,
//! and pip happily lists everything that conda put there too, sometimes under
//! a slightly different name, e.g., `ruamel_yaml` versus `ruamel-yaml`.
//!
//! Reconciliation figures out which entries of a __secondary__ listing are not
//! already represented in a __primary__ listing. It happens in two phases:
//!
//! 1. Names are normalized by lowercasing them and collapsing `_` into `-`.
//!    Any secondary entry whose normalized name appears in the primary
//!    listing is considered present.
//! 2. Every remaining candidate is compared against primary entries sharing
//!    its exact version string. If either normalized name contains the other,
//!    then the candidate is treated as a duplicate and dropped. Each of these
//!    drops is reported as a [`NameConflict`] instead of happening silently.
//!
//! # Pitfalls
//!
//! Phase two is a heuristic. Short names that coincidentally share a version
//! with a longer name containing them will be suppressed, e.g., `yaml` 6.0
//! against `pyyaml` 6.0. That is why conflicts are always reported back.

use crate::packages::{normalize_name, Package};

use serde::Serialize;
use std::{
    collections::HashSet,
    fmt::{Display, Formatter, Result as FmtResult},
};
use tracing::{debug, instrument, warn};

/// Reconcile secondary listing against primary listing.
///
/// Never fails. Secondary-only entries keep their original ordering along
/// with their remote.
#[instrument(skip_all, level = "debug")]
pub fn reconcile(primary: &[Package], secondary: &[Package]) -> Reconciliation {
    // INVARIANT: Nothing to compare against means everything is secondary-only.
    if primary.is_empty() {
        return Reconciliation {
            secondary_only: secondary.to_vec(),
            conflicts: Vec::new(),
        };
    }

    let index = PackageIndex::new(primary);
    let mut result = Reconciliation::default();

    for candidate in secondary.iter().filter(|package| !index.contains(&package.name)) {
        let normalized = candidate.normalized_name();
        let claimed = primary
            .iter()
            .filter(|package| package.version == candidate.version)
            .find(|package| {
                let other = package.normalized_name();
                other.contains(&normalized) || normalized.contains(&other)
            });

        match claimed {
            Some(package) => {
                let conflict = NameConflict {
                    primary: package.name.clone(),
                    secondary: candidate.name.clone(),
                    version: candidate.version.clone(),
                };
                warn!("{conflict}");
                result.conflicts.push(conflict);
            }
            None => result.secondary_only.push(candidate.clone()),
        }
    }

    debug!(
        "{} secondary-only packages, {} conflicts",
        result.secondary_only.len(),
        result.conflicts.len()
    );

    result
}

/// Set of normalized package names.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PackageIndex {
    names: HashSet<String>,
}

impl PackageIndex {
    /// Construct new index from package listing.
    pub fn new<'a>(packages: impl IntoIterator<Item = &'a Package>) -> Self {
        Self {
            names: packages
                .into_iter()
                .map(Package::normalized_name)
                .collect(),
        }
    }

    /// Check if name is present after normalization.
    pub fn contains(&self, name: impl AsRef<str>) -> bool {
        self.names.contains(&normalize_name(name.as_ref()))
    }
}

/// Result of reconciling two package listings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reconciliation {
    /// Secondary entries with no counterpart in primary listing.
    pub secondary_only: Vec<Package>,

    /// Secondary entries dropped by version disambiguation.
    pub conflicts: Vec<NameConflict>,
}

/// Ambiguous pairing between a primary and a secondary package.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NameConflict {
    /// Name of primary package claiming the candidate.
    pub primary: String,

    /// Name of dropped secondary package.
    pub secondary: String,

    /// Version string both packages share.
    pub version: String,
}

impl Display for NameConflict {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        write!(
            fmt,
            "potential name conflict: {:?} from primary and {:?} from secondary share version {}, \
             treating {:?} as already present",
            self.primary, self.secondary, self.version, self.secondary
        )
    }
}

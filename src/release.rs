// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Release listing inspection.
//!
//! Works on the [flattened](crate::flatten) records of a GitHub release
//! listing, i.e., the JSON array returned by the `releases` endpoint of a
//! repository. Nothing here talks to the network, the listing must already
//! be on hand.
//!
//! Release tags rarely consist of the version alone. A [`TagPattern`]
//! describes how to pick the version out of a tag through three regular
//! expressions: a prefix, the version itself, and a suffix. For example,
//! geckodriver tags its releases as `v0.34.0`, which is prefix `v` followed
//! by version `\d+\.\d+\.\d+`.
//!
//! # Asset Types
//!
//! A release usually ships multiple assets, one per platform or packaging
//! format. The __asset type__ pattern is a regular expression whose first
//! capture group names the flavor of an asset. Two placeholders are expanded
//! before the pattern is compiled:
//!
//! - `{VERSION}` becomes the escaped version, e.g., `0\.34\.0`.
//! - `{VERSION_TAG}` becomes the escaped tag, e.g., `v0\.34\.0`.
//!
//! Thus, `{VERSION_TAG}-(.*)$` turns `geckodriver-v0.34.0-win64.zip` into
//! asset type `win64.zip`.

use crate::flatten::{FlatRecord, Segment};

use regex::Regex;
use serde::Serialize;
use tracing::{debug, info, instrument};

const TAG_NAME_PATH: &str = r#"[*]["tag_name"]"#;
const ASSET_NAME_PATH: &str = r#"[*]["assets"][*]["name"]"#;

/// Regular expressions locating the version inside a release tag.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TagPattern {
    /// Leading part of tag to strip, e.g., `v`.
    pub prefix: String,

    /// Version itself.
    pub version: String,

    /// Trailing part of tag to strip.
    pub suffix: String,
}

impl TagPattern {
    /// Construct new tag pattern with no prefix or suffix.
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            ..Default::default()
        }
    }

    /// Set prefix of tag pattern.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Set suffix of tag pattern.
    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = suffix.into();
        self
    }
}

/// Versions of a release listing, in listing order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseVersions {
    /// Versions with tag prefix and suffix stripped.
    pub release_versions: Vec<String>,

    /// Full tag names, parallel to versions.
    pub tag_names: Vec<String>,
}

impl ReleaseVersions {
    /// Version of most recent release.
    ///
    /// GitHub lists newest releases first.
    pub fn latest(&self) -> Option<&str> {
        self.release_versions.first().map(String::as_str)
    }

    /// Tag name of a version.
    pub fn tag_of(&self, version: &str) -> Option<&str> {
        self.release_versions
            .iter()
            .position(|listed| listed == version)
            .map(|index| self.tag_names[index].as_str())
    }
}

/// Collect release versions whose tag fits pattern.
///
/// Only values at generalized path `[*]["tag_name"]` are considered. A tag
/// fits if it starts with prefix, version, and suffix in that order.
///
/// # Errors
///
/// - Return [`ReleaseError::Regex`] if any part of pattern is not a valid
///   regular expression.
#[instrument(skip(records), level = "debug")]
pub fn release_versions(records: &[FlatRecord], pattern: &TagPattern) -> Result<ReleaseVersions> {
    let TagPattern {
        prefix,
        version,
        suffix,
    } = pattern;
    let tag = Regex::new(&format!("^(?:{prefix})(?:{version})(?:{suffix})"))?;
    let leading = Regex::new(&format!("^(?:{prefix})"))?;
    let trailing = Regex::new(&format!("(?:{suffix})$"))?;

    let mut result = ReleaseVersions::default();
    for record in records
        .iter()
        .filter(|record| record.full_path_generalized == TAG_NAME_PATH)
        .filter(|record| tag.is_match(&record.value))
    {
        let stripped = leading.replace(&record.value, "");
        let stripped = trailing.replace(&stripped, "");
        result.release_versions.push(stripped.into_owned());
        result.tag_names.push(record.value.clone());
    }

    debug!("found versions {:?}", result.release_versions);

    Ok(result)
}

/// Which release asset to look for.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AssetQuery {
    /// Tag pattern of release listing.
    pub tag: TagPattern,

    /// Release version, or the latest release if absent.
    pub version: Option<String>,

    /// Asset type pattern, with `{VERSION}` and `{VERSION_TAG}` placeholders.
    pub asset_type: String,

    /// Asset type to pick, as captured by asset type pattern.
    pub asset_version: String,
}

/// Located release asset.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseAsset {
    pub name: String,
    pub id: String,
    pub api_url: String,
    pub browser_download_url: String,
    pub version: String,
    pub version_tag: String,
}

/// Locate release asset in release listing.
///
/// # Errors
///
/// - Return [`ReleaseError::NoReleases`] if no tag fits tag pattern.
/// - Return [`ReleaseError::UnknownVersion`] if requested version is not
///   listed.
/// - Return [`ReleaseError::UnknownAssetVersion`] if no asset of requested
///   version has the requested asset type.
/// - Return [`ReleaseError::MissingField`] if matched asset lacks a field.
/// - Return [`ReleaseError::Regex`] if any pattern is not a valid regular
///   expression.
#[instrument(skip(records), level = "debug")]
pub fn release_asset(records: &[FlatRecord], query: &AssetQuery) -> Result<ReleaseAsset> {
    let versions = release_versions(records, &query.tag)?;
    let version = match (&query.version, versions.latest()) {
        (Some(version), _) => version.clone(),
        (None, Some(latest)) => {
            info!("no version given, using latest version {latest:?}");
            latest.to_owned()
        }
        (None, None) => return Err(ReleaseError::NoReleases),
    };

    let version_tag = versions
        .tag_of(&version)
        .ok_or_else(|| ReleaseError::UnknownVersion {
            version: version.clone(),
        })?
        .to_owned();

    let asset_type = Regex::new(
        &query
            .asset_type
            .replace("{VERSION_TAG}", &regex::escape(&version_tag))
            .replace("{VERSION}", &regex::escape(&version)),
    )?;

    let candidates = records
        .iter()
        .filter(|record| record.full_path_generalized == ASSET_NAME_PATH)
        .filter(|record| record.value.contains(&version))
        .filter_map(|record| {
            asset_type
                .captures(&record.value)
                .and_then(|captures| captures.get(1))
                .map(|flavor| (flavor.as_str(), record))
        })
        .collect::<Vec<_>>();

    let Some((_, asset)) = candidates
        .iter()
        .find(|(flavor, _)| *flavor == query.asset_version)
    else {
        return Err(ReleaseError::UnknownAssetVersion {
            asset_version: query.asset_version.clone(),
            available: candidates
                .iter()
                .map(|(flavor, _)| flavor.to_string())
                .collect(),
        });
    };

    let name_segment = Segment::Field("name".into()).to_string();
    let base = asset
        .full_path
        .strip_suffix(name_segment.as_str())
        .unwrap_or(asset.full_path.as_str());
    debug!("matched asset at {base}");

    Ok(ReleaseAsset {
        name: asset.value.clone(),
        id: field(records, base, "id")?,
        api_url: field(records, base, "url")?,
        browser_download_url: field(records, base, "browser_download_url")?,
        version,
        version_tag,
    })
}

fn field(records: &[FlatRecord], base: &str, name: &str) -> Result<String> {
    let path = format!("{base}{}", Segment::Field(name.into()));
    records
        .iter()
        .find(|record| record.full_path == path)
        .map(|record| record.value.clone())
        .ok_or(ReleaseError::MissingField { path })
}

/// Release listing inspection error types.
#[derive(Debug, thiserror::Error)]
pub enum ReleaseError {
    /// No release tag fits tag pattern.
    #[error("no release tags fit the tag pattern")]
    NoReleases,

    /// Requested version is not listed.
    #[error("version {version:?} is not listed, older releases may need a bigger listing")]
    UnknownVersion { version: String },

    /// Requested asset type is not available.
    #[error("asset type {asset_version:?} is not available, must be one of {available:?}")]
    UnknownAssetVersion {
        asset_version: String,
        available: Vec<String>,
    },

    /// Matched asset lacks an expected field.
    #[error("release asset has no value at {path}")]
    MissingField { path: String },

    /// Pattern is not a valid regular expression.
    #[error(transparent)]
    Regex(#[from] regex::Error),
}

/// Friendly result alias :3
pub type Result<T, E = ReleaseError> = std::result::Result<T, E>;

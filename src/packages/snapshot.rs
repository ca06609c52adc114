// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Package manager output parsing.
//!
//! Parse the text that conda and pip print out into package records, and
//! render environment snapshots back out. Running the package managers is
//! left to the caller to figure out.
//!
//! # Conda Export Layout
//!
//! The output of `conda env export` looks like this:
//!
//! ```text
//! name: analysis
//! channels:
//!   - conda-forge
//! dependencies:
//!   - numpy=1.26.4
//!   - pip=24.0
//!   - pip:
//!     - requests==2.31.0
//! prefix: /opt/conda/envs/analysis
//! ```
//!
//! The conda dependencies are kept as is when rendering a new snapshot. The
//! pip section is always regenerated at the end of the dependency block.
//! Top-level sections after that block, like `variables:` and the `prefix: `
//! line, are appended after it untouched.

use crate::packages::{reconcile::Reconciliation, Package};

use tracing::warn;

/// Channel name given to packages installed through pip.
pub const PYPI_CHANNEL: &str = "pypi";

const DEPENDENCIES_MARKER: &str = "dependencies:";
const PIP_MARKER: &str = "  - pip:";
const PREFIX_MARKER: &str = "prefix: ";

/// Parsed `conda env export` output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CondaExport {
    head: Vec<String>,
    trailer: Vec<String>,
}

impl CondaExport {
    /// Parse conda export text.
    ///
    /// The dependency block runs from the `dependencies:` line up to the next
    /// top-level line. Any top-level sections after it, e.g., `variables:`,
    /// are kept along with the `prefix: ` line.
    ///
    /// # Errors
    ///
    /// - Return [`SnapshotError::MissingMarker`] if the dependency block or
    ///   prefix line cannot be found.
    /// - Return [`SnapshotError::MalformedDependency`] if a dependency line
    ///   does not pin a version.
    pub fn parse(text: &str) -> Result<Self> {
        let lines = text.lines().collect::<Vec<_>>();

        let start = lines
            .iter()
            .position(|line| line.starts_with(DEPENDENCIES_MARKER))
            .ok_or(SnapshotError::MissingMarker {
                marker: DEPENDENCIES_MARKER,
            })?
            + 1;
        let end = lines[start..]
            .iter()
            .position(|line| !line.is_empty() && !line.starts_with(' '))
            .map_or(lines.len(), |offset| start + offset);

        // INVARIANT: Prefix line must come after the dependency block.
        if !lines[end..].iter().any(|line| line.starts_with(PREFIX_MARKER)) {
            return Err(SnapshotError::MissingMarker {
                marker: PREFIX_MARKER,
            });
        }

        let mut head = lines[..start]
            .iter()
            .map(|line| line.to_string())
            .collect::<Vec<_>>();
        let mut in_pip = false;
        for line in &lines[start..end] {
            if line.trim().is_empty() {
                continue;
            }

            // INVARIANT: Old pip section is dropped, it gets regenerated.
            if line.starts_with(PIP_MARKER) {
                in_pip = true;
                continue;
            }
            if in_pip && line.starts_with("    ") {
                continue;
            }
            in_pip = false;

            parse_conda_dependency(line)?;
            head.push(line.to_string());
        }

        Ok(Self {
            head,
            trailer: lines[end..].iter().map(|line| line.to_string()).collect(),
        })
    }

    /// Render export with regenerated pip section.
    ///
    /// # Errors
    ///
    /// - Return [`SnapshotError::UnrecognizedRemote`] if a package was
    ///   installed from a remote that is not a Git remote.
    pub fn render_with_pip(&self, pip: &[Package], generalize_git_remotes: bool) -> Result<String> {
        let mut lines = self.head.clone();
        lines.push(PIP_MARKER.into());
        for package in pip {
            lines.push(pip_dependency_line(package, generalize_git_remotes)?);
        }
        lines.extend(self.trailer.iter().cloned());

        Ok(lines.join("\n"))
    }
}

fn parse_conda_dependency(line: &str) -> Result<Package> {
    let entry = line.trim().trim_start_matches('-').trim();
    let mut fields = entry.split('=');
    match (fields.next(), fields.next()) {
        (Some(name), Some(version)) if !name.is_empty() => Ok(Package::new(name, version)),
        _ => Err(SnapshotError::MalformedDependency { line: line.into() }),
    }
}

/// Parse `conda list --json` output into primary package listing.
///
/// Packages conda reports from the pypi channel are left out, because pip is
/// the one that actually manages them.
///
/// # Errors
///
/// - Return [`SnapshotError::CondaList`] if output is not a JSON listing.
pub fn parse_conda_list(json: &str) -> Result<Vec<Package>> {
    let packages: Vec<Package> = serde_json::from_str(json)?;

    Ok(packages
        .into_iter()
        .filter(|package| package.channel.as_deref() != Some(PYPI_CHANNEL))
        .collect())
}

/// Package entry reported by `pip freeze`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FrozenPackage {
    /// Name of package.
    pub name: String,

    /// Pinned version, if pip freeze reported one.
    pub version: Option<String>,

    /// Remote package was installed from.
    pub remote: Option<String>,
}

impl FrozenPackage {
    /// Convert into package record with given version.
    pub fn into_package(self, version: impl Into<String>) -> Package {
        Package {
            name: self.name,
            version: version.into(),
            channel: Some(PYPI_CHANNEL.into()),
            remote: self.remote,
        }
    }
}

/// Parse `pip freeze` output.
///
/// Understands `name==version`, `name @ remote`, and editable
/// `-e remote#egg=name` lines. Local `file:///` remotes are not recorded,
/// because they cannot be used to reinstall package elsewhere.
pub fn parse_pip_freeze(text: &str) -> Vec<FrozenPackage> {
    let mut packages = Vec::new();

    for line in text.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let frozen = if let Some(remote) = line.strip_prefix("-e ") {
            let remote = remote.trim();
            let Some((_, name)) = remote.split_once("#egg=") else {
                warn!("skip editable requirement without egg name: {line}");
                continue;
            };
            FrozenPackage {
                name: name.into(),
                version: None,
                remote: remote_of(remote),
            }
        } else if let Some((name, remote)) = line.split_once(" @ ") {
            FrozenPackage {
                name: name.trim().into(),
                version: None,
                remote: remote_of(remote.trim()),
            }
        } else if let Some((name, version)) = line.split_once("==") {
            FrozenPackage {
                name: name.trim().into(),
                version: Some(version.trim().into()),
                remote: None,
            }
        } else {
            FrozenPackage {
                name: line.into(),
                version: None,
                remote: None,
            }
        };

        packages.push(frozen);
    }

    packages
}

fn remote_of(remote: &str) -> Option<String> {
    (!remote.starts_with("file:///")).then(|| remote.to_owned())
}

/// Parse version reported by `pip show`.
pub fn parse_pip_show(text: &str) -> Option<String> {
    text.lines()
        .find_map(|line| line.trim().strip_prefix("Version:"))
        .map(|version| version.trim().to_owned())
        .filter(|version| !version.is_empty())
}

/// Render pip dependency line of `environment.yml`.
///
/// Packages without a remote are pinned by version. Packages with a Git
/// remote are listed by remote. Generalizing a Git remote drops the trailing
/// `@<ref>`, so the branch or commit that happened to be installed is not
/// pinned. A `#egg=` fragment is kept.
///
/// # Errors
///
/// - Return [`SnapshotError::UnrecognizedRemote`] if remote is not a Git remote.
pub fn pip_dependency_line(package: &Package, generalize_git_remotes: bool) -> Result<String> {
    match package.remote.as_deref() {
        None => Ok(format!("    - {}=={}", package.name, package.version)),
        Some(remote) if remote.starts_with("git+") => {
            if generalize_git_remotes {
                Ok(format!("    - {}", strip_git_ref(remote)))
            } else {
                Ok(format!("    - {remote}"))
            }
        }
        Some(remote) => Err(SnapshotError::UnrecognizedRemote {
            name: package.name.clone(),
            remote: remote.into(),
        }),
    }
}

fn strip_git_ref(remote: &str) -> String {
    let (url, fragment) = match remote.split_once('#') {
        Some((url, fragment)) => (url, Some(fragment)),
        None => (remote, None),
    };

    let url = match url.rsplit_once('@') {
        // INVARIANT: Keep the user part of ssh remotes like git+ssh://git@host/repo.
        Some((base, reference)) if !reference.contains('/') => base,
        _ => url,
    };

    match fragment {
        Some(fragment) => format!("{url}#{fragment}"),
        None => url.to_owned(),
    }
}

/// Merge primary listing with secondary-only packages.
///
/// Secondary-only packages are renamed to lowercase and labeled with the
/// pypi channel. The result is sorted by name.
pub fn merged_listing(primary: &[Package], reconciliation: &Reconciliation) -> Vec<Package> {
    let mut merged = primary.to_vec();
    merged.extend(
        reconciliation
            .secondary_only
            .iter()
            .map(|package| Package {
                name: package.name.to_lowercase(),
                channel: Some(PYPI_CHANNEL.into()),
                ..package.clone()
            }),
    );
    merged.sort_by(|left, right| left.name.cmp(&right.name));

    merged
}

/// Package manager output parsing error types.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// Expected section marker is missing from conda export.
    #[error("conda export does not contain {marker:?}")]
    MissingMarker { marker: &'static str },

    /// Conda dependency line does not pin a version.
    #[error("malformed conda dependency line {line:?}")]
    MalformedDependency { line: String },

    /// Conda listing is not valid JSON.
    #[error("failed to parse conda listing")]
    CondaList(#[from] serde_json::Error),

    /// Pip package was installed from a remote that cannot be reproduced.
    #[error("remote {remote:?} of {name:?} is not recognized, expected no remote or a git remote")]
    UnrecognizedRemote { name: String, remote: String },
}

/// Friendly result alias :3
pub type Result<T, E = SnapshotError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use simple_test_case::test_case;

    const EXPORT_WITH_PIP: &str = indoc! {r#"
        name: analysis
        channels:
          - conda-forge
        dependencies:
          - numpy=1.26.4=py311h64a7726_0
          - pip=24.0
          - pip:
            - stale==0.1
        prefix: /opt/conda/envs/analysis
    "#};

    const EXPORT_WITHOUT_PIP: &str = indoc! {r#"
        name: analysis
        channels:
          - conda-forge
        dependencies:
          - numpy=1.26.4
          - python=3.11.8
        prefix: /opt/conda/envs/analysis
    "#};

    const EXPORT_WITH_VARIABLES: &str = indoc! {r#"
        name: analysis
        channels:
          - conda-forge
        dependencies:
          - gdal=3.8.4
          - pip=24.0
          - pip:
            - stale==0.1
        variables:
          GDAL_DATA: /opt/conda/envs/analysis/share/gdal
        prefix: /opt/conda/envs/analysis
    "#};

    #[test]
    fn conda_export_handles_crlf_line_endings() -> anyhow::Result<()> {
        let export = CondaExport::parse(&EXPORT_WITHOUT_PIP.replace('\n', "\r\n"))?;
        assert_eq!(export, CondaExport::parse(EXPORT_WITHOUT_PIP)?);

        Ok(())
    }

    #[test]
    fn conda_export_render_keeps_variables_section() -> anyhow::Result<()> {
        let export = CondaExport::parse(EXPORT_WITH_VARIABLES)?;
        let result = export.render_with_pip(&[Package::new("tqdm", "4.66.2")], false)?;
        let expect = indoc! {r#"
            name: analysis
            channels:
              - conda-forge
            dependencies:
              - gdal=3.8.4
              - pip=24.0
              - pip:
                - tqdm==4.66.2
            variables:
              GDAL_DATA: /opt/conda/envs/analysis/share/gdal
            prefix: /opt/conda/envs/analysis"#};
        assert_eq!(result, expect);

        Ok(())
    }

    #[test]
    fn conda_export_render_keeps_variables_without_pip_section() -> anyhow::Result<()> {
        let text = EXPORT_WITH_VARIABLES.replace("  - pip:\n    - stale==0.1\n", "");
        let export = CondaExport::parse(&text)?;
        let result = export.render_with_pip(&[Package::new("tqdm", "4.66.2")], false)?;
        let expect = indoc! {r#"
            name: analysis
            channels:
              - conda-forge
            dependencies:
              - gdal=3.8.4
              - pip=24.0
              - pip:
                - tqdm==4.66.2
            variables:
              GDAL_DATA: /opt/conda/envs/analysis/share/gdal
            prefix: /opt/conda/envs/analysis"#};
        assert_eq!(result, expect);

        Ok(())
    }

    #[test]
    fn conda_export_render_replaces_pip_section() -> anyhow::Result<()> {
        let export = CondaExport::parse(EXPORT_WITH_PIP)?;
        let pip = vec![
            Package::new("requests", "2.31.0"),
            Package::new("marcpy", "0.0.1")
                .with_remote("git+https://github.com/MARC-KC/marcpy@main"),
        ];

        let result = export.render_with_pip(&pip, false)?;
        let expect = indoc! {r#"
            name: analysis
            channels:
              - conda-forge
            dependencies:
              - numpy=1.26.4=py311h64a7726_0
              - pip=24.0
              - pip:
                - requests==2.31.0
                - git+https://github.com/MARC-KC/marcpy@main
            prefix: /opt/conda/envs/analysis"#};
        assert_eq!(result, expect);

        Ok(())
    }

    #[test]
    fn conda_export_render_adds_missing_pip_section() -> anyhow::Result<()> {
        let export = CondaExport::parse(EXPORT_WITHOUT_PIP)?;
        let result = export.render_with_pip(&[Package::new("tqdm", "4.66.2")], false)?;
        let expect = indoc! {r#"
            name: analysis
            channels:
              - conda-forge
            dependencies:
              - numpy=1.26.4
              - python=3.11.8
              - pip:
                - tqdm==4.66.2
            prefix: /opt/conda/envs/analysis"#};
        assert_eq!(result, expect);

        Ok(())
    }

    #[test]
    fn conda_export_errors() {
        assert!(matches!(
            CondaExport::parse("name: x\nprefix: /x\n"),
            Err(SnapshotError::MissingMarker {
                marker: DEPENDENCIES_MARKER
            })
        ));
        assert!(matches!(
            CondaExport::parse("dependencies:\n  - numpy=1\n"),
            Err(SnapshotError::MissingMarker {
                marker: PREFIX_MARKER
            })
        ));
        assert!(matches!(
            CondaExport::parse("dependencies:\n  - numpy\nprefix: /x\n"),
            Err(SnapshotError::MalformedDependency { .. })
        ));
    }

    #[test]
    fn conda_list_skips_pypi_channel() -> anyhow::Result<()> {
        let json = r#"[
            {"name": "numpy", "version": "1.26.4", "channel": "conda-forge", "build_string": "x"},
            {"name": "requests", "version": "2.31.0", "channel": "pypi"}
        ]"#;

        assert_eq!(
            parse_conda_list(json)?,
            vec![Package::new("numpy", "1.26.4").with_channel("conda-forge")]
        );
        assert!(matches!(parse_conda_list("{"), Err(SnapshotError::CondaList(_))));

        Ok(())
    }

    #[test]
    fn pip_freeze_understands_every_line_kind() {
        let text = indoc! {r#"
            # Editable install with no version control (foo==1.0)
            requests==2.31.0
            marcpy @ git+https://github.com/MARC-KC/marcpy@abc123
            localpkg @ file:///C:/Users/me/localpkg
            -e git+https://github.com/org/tool@main#egg=tool
            -e /home/me/unnamed
            bare
        "#};

        let expect = vec![
            FrozenPackage {
                name: "requests".into(),
                version: Some("2.31.0".into()),
                remote: None,
            },
            FrozenPackage {
                name: "marcpy".into(),
                version: None,
                remote: Some("git+https://github.com/MARC-KC/marcpy@abc123".into()),
            },
            FrozenPackage {
                name: "localpkg".into(),
                version: None,
                remote: None,
            },
            FrozenPackage {
                name: "tool".into(),
                version: None,
                remote: Some("git+https://github.com/org/tool@main#egg=tool".into()),
            },
            FrozenPackage {
                name: "bare".into(),
                version: None,
                remote: None,
            },
        ];
        assert_eq!(parse_pip_freeze(text), expect);
    }

    #[test]
    fn pip_show_reports_version() {
        let text = "Name: requests\r\nVersion: 2.31.0\r\nSummary: HTTP for Humans.\r\n";
        assert_eq!(parse_pip_show(text), Some("2.31.0".into()));
        assert_eq!(parse_pip_show("Name: requests\n"), None);
    }

    #[test_case(None, false, "    - requests==2.31.0"; "pinned version")]
    #[test_case(Some("git+https://github.com/o/r@abc123"), false, "    - git+https://github.com/o/r@abc123"; "exact git remote")]
    #[test_case(Some("git+https://github.com/o/r@abc123"), true, "    - git+https://github.com/o/r"; "generalized git remote")]
    #[test_case(Some("git+ssh://git@github.com/o/r"), true, "    - git+ssh://git@github.com/o/r"; "ssh remote without ref")]
    #[test_case(Some("git+ssh://git@github.com/o/r@v1"), true, "    - git+ssh://git@github.com/o/r"; "ssh remote with ref")]
    #[test_case(Some("git+https://github.com/org/tool@main#egg=tool"), true, "    - git+https://github.com/org/tool#egg=tool"; "generalized remote keeps egg fragment")]
    #[test]
    fn pip_dependency_line_renders(remote: Option<&str>, generalize: bool, expect: &str) {
        let mut package = Package::new("requests", "2.31.0");
        package.remote = remote.map(str::to_owned);

        pretty_assertions::assert_eq!(
            pip_dependency_line(&package, generalize).unwrap(),
            expect
        );
    }

    #[test]
    fn pip_dependency_line_rejects_unknown_remote() {
        let package = Package::new("thing", "1.0").with_remote("https://example.org/thing.zip");
        assert!(matches!(
            pip_dependency_line(&package, false),
            Err(SnapshotError::UnrecognizedRemote { .. })
        ));
    }

    #[test]
    fn merged_listing_labels_and_sorts() {
        let primary = vec![Package::new("zlib", "1.2"), Package::new("numpy", "1.26.4")];
        let reconciliation = Reconciliation {
            secondary_only: vec![Package::new("Requests", "2.31.0").with_remote("git+https://x/r")],
            conflicts: Vec::new(),
        };

        let expect = vec![
            Package::new("numpy", "1.26.4"),
            Package::new("requests", "2.31.0")
                .with_channel(PYPI_CHANNEL)
                .with_remote("git+https://x/r"),
            Package::new("zlib", "1.2"),
        ];
        assert_eq!(merged_listing(&primary, &reconciliation), expect);
    }
}

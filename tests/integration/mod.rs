// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::SourceFixture;

use anyhow::Result;
use indoc::indoc;
use pretty_assertions::assert_eq;
use toolbelt::{
    flatten::{flatten, lookup},
    packages::{
        env_snapshot, list_packages, reconcile::NameConflict, snapshot::SnapshotError, Package,
        PackagesError,
    },
};

const CONDA_LIST: &str = r#"[
    {"name": "numpy", "version": "1.26.4", "channel": "conda-forge", "build_string": "py311h64a7726_0"},
    {"name": "ruamel_yaml", "version": "0.17.21", "channel": "conda-forge"},
    {"name": "python-dateutil", "version": "2.8.2", "channel": "conda-forge"},
    {"name": "pip", "version": "24.0", "channel": "conda-forge"},
    {"name": "requests", "version": "2.31.0", "channel": "pypi"}
]"#;

const PIP_FREEZE: &str = indoc! {"
    numpy==1.26.4
    ruamel-yaml==0.17.21
    DateUtil==2.8.2
    requests==2.31.0
    marcpy @ git+https://github.com/MARC-KC/marcpy@0a1b2c3
"};

const PIP_SHOW_MARCPY: &str = indoc! {"
    Name: marcpy
    Version: 0.0.1
    Summary: MARC python helpers
"};

const CONDA_EXPORT: &str = indoc! {"
    name: analysis
    channels:
      - conda-forge
    dependencies:
      - numpy=1.26.4
      - pip=24.0
      - python-dateutil=2.8.2
      - ruamel_yaml=0.17.21
      - pip:
        - requests==2.31.0
    prefix: /opt/conda/envs/analysis
"};

fn fixture() -> SourceFixture {
    SourceFixture::new(CONDA_LIST, PIP_FREEZE)
        .with_conda_export(CONDA_EXPORT)
        .with_pip_show("marcpy", PIP_SHOW_MARCPY)
}

#[tokio::test]
async fn list_packages_merges_pip_only_packages() -> Result<()> {
    let source = fixture();
    let listing = list_packages(&source).await?;

    let expect = vec![
        Package::new("marcpy", "0.0.1")
            .with_channel("pypi")
            .with_remote("git+https://github.com/MARC-KC/marcpy@0a1b2c3"),
        Package::new("numpy", "1.26.4").with_channel("conda-forge"),
        Package::new("pip", "24.0").with_channel("conda-forge"),
        Package::new("python-dateutil", "2.8.2").with_channel("conda-forge"),
        Package::new("requests", "2.31.0").with_channel("pypi"),
        Package::new("ruamel_yaml", "0.17.21").with_channel("conda-forge"),
    ];
    assert_eq!(listing.packages, expect);
    assert_eq!(
        listing.reconciliation.conflicts,
        vec![NameConflict {
            primary: "python-dateutil".into(),
            secondary: "DateUtil".into(),
            version: "2.8.2".into(),
        }]
    );

    // INVARIANT: Only packages missing a pinned version get looked up.
    assert_eq!(source.shown(), vec!["marcpy"]);

    Ok(())
}

#[tokio::test]
async fn list_packages_without_pip_only_packages() -> Result<()> {
    let source = SourceFixture::new(CONDA_LIST, "numpy==1.26.4\nRuamel_Yaml==0.17.21\n");
    let listing = list_packages(&source).await?;

    let names = listing
        .packages
        .iter()
        .map(|package| package.name.as_str())
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["numpy", "pip", "python-dateutil", "ruamel_yaml"]);
    assert!(listing.reconciliation.secondary_only.is_empty());
    assert!(source.shown().is_empty());

    Ok(())
}

#[tokio::test]
async fn list_packages_requires_pip_show_version() {
    let source = SourceFixture::new(CONDA_LIST, "mystery @ git+https://example.org/mystery\n");
    let result = list_packages(&source).await;

    assert!(matches!(result, Err(PackagesError::MissingVersion { name }) if name == "mystery"));
}

#[tokio::test]
async fn env_snapshot_regenerates_pip_section() -> Result<()> {
    let result = env_snapshot(&fixture(), false).await?;
    let expect = indoc! {"
        name: analysis
        channels:
          - conda-forge
        dependencies:
          - numpy=1.26.4
          - pip=24.0
          - python-dateutil=2.8.2
          - ruamel_yaml=0.17.21
          - pip:
            - git+https://github.com/MARC-KC/marcpy@0a1b2c3
            - requests==2.31.0
        prefix: /opt/conda/envs/analysis"};
    assert_eq!(result, expect);

    Ok(())
}

#[tokio::test]
async fn env_snapshot_generalizes_git_remotes() -> Result<()> {
    let result = env_snapshot(&fixture(), true).await?;
    assert!(result.contains("\n    - git+https://github.com/MARC-KC/marcpy\n"));
    assert!(!result.contains("0a1b2c3"));

    Ok(())
}

#[tokio::test]
async fn env_snapshot_keeps_export_without_pip_only_packages() -> Result<()> {
    let source = SourceFixture::new(CONDA_LIST, "numpy==1.26.4\n").with_conda_export(CONDA_EXPORT);
    let result = env_snapshot(&source, false).await?;
    assert_eq!(result, CONDA_EXPORT);

    Ok(())
}

#[tokio::test]
async fn env_snapshot_rejects_unrecognized_remote() {
    let source = SourceFixture::new(CONDA_LIST, "thing @ https://example.org/thing.zip\n")
        .with_conda_export(CONDA_EXPORT)
        .with_pip_show("thing", "Version: 1.0\n");
    let result = env_snapshot(&source, false).await;

    assert!(matches!(
        result,
        Err(PackagesError::Snapshot(SnapshotError::UnrecognizedRemote { .. }))
    ));
}

#[test]
fn flattened_paths_lead_back_to_their_values() -> Result<()> {
    let document: serde_json::Value = serde_json::from_str(indoc! {r#"
        [
            {"tag_name": "v1.0.0", "assets": [{"id": 7, "name": "tool.zip", "size": null}]},
            {"tag_name": "v0.9.0", "assets": [], "draft": false}
        ]
    "#})?;

    for record in flatten(&document)? {
        let value = lookup(&document, &record.full_path).expect("path resolves");
        let text = match value {
            serde_json::Value::String(text) => text.clone(),
            other => other.to_string(),
        };
        assert_eq!(record.value, text);
    }

    Ok(())
}

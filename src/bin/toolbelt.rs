// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use toolbelt::{
    config::ToolbeltConfig,
    flatten::{flatten_at, FlatRecord},
    packages::{
        env_snapshot, list_packages,
        reconcile::reconcile,
        source::{list_envs, CondaCli},
        Package,
    },
    path::{default_config_file, snapshot_file},
    release::{release_asset, release_versions, AssetQuery, TagPattern},
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use inquire::Confirm;
use serde::Serialize;
use serde_json::Value;
use std::{
    env,
    path::{Path, PathBuf},
    process::exit,
    time::Duration,
};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "toolbelt [options] <toolbelt-command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    /// Path to configuration file instead of the default one.
    #[arg(short, long, global = true, value_name = "path")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    async fn run(self) -> Result<()> {
        let config = load_config(self.config).await?;
        match self.command {
            Command::Flatten(opts) => run_flatten(opts, config).await,
            Command::Reconcile(opts) => run_reconcile(opts).await,
            Command::Envs => run_envs(config).await,
            Command::Packages(opts) => run_packages(opts, config).await,
            Command::Snapshot(opts) => run_snapshot(opts, config).await,
            Command::Releases(opts) => run_releases(opts).await,
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Flatten JSON document into tabular records.
    #[command(override_usage = "toolbelt flatten [options] <file>")]
    Flatten(FlattenOptions),

    /// Reconcile secondary package listing against primary package listing.
    #[command(override_usage = "toolbelt reconcile [options] <primary> <secondary>")]
    Reconcile(ReconcileOptions),

    /// List conda environments.
    #[command(override_usage = "toolbelt envs [options]")]
    Envs,

    /// List packages installed by conda and pip in environment.
    #[command(override_usage = "toolbelt packages [options]")]
    Packages(PackagesOptions),

    /// Write environment.yml snapshot of environment.
    #[command(override_usage = "toolbelt snapshot [options]")]
    Snapshot(SnapshotOptions),

    /// Inspect release versions and assets of a GitHub release listing.
    #[command(override_usage = "toolbelt releases [options] <file> --tag-version <regex>")]
    Releases(ReleasesOptions),
}

#[derive(ValueEnum, Clone, Copy, Debug, Default)]
enum Format {
    /// Tab-separated values with header row.
    #[default]
    Tsv,

    /// Pretty-printed JSON.
    Json,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct FlattenOptions {
    /// JSON document to flatten.
    #[arg(required = true, value_name = "file")]
    pub file: PathBuf,

    /// Traversal-root expression to flatten from.
    #[arg(short, long, value_name = "expr")]
    pub root: Option<String>,

    /// Output format.
    #[arg(short, long, value_enum, default_value_t)]
    pub format: Format,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct ReconcileOptions {
    /// JSON array of primary packages.
    #[arg(required = true, value_name = "primary")]
    pub primary: PathBuf,

    /// JSON array of secondary packages.
    #[arg(required = true, value_name = "secondary")]
    pub secondary: PathBuf,

    /// Output format.
    #[arg(short, long, value_enum, default_value_t)]
    pub format: Format,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct PackagesOptions {
    /// Environment name or prefix.
    #[arg(short, long, value_name = "env")]
    pub env: Option<String>,

    /// Output format.
    #[arg(short, long, value_enum, default_value_t)]
    pub format: Format,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct SnapshotOptions {
    /// Environment name or prefix.
    #[arg(short, long, value_name = "env")]
    pub env: Option<String>,

    /// Directory to write environment.yml into.
    #[arg(short, long, value_name = "path")]
    pub output_dir: Option<PathBuf>,

    /// Record Git remotes without their commit or tag reference.
    #[arg(short, long)]
    pub generalize_git_remotes: bool,

    /// Overwrite existing environment.yml without asking.
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct ReleasesOptions {
    /// JSON release listing as returned by GitHub.
    #[arg(required = true, value_name = "file")]
    pub file: PathBuf,

    /// Regex matching version part of release tags.
    #[arg(long, value_name = "regex")]
    pub tag_version: String,

    /// Regex matching leading part of release tags to strip.
    #[arg(long, value_name = "regex", default_value = "")]
    pub tag_prefix: String,

    /// Regex matching trailing part of release tags to strip.
    #[arg(long, value_name = "regex", default_value = "")]
    pub tag_suffix: String,

    /// Locate asset of this asset type instead of listing versions.
    #[arg(long, value_name = "asset_version", requires = "asset_type")]
    pub asset: Option<String>,

    /// Regex whose first capture group names the asset type.
    #[arg(long, value_name = "regex")]
    pub asset_type: Option<String>,

    /// Release version to locate asset in instead of the latest one.
    #[arg(long, value_name = "version", requires = "asset")]
    pub version: Option<String>,
}

#[tokio::main]
async fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .with_timer(false)
        .without_time()
        .with_writer(std::io::stderr);
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = run().await {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

async fn run() -> Result<()> {
    Cli::parse().run().await
}

async fn load_config(path: Option<PathBuf>) -> Result<ToolbeltConfig> {
    let explicit = path.is_some();
    let path = match path {
        Some(path) => path,
        None => default_config_file()?,
    };

    // INVARIANT: Missing default configuration file means default settings.
    if !explicit && !path.exists() {
        return Ok(ToolbeltConfig::default());
    }

    let data = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("failed to read configuration file {:?}", path.display()))?;

    Ok(data.parse::<ToolbeltConfig>()?)
}

fn conda_exe(config: &ToolbeltConfig) -> Result<PathBuf> {
    config
        .conda
        .exe
        .clone()
        .or_else(|| env::var_os("CONDA_EXE").map(PathBuf::from))
        .context("cannot find conda executable, set [conda] exe or $CONDA_EXE")
}

fn conda_env(selected: Option<String>, config: &ToolbeltConfig) -> Result<String> {
    selected
        .or_else(|| config.conda.env.clone())
        .or_else(|| env::var("CONDA_PREFIX").ok())
        .context("no environment selected, use --env, [conda] env, or activate one")
}

fn snapshot_dir(selected: Option<PathBuf>, config: &ToolbeltConfig) -> Result<PathBuf> {
    match selected.or_else(|| config.snapshot.output_dir.clone()) {
        Some(path) => Ok(path),
        None => Ok(env::current_dir()?),
    }
}

async fn run_flatten(opts: FlattenOptions, config: ToolbeltConfig) -> Result<()> {
    let data = tokio::fs::read_to_string(&opts.file)
        .await
        .with_context(|| format!("failed to read {:?}", opts.file.display()))?;
    let document: Value = serde_json::from_str(&data)
        .with_context(|| format!("{:?} is not a JSON document", opts.file.display()))?;

    let root = opts.root.unwrap_or(config.flatten.root);
    let records = flatten_at(&document, &root)?;
    info!("flattened {} records from {root}", records.len());

    match opts.format {
        Format::Json => print_json(&records)?,
        Format::Tsv => {
            println!("key\tfullPath\tfullPathGeneralized\tvalue\tkind\tisObject\tisArray");
            for FlatRecord {
                key,
                full_path,
                full_path_generalized,
                value,
                kind,
                is_object,
                is_array,
            } in records
            {
                println!(
                    "{}\t{}\t{}\t{}\t{kind}\t{is_object}\t{is_array}",
                    tsv_field(&key),
                    tsv_field(&full_path),
                    tsv_field(&full_path_generalized),
                    tsv_field(&value),
                );
            }
        }
    }

    Ok(())
}

async fn run_reconcile(opts: ReconcileOptions) -> Result<()> {
    let (primary, secondary) = tokio::try_join!(
        read_packages(&opts.primary),
        read_packages(&opts.secondary)
    )?;

    let result = reconcile(&primary, &secondary);
    match opts.format {
        Format::Json => print_json(&result)?,
        Format::Tsv => print_packages(&result.secondary_only),
    }

    Ok(())
}

async fn run_envs(config: ToolbeltConfig) -> Result<()> {
    let envs = list_envs(conda_exe(&config)?).await?;
    println!("name\tprefix");
    for (name, prefix) in envs.iter() {
        println!("{}\t{}", tsv_field(&name), prefix.display());
    }

    Ok(())
}

async fn run_packages(opts: PackagesOptions, config: ToolbeltConfig) -> Result<()> {
    let env_name = conda_env(opts.env, &config)?;
    let source = CondaCli::open(conda_exe(&config)?, &env_name).await?;
    let listing = list_packages(&source).await?;

    match opts.format {
        Format::Json => print_json(&listing)?,
        Format::Tsv => print_packages(&listing.packages),
    }

    Ok(())
}

async fn run_snapshot(opts: SnapshotOptions, config: ToolbeltConfig) -> Result<()> {
    let env_name = conda_env(opts.env, &config)?;
    let output_dir = snapshot_dir(opts.output_dir, &config)?;
    let generalize = opts.generalize_git_remotes || config.snapshot.generalize_git_remotes;

    mkdirp::mkdirp(&output_dir)
        .with_context(|| format!("failed to create {:?}", output_dir.display()))?;
    let file = snapshot_file(&output_dir);

    if file.exists() && !opts.yes {
        let message = format!("{} already exists, overwrite it?", file.display());
        if !Confirm::new(&message).with_default(false).prompt()? {
            info!("keeping existing snapshot {:?}", file.display());
            return Ok(());
        }
    }

    let source = CondaCli::open(conda_exe(&config)?, &env_name).await?;
    let bar = ProgressBar::new_spinner();
    bar.set_style(ProgressStyle::with_template(
        "{elapsed_precise:.green}  {spinner:.yellow}  {msg}",
    )?);
    bar.set_message(format!("snapshot {}", source.prefix().display()));
    bar.enable_steady_tick(Duration::from_millis(100));

    let snapshot = env_snapshot(&source, generalize).await;
    bar.finish_and_clear();

    let mut snapshot = snapshot?;
    if !snapshot.ends_with('\n') {
        snapshot.push('\n');
    }

    tokio::fs::write(&file, snapshot)
        .await
        .with_context(|| format!("failed to write {:?}", file.display()))?;
    info!("wrote snapshot {:?}", file.display());

    Ok(())
}

async fn run_releases(opts: ReleasesOptions) -> Result<()> {
    let data = tokio::fs::read_to_string(&opts.file)
        .await
        .with_context(|| format!("failed to read {:?}", opts.file.display()))?;
    let document: Value = serde_json::from_str(&data)
        .with_context(|| format!("{:?} is not a JSON document", opts.file.display()))?;
    let records = flatten_at(&document, "$..*")?;

    let tag = TagPattern::new(opts.tag_version)
        .with_prefix(opts.tag_prefix)
        .with_suffix(opts.tag_suffix);

    match (opts.asset, opts.asset_type) {
        (Some(asset_version), Some(asset_type)) => {
            let query = AssetQuery {
                tag,
                version: opts.version,
                asset_type,
                asset_version,
            };
            print_json(&release_asset(&records, &query)?)?;
        }
        _ => print_json(&release_versions(&records, &tag)?)?,
    }

    Ok(())
}

async fn read_packages(path: &Path) -> Result<Vec<Package>> {
    let data = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {:?}", path.display()))?;

    serde_json::from_str(&data)
        .with_context(|| format!("{:?} is not a JSON array of packages", path.display()))
}

fn print_packages(packages: &[Package]) {
    println!("name\tversion\tchannel\tremote");
    for package in packages {
        println!(
            "{}\t{}\t{}\t{}",
            tsv_field(&package.name),
            tsv_field(&package.version),
            package.channel.as_deref().map(tsv_field).unwrap_or_default(),
            package.remote.as_deref().map(tsv_field).unwrap_or_default(),
        );
    }
}

fn print_json(value: &impl Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn tsv_field(field: &str) -> String {
    field
        .replace('\\', "\\\\")
        .replace('\t', "\\t")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
}

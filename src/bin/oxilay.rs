// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use oxilay::{
    upstream::{Git2Upstream, UpstreamAccess},
    Layout, LinkMode, Overlay, OverlayConfig,
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::ProgressBar;
use std::{
    env, fs,
    path::{Path, PathBuf},
    process::exit,
};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "oxilay [options] <oxilay-command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    /// Path to configuration file, relative to the project root.
    #[arg(short, long, global = true, value_name = "path", default_value = ".oxilay.toml")]
    pub config: PathBuf,

    /// Replace existing targets instead of failing.
    #[arg(short, long, global = true)]
    pub force: bool,

    /// Link mode to use instead of the configured one.
    #[arg(long, global = true, value_name = "mode")]
    pub link_mode: Option<LinkMode>,

    /// Show debug logs.
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    fn run(self) -> Result<()> {
        let root = env::current_dir().context("cannot determine project root")?;
        let project = Project::new(root, &self.config, self.link_mode, self.force);

        match self.command {
            Command::Init => project.run_init(),
            Command::Sync => project.run_sync(),
            Command::Link => project.run_link(),
            Command::Clean => project.run_clean(),
            Command::Validate(opts) => project.run_validate(opts),
            Command::List => project.run_list(),
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Clone upstream, pin it to configured reference, and link files.
    #[command(override_usage = "oxilay init [options]")]
    Init,

    /// Fetch upstream, pin it again to configured reference, and link files.
    #[command(override_usage = "oxilay sync [options]")]
    Sync,

    /// Link files from existing upstream clone into overlay.
    #[command(override_usage = "oxilay link [options]")]
    Link,

    /// Remove every managed file from overlay.
    #[command(override_usage = "oxilay clean [options]")]
    Clean,

    /// Check that path stays inside overlay.
    #[command(override_usage = "oxilay validate [options] <path>")]
    Validate(ValidateOptions),

    /// List managed files of overlay.
    #[command(override_usage = "oxilay list [options]")]
    List,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct ValidateOptions {
    /// Path to validate, relative to overlay.
    #[arg(required = true, value_name = "path")]
    pub path: PathBuf,
}

fn main() {
    let cli = Cli::parse();
    let fallback = if cli.debug { "debug" } else { "info" };

    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = cli.run() {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

/// Project the command line operates on.
struct Project {
    overlay: Overlay,
    config_path: PathBuf,
    link_mode: Option<LinkMode>,
    force: bool,
}

impl Project {
    fn new(root: PathBuf, config: &Path, link_mode: Option<LinkMode>, force: bool) -> Self {
        let config_path = root.join(config);
        let overlay = Overlay::new(Layout::new(root));

        Self {
            overlay,
            config_path,
            link_mode,
            force,
        }
    }

    fn load_config(&self) -> Result<OverlayConfig> {
        let data = fs::read_to_string(&self.config_path)
            .with_context(|| format!("cannot read config {:?}", self.config_path.display()))?;
        let config = data
            .parse::<OverlayConfig>()
            .with_context(|| format!("invalid config {:?}", self.config_path.display()))?;

        Ok(config)
    }

    fn link_with(&self, config: &OverlayConfig) -> Result<()> {
        // INVARIANT: Command line wins over config, config wins over default.
        let link_mode = self
            .link_mode
            .or(config.link_mode)
            .unwrap_or_default();
        let created = self
            .overlay
            .materialize(&config.links, link_mode, self.force)?;
        for path in created {
            info!("linked {:?}", path.display());
        }

        Ok(())
    }

    fn run_init(&self) -> Result<()> {
        let config = self.load_config()?;
        let layout = self.overlay.layout();
        let upstream = Git2Upstream::new(ProgressBar::new_spinner())?;
        UpstreamAccess::clone_into(&upstream, &config.upstream.url, &layout.source_root())?;
        upstream.checkout(&layout.source_root(), &config.upstream.reference)?;

        let target_root = layout.target_root();
        mkdirp::mkdirp(&target_root)
            .with_context(|| format!("cannot create overlay {:?}", target_root.display()))?;

        self.link_with(&config)
    }

    fn run_sync(&self) -> Result<()> {
        let config = self.load_config()?;
        let source_root = self.overlay.layout().source_root();
        if !source_root.is_dir() {
            anyhow::bail!(
                "no upstream clone at {:?}, run `oxilay init` first",
                source_root.display()
            );
        }

        let upstream = Git2Upstream::new(ProgressBar::new_spinner())?;
        upstream.checkout(&source_root, &config.upstream.reference)?;

        self.link_with(&config)
    }

    fn run_link(&self) -> Result<()> {
        let config = self.load_config()?;
        self.link_with(&config)
    }

    fn run_clean(&self) -> Result<()> {
        let removed = self.overlay.clean()?;
        println!("removed {removed} managed entries");

        Ok(())
    }

    fn run_validate(&self, opts: ValidateOptions) -> Result<()> {
        let path = self.overlay.validate(&opts.path)?;
        println!("{}", path.display());

        Ok(())
    }

    fn run_list(&self) -> Result<()> {
        let registry = self.overlay.registry()?;
        for entry in registry.iter() {
            println!(
                "{}  {}  {}",
                entry.path.display(),
                entry.link_mode,
                entry.source.display()
            );
        }

        Ok(())
    }
}

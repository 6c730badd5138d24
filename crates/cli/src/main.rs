//! git-aflow command-line tool.
//!
//! Installed as `git-af`, so git picks it up as `git af <command>`. Every
//! command opens the repository containing the working directory, runs one
//! workflow from `gitaflow-core` and exits 0 on success or 1 on failure.

mod style;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{ArgGroup, Args, Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL, Cell, ContentArrangement, Table};
use tracing::debug;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use gitaflow_core::flow::{
    self, FinishOptions, ListOptions, ListSection, MergeOptions, RevertOptions, Selection,
};
use gitaflow_core::{AflowConfig, CoreError, GitCli, MergeType, Repo};

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// Topic/iteration workflow on top of git.
#[derive(Parser, Debug)]
#[command(name = "git-af", version, about = "Topic and iteration workflow for git")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// More log output (-v info, -vv debug).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Write logs to this file instead of stderr.
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Turn the repository into a git-aflow one by starting the first iteration.
    Init {
        /// Name of the first iteration.
        name: String,
    },

    /// Start a new topic in the current iteration.
    Start {
        /// Topic name.
        name: String,
    },

    /// Merge the current topic branch into develop.
    Finish {
        /// Description of the topic.
        description: Option<String>,

        /// Topic revision to finish when HEAD is detached or differs from the branch name.
        #[arg(short, long)]
        name: Option<String>,

        #[command(flatten)]
        merge_type: MergeTypeArgs,
    },

    /// Merge topics from develop (or other sources) into the current branch.
    #[command(group(ArgGroup::new("selection").args(["all", "update", "choose"])))]
    Merge {
        /// Topics to merge, as `topic` or `topic_vN`.
        topics: Vec<String>,

        /// Merge every topic found in the sources.
        #[arg(short, long)]
        all: bool,

        /// Merge newer versions of topics already present.
        #[arg(short, long)]
        update: bool,

        /// Merge only the listed topics (default when topics are given).
        #[arg(short, long)]
        choose: bool,

        /// Also merge missing dependencies.
        #[arg(short, long)]
        dependencies: bool,

        /// Source branches; defaults depend on the current branch.
        #[arg(short, long = "source")]
        sources: Vec<String>,

        /// Override the description of the merged topic.
        #[arg(short = 'e', long)]
        description: Option<String>,

        #[command(flatten)]
        merge_type: MergeTypeArgs,
    },

    /// Revert topics from the current branch.
    Revert {
        /// Topics to revert, as `topic` or `topic_vN`.
        #[arg(required = true)]
        names: Vec<String>,

        /// Also revert topics depending on them.
        #[arg(short, long)]
        dependencies: bool,
    },

    /// Create a branch for the next version of a topic.
    Continue {
        /// Topic to continue; defaults to the revision HEAD points at.
        name: Option<String>,
    },

    /// Check out a branch, topic or merged topic revision.
    Checkout {
        /// Branch, `develop`/`staging`, or topic name.
        name: String,
    },

    /// List topics merged into branches.
    List {
        /// Branches to list; defaults depend on the current branch.
        sources: Vec<String>,

        /// List master, staging and develop.
        #[arg(short, long)]
        all: bool,

        /// Show FIX topics.
        #[arg(short = 'F', long)]
        fix: bool,

        /// Show DEV topics.
        #[arg(short = 'D', long)]
        dev: bool,

        /// Show EUF topics.
        #[arg(short = 'E', long)]
        euf: bool,
    },

    /// Start a new iteration on top of master.
    Rebase {
        /// Name of the new iteration.
        name: String,
    },
}

/// `-F`/`-D`/`-E` merge type selection.
#[derive(Args, Debug)]
#[group(multiple = false)]
struct MergeTypeArgs {
    /// Bug fix.
    #[arg(short = 'F', long)]
    fix: bool,

    /// Development topic.
    #[arg(short = 'D', long)]
    dev: bool,

    /// End-user feature.
    #[arg(short = 'E', long)]
    euf: bool,
}

impl MergeTypeArgs {
    fn selected(&self) -> Option<MergeType> {
        if self.fix {
            Some(MergeType::Fix)
        } else if self.dev {
            Some(MergeType::Dev)
        } else if self.euf {
            Some(MergeType::Euf)
        } else {
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.downcast_ref::<CoreError>() {
                Some(core) if core.is_user_facing() => println!("{}", core),
                _ => eprintln!("{}", style::error(&format!("Error: {:#}", e))),
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let cwd = std::env::current_dir().context("failed to read current directory")?;
    let git = GitCli::open(&cwd).map_err(CoreError::from)?;
    let config = AflowConfig::discover(cli.config.as_deref(), Some(git.git_dir()))
        .context("failed to load configuration")?;
    let _guard = init_logging(&cli, &config)?;
    debug!(root = %git.root().display(), "repository opened");

    let repo = Repo::with_config(git, &config)?;

    match cli.command {
        Commands::Init { name } => {
            flow::init(&repo, &name)?;
        }
        Commands::Rebase { name } => {
            flow::rebase(&repo, &name)?;
        }
        Commands::Start { name } => {
            flow::start(&repo, &name)?;
        }
        Commands::Finish {
            description,
            name,
            merge_type,
        } => {
            let opts = FinishOptions {
                name,
                description,
                merge_type: merge_type.selected(),
            };
            flow::finish(&repo, &opts)?;
        }
        Commands::Merge {
            topics,
            all,
            update,
            choose: _,
            dependencies,
            sources,
            description,
            merge_type,
        } => {
            let selection = if all {
                Selection::All
            } else if update {
                Selection::Update
            } else {
                Selection::Choose(topics)
            };
            let opts = MergeOptions {
                sources,
                selection,
                dependencies,
                merge_type: merge_type.selected(),
                description,
            };
            flow::merge(&repo, &opts)?;
        }
        Commands::Revert { names, dependencies } => {
            flow::revert(&repo, &RevertOptions { names, dependencies })?;
        }
        Commands::Continue { name } => {
            flow::continue_topic(&repo, name.as_deref())?;
        }
        Commands::Checkout { name } => {
            flow::checkout(&repo, &name)?;
        }
        Commands::List {
            sources,
            all,
            fix,
            dev,
            euf,
        } => {
            let mut filters = Vec::new();
            if fix {
                filters.push(MergeType::Fix);
            }
            if dev {
                filters.push(MergeType::Dev);
            }
            if euf {
                filters.push(MergeType::Euf);
            }
            let sections = flow::list(&repo, &ListOptions { sources, all, filters })?;
            print_sections(&sections);
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// Install the subscriber. The returned guard flushes the file writer and
/// must live until the command finishes.
fn init_logging(cli: &Cli, config: &AflowConfig) -> Result<Option<WorkerGuard>> {
    let level = if cli.quiet {
        "error"
    } else {
        match cli.verbose {
            0 => config.log.level.as_str(),
            1 => "info",
            _ => "debug",
        }
    };
    let filter = match std::env::var("RUST_LOG") {
        Ok(directives) if !directives.is_empty() => EnvFilter::new(directives),
        _ => EnvFilter::new(level),
    };

    let log_file = cli.log_file.as_deref().or(config.log.file.as_deref());
    match log_file {
        Some(path) => {
            let (dir, name) = split_log_path(path)?;
            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_ansi(false)
                .with_writer(writer)
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .without_time()
                .with_writer(std::io::stderr)
                .init();
            Ok(None)
        }
    }
}

fn split_log_path(path: &Path) -> Result<(PathBuf, PathBuf)> {
    let name = path
        .file_name()
        .with_context(|| format!("log file path has no file name: {}", path.display()))?;
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok((dir, PathBuf::from(name)))
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

fn print_sections(sections: &[ListSection]) {
    for section in sections {
        println!();
        println!("{}", style::header(&section.source));

        if section.rows.is_empty() {
            println!("{}", style::dim("no topics"));
            continue;
        }

        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(vec!["Topic", "Type", "Version", "Description"]);

        for row in &section.rows {
            let description = row.description.clone().unwrap_or_default();
            table.add_row(vec![
                Cell::new(&row.topic),
                Cell::new(style::merge_type(row.merge_type)),
                Cell::new(format!("v{}", row.version)),
                Cell::new(description),
            ]);
        }
        println!("{}", table);
    }
    println!();
}

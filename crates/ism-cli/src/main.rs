mod cmd;
mod output;
mod root;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use cmd::{
    config::ConfigSubcommand, index::IndexSubcommand, job::JobSubcommand,
    policy::PolicySubcommand,
};
use ism_core::registry::{ManagedIndexQuery, ManagedIndexSortField};
use ism_core::store::SortDirection;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "ism",
    about = "Index lifecycle policies: store them, attach them, and step indices through them",
    version,
    propagate_version = true
)]
struct Cli {
    /// Data directory (default: nearest ancestor holding .ism/)
    #[arg(long, global = true, env = "ISM_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the .ism data directory
    Init,

    /// Manage stored policies
    Policy {
        #[command(subcommand)]
        subcommand: PolicySubcommand,
    },

    /// Manage the index catalog
    Index {
        #[command(subcommand)]
        subcommand: IndexSubcommand,
    },

    /// Start managing indices under a policy
    Apply {
        policy: String,
        #[arg(required = true)]
        indices: Vec<String>,
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },

    /// Stop managing indices
    Remove {
        #[arg(required = true)]
        indices: Vec<String>,
    },

    /// Show managed-index metadata
    Explain {
        indices: Vec<String>,
        /// Only indices whose name contains every whitespace-separated term
        #[arg(long, default_value = "", conflicts_with = "indices")]
        search: String,
        #[arg(long, default_value_t = 0)]
        from: usize,
        #[arg(long, default_value_t = 20)]
        size: usize,
        /// index or policy_id
        #[arg(long, default_value = "index")]
        sort: String,
        /// Sort descending
        #[arg(long)]
        desc: bool,
    },

    /// Run the state machine for managed indices
    Tick {
        indices: Vec<String>,
        /// Evaluate as of this instant (RFC 3339)
        #[arg(long)]
        at: Option<DateTime<Utc>>,
        /// Number of consecutive ticks
        #[arg(long, default_value_t = 1)]
        rounds: u32,
    },

    /// Retry failed indices, optionally from a shared state
    Retry {
        #[arg(required = true)]
        indices: Vec<String>,
        #[arg(long)]
        state: Option<String>,
        /// List the states every selected index could restart from
        #[arg(long, conflicts_with = "state")]
        list_states: bool,
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },

    /// Move managed indices to another policy
    ChangePolicy {
        #[arg(required = true)]
        indices: Vec<String>,
        #[arg(long)]
        policy: String,
        /// State to start in (default: the current state)
        #[arg(long)]
        state: Option<String>,
        /// Only change indices currently in this state (repeatable)
        #[arg(long)]
        include: Vec<String>,
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },

    /// Rollup and transform job definitions
    Job {
        #[command(subcommand)]
        subcommand: JobSubcommand,
    },

    /// Inspect ism.yaml
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());
    let json = cli.json;

    let result = match cli.command {
        Commands::Init => cmd::init::run(&root),
        Commands::Policy { subcommand } => cmd::policy::run(&root, subcommand, json),
        Commands::Index { subcommand } => cmd::index::run(&root, subcommand, json),
        Commands::Apply {
            policy,
            indices,
            at,
        } => cmd::manage::apply(&root, &policy, &indices, at, json),
        Commands::Remove { indices } => cmd::manage::remove(&root, &indices, json),
        Commands::Explain {
            indices,
            search,
            from,
            size,
            sort,
            desc,
        } => sort
            .parse::<ManagedIndexSortField>()
            .map_err(anyhow::Error::from)
            .and_then(|sort_field| {
                let query = ManagedIndexQuery {
                    search,
                    from,
                    size,
                    sort_field,
                    sort_direction: if desc {
                        SortDirection::Desc
                    } else {
                        SortDirection::Asc
                    },
                };
                cmd::explain::run(&root, &indices, &query, json)
            }),
        Commands::Tick {
            indices,
            at,
            rounds,
        } => cmd::tick::run(&root, &indices, at, rounds, json),
        Commands::Retry {
            indices,
            list_states: true,
            ..
        } => cmd::retry::states(&root, &indices, json),
        Commands::Retry {
            indices, state, at, ..
        } => cmd::retry::run(&root, &indices, state.as_deref(), at, json),
        Commands::ChangePolicy {
            indices,
            policy,
            state,
            include,
            at,
        } => cmd::change_policy::run(
            &root,
            &indices,
            &policy,
            state.as_deref(),
            &include,
            at,
            json,
        ),
        Commands::Job { subcommand } => cmd::job::run(subcommand, json),
        Commands::Config { subcommand } => cmd::config::run(&root, subcommand, json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use txstate::{ComponentConfig, StateConfig, Subroot, ZkConnector};

mod commands;

#[derive(Parser)]
#[command(
    name = "txstate",
    about = "Inspect and edit transactional state in ZooKeeper",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Store configuration (TOML).
    #[arg(short, long, default_value = "txstate.toml")]
    config: PathBuf,
    /// Component configuration whose registrations override the store's.
    #[arg(long)]
    component: Option<PathBuf>,
    /// Transaction id the state belongs to.
    #[arg(long)]
    id: String,
    /// Use the coordinator subtree instead of the user subtree.
    #[arg(long)]
    coordinator: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the value stored at a path
    Get { path: String },
    /// Store a JSON value at a path
    Set {
        path: String,
        /// JSON-encoded value
        value: String,
        /// Type name to record; inferred from the JSON when omitted
        #[arg(long = "type")]
        type_name: Option<String>,
    },
    /// Delete the node at a path
    Delete { path: String },
    /// List the children of a path
    List {
        #[arg(default_value = "")]
        path: String,
    },
    /// Create a directory-like placeholder node
    Mkdir { path: String },
}

impl From<Commands> for commands::Action {
    fn from(command: Commands) -> Self {
        match command {
            Commands::Get { path } => commands::Action::Get { path },
            Commands::Set { path, value, type_name } => commands::Action::Set { path, value, type_name },
            Commands::Delete { path } => commands::Action::Delete { path },
            Commands::List { path } => commands::Action::List { path },
            Commands::Mkdir { path } => commands::Action::Mkdir { path },
        }
    }
}

impl Cli {
    /// Load the store configuration and, when given, the component's.
    fn load_configs(&self) -> anyhow::Result<(StateConfig, Option<ComponentConfig>)> {
        let conf = StateConfig::from_file(&self.config)
            .with_context(|| format!("loading {}", self.config.display()))?;
        let component = self
            .component
            .as_deref()
            .map(ComponentConfig::from_file)
            .transpose()?;
        Ok((conf, component))
    }

    fn subroot(&self) -> Subroot {
        if self.coordinator {
            Subroot::Coordinator
        } else {
            Subroot::User
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("txstate=info".parse()?)
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let (conf, component) = cli.load_configs()?;
    let subroot = cli.subroot();

    let output = commands::run(
        &ZkConnector,
        &conf,
        component.as_ref(),
        &cli.id,
        subroot,
        cli.command.into(),
    )?;
    println!("{output}");
    Ok(())
}

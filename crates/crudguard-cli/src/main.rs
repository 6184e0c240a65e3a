//! crudguard command-line tool
//!
//! Inspect what a policy grants, preview include plans, and query a local
//! guarded store as a given identity.

mod commands;

use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// crudguard command-line tool
#[derive(Parser, Debug)]
#[command(name = "crudguard")]
#[command(version, about = "Permission-aware query composition toolkit")]
pub struct Args {
    /// Print JSON on a single line
    #[arg(long, global = true)]
    pub compact: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Resolve the permissions an identity holds on an entity
    Resolve {
        #[command(flatten)]
        caller: CallerArgs,

        /// Only resolve this action (create, read, update, delete)
        #[arg(short, long)]
        action: Option<String>,
    },

    /// Build the include tree for an entity
    Plan {
        /// Catalog file (JSON array of models)
        #[arg(short, long)]
        catalog: PathBuf,

        /// Root entity
        #[arg(short, long)]
        entity: String,

        /// Projection in compact form, e.g. "name -owner.password"
        #[arg(short, long)]
        projection: Option<String>,

        /// Deepest association level to load
        #[arg(short, long, default_value_t = 1)]
        depth: usize,
    },

    /// Apply an identity's read projection to a JSON document
    Redact {
        #[command(flatten)]
        caller: CallerArgs,

        /// Document file; reads stdin when omitted
        #[arg(short, long)]
        document: Option<PathBuf>,
    },

    /// Load a JSON array of documents into a collection
    Import {
        #[command(flatten)]
        store: StoreArgs,

        /// File holding a JSON array of documents
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Query a collection as an identity
    Find {
        #[command(flatten)]
        store: StoreArgs,

        #[command(flatten)]
        caller: CallerArgs,

        /// Filter as JSON
        #[arg(long)]
        filter: Option<String>,

        /// Maximum number of documents
        #[arg(short, long)]
        limit: Option<usize>,
    },
}

/// Who is asking, and under which policy.
#[derive(ClapArgs, Debug)]
pub struct CallerArgs {
    /// Policy file (JSON object keyed by role)
    #[arg(long)]
    pub policy: Option<PathBuf>,

    /// Entity the policy guards
    #[arg(short, long, default_value = "entity")]
    pub entity: String,

    /// Caller role; repeat for several. No role means a trusted call.
    #[arg(short, long = "role")]
    pub roles: Vec<String>,

    /// Identity attribute as key=value; values parse as JSON when they can
    #[arg(long = "attr", value_parser = commands::parse_attribute)]
    pub attributes: Vec<(String, serde_json::Value)>,
}

/// Where the store lives.
#[derive(ClapArgs, Debug)]
pub struct StoreArgs {
    /// Data directory
    #[arg(long, default_value = "./crudguard_data")]
    pub data: PathBuf,

    /// Collection name
    #[arg(long)]
    pub collection: String,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    match commands::run(args.command).await {
        Ok(output) => println!("{}", commands::render(&output, args.compact)),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

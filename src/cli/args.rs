//! CLI argument definitions using clap derive

use crate::lifecycle::Step;
use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

/// Stagecraft - build container images from parts
///
/// Runs the pull, build, stage and prime steps of the parts declared in a
/// parts file. Stage packages are installed into a base image once and the
/// resulting layer is reused until the package set changes.
#[derive(Parser, Debug)]
#[command(name = "stagecraft")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Step to run (defaults to prime)
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Parts file
    #[arg(short, long, global = true, default_value = "parts.yaml")]
    pub file: PathBuf,

    /// Refresh part sources before planning
    #[arg(long, global = true)]
    pub update: bool,

    /// Print the planned actions without executing them
    #[arg(long, global = true)]
    pub plan_only: bool,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "STAGECRAFT_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Pull the sources of parts
    Pull(PartsArgs),

    /// Build parts
    Build(PartsArgs),

    /// Stage parts
    Stage(PartsArgs),

    /// Prime parts and create the final image
    Prime(PartsArgs),

    /// Remove part data, stage and prime directories and the layer cache
    Clean(PartsArgs),
}

/// Part selection shared by every command
#[derive(Args, Debug, Default, Clone)]
pub struct PartsArgs {
    /// Parts to process (all if omitted)
    pub parts: Vec<String>,
}

/// Resolved command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    Step { target: Step, parts: Vec<String> },
    Clean { parts: Vec<String> },
}

impl Cli {
    /// Resolve the subcommand, defaulting to `prime` for all parts
    pub fn invocation(&self) -> Invocation {
        let step = |target: Step, args: &PartsArgs| Invocation::Step {
            target,
            parts: args.parts.clone(),
        };
        match &self.command {
            None => Invocation::Step {
                target: Step::Prime,
                parts: vec![],
            },
            Some(Commands::Pull(args)) => step(Step::Pull, args),
            Some(Commands::Build(args)) => step(Step::Build, args),
            Some(Commands::Stage(args)) => step(Step::Stage, args),
            Some(Commands::Prime(args)) => step(Step::Prime, args),
            Some(Commands::Clean(args)) => Invocation::Clean {
                parts: args.parts.clone(),
            },
        }
    }
}

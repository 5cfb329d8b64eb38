//! wpl - resolve Python requirements into a shared wheel pool
//!
//! The command surface over [`wpl_core`]. Resolution happens against the
//! interpreter named by `--python`; projects are unpacked once into a pool
//! per interpreter and linked into environments rather than copied.
//!
//! # Directory Layout
//!
//! ```text
//! ~/.wpl/
//! ├── config.toml              # optional settings
//! ├── cache/distributions/     # downloaded archives (by file name)
//! └── data/<interpreter>/pool/ # unpacked distributions by tag set
//! ```

pub mod cmd;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Top-level arguments.
#[derive(Debug, Parser)]
#[command(name = "wpl")]
#[command(version, about = "wpl - resolve Python requirements into a shared wheel pool")]
pub struct Cli {
    /// Settings shared by every command.
    #[command(flatten)]
    pub global: GlobalArgs,

    /// What to do.
    #[command(subcommand)]
    pub command: Commands,
}

/// Flags accepted before or after any subcommand.
#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// More logging (-v info, -vv debug). `WPL_LOG` takes precedence.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Interpreter to resolve and install for
    #[arg(long, global = true)]
    pub python: Option<PathBuf>,

    /// Base URL of the simple package index
    #[arg(long, global = true)]
    pub index_url: Option<String>,

    /// Download cache root
    #[arg(long, global = true)]
    pub cache_dir: Option<PathBuf>,

    /// Pool data root
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,
}

/// Subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Resolve requirements and print the pinned set
    Solve {
        /// Requirements or direct references
        #[arg(required = true)]
        requirements: Vec<String>,
        /// Do not follow dependencies
        #[arg(long)]
        no_deps: bool,
    },
    /// Make requirements importable from the environment
    Install {
        /// Requirements or direct references
        requirements: Vec<String>,
        /// Direct reference to install in editable mode
        #[arg(short, long = "editable", value_name = "REQ")]
        editable: Vec<String>,
        /// Do not follow dependencies
        #[arg(long)]
        no_deps: bool,
    },
    /// Manage the shared pool
    Pool {
        /// Pool action.
        #[command(subcommand)]
        command: PoolCommands,
    },
    /// Manage the environment's links into the pool
    Links {
        /// Links action.
        #[command(subcommand)]
        command: LinksCommands,
    },
    /// Inspect the download cache
    Cache {
        /// Cache action.
        #[command(subcommand)]
        command: CacheCommands,
    },
}

/// `wpl pool ...`
#[derive(Debug, Subcommand)]
pub enum PoolCommands {
    /// Resolve requirements and unpack them into the pool
    Add {
        /// Requirements or direct references
        #[arg(required = true)]
        requirements: Vec<String>,
    },
    /// List pooled projects
    List,
    /// Delete pooled projects (all versions unless pinned)
    Remove {
        /// Projects to remove
        #[arg(required = true)]
        requirements: Vec<String>,
    },
}

/// `wpl links ...`
#[derive(Debug, Subcommand)]
pub enum LinksCommands {
    /// Resolve requirements and link them into the environment
    Add {
        /// Requirements (direct references are refused)
        #[arg(required = true)]
        requirements: Vec<String>,
    },
    /// List linked projects
    List,
    /// Unlink projects
    Remove {
        /// Projects to unlink
        #[arg(required = true)]
        requirements: Vec<String>,
    },
}

/// `wpl cache ...`
#[derive(Debug, Subcommand)]
pub enum CacheCommands {
    /// List downloaded archives
    List,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "wpl", "solve", "demo>=1", "--python", "/usr/bin/python3.12", "-vv",
        ])
        .unwrap();
        assert_eq!(cli.global.verbose, 2);
        assert_eq!(cli.global.python, Some(PathBuf::from("/usr/bin/python3.12")));
        match cli.command {
            Commands::Solve {
                requirements,
                no_deps,
            } => {
                assert_eq!(requirements, ["demo>=1"]);
                assert!(!no_deps);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_install_editable_flags() {
        let cli = Cli::try_parse_from(["wpl", "install", "-e", "./a", "--editable", "./b", "six"])
            .unwrap();
        let Commands::Install {
            requirements,
            editable,
            no_deps,
        } = cli.command
        else {
            panic!("expected install");
        };
        assert_eq!(requirements, ["six"]);
        assert_eq!(editable, ["./a", "./b"]);
        assert!(!no_deps);
    }

    #[test]
    fn test_pool_remove_needs_arguments() {
        assert!(Cli::try_parse_from(["wpl", "pool", "remove"]).is_err());
        assert!(Cli::try_parse_from(["wpl", "pool", "list"]).is_ok());
    }
}

//! CLI argument definitions for processio.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! dispatching subcommands.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// processio -- per-user process variable store.
#[derive(Parser)]
#[command(
    name = "processio",
    version,
    about = "processio -- per-user process variable store",
    long_about = "Read, write and query the input/output variables of business processes, \
                  scoped per user and optionally tagged with a process definition and instance."
)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true, default_value = "config/default.toml")]
    pub config: PathBuf,

    /// The user whose variables are accessed.
    #[arg(long, short, global = true, default_value = "")]
    pub user: String,

    /// Act with administrator privileges (required for cascading deletes).
    #[arg(long, global = true)]
    pub admin: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Read one variable.
    Get {
        key: String,
    },

    /// Write one variable.
    Set {
        key: String,
        /// JSON value; anything that does not parse as JSON is stored as a string.
        value: String,
        /// Process definition to tag the variable with.
        #[arg(long)]
        definition: Option<String>,
        /// Process instance to tag the variable with.
        #[arg(long)]
        instance: Option<String>,
    },

    /// Delete one variable.
    Delete {
        key: String,
    },

    /// List variables matching the query options.
    List(QueryArgs),

    /// Count variables matching the query options.
    Count(QueryArgs),

    /// Apply a bulk request: all sets first, then all gets.
    Bulk {
        /// File holding the JSON request; stdin when omitted.
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Bare value access.
    Value {
        #[command(subcommand)]
        action: ValueAction,
    },

    /// Delete every variable of a process definition, for all users.
    DeleteDefinition {
        definition_id: String,
    },

    /// Delete every variable of a process instance, for all users.
    DeleteInstance {
        instance_id: String,
    },
}

/// Actions on bare values.
#[derive(Subcommand)]
pub enum ValueAction {
    /// Print the value stored under a key (`null` when absent).
    Get {
        key: String,
    },
    /// Store a value, optionally under a process definition and instance.
    Set {
        key: String,
        value: String,
        #[arg(long)]
        definition: Option<String>,
        #[arg(long, requires = "definition")]
        instance: Option<String>,
    },
}

/// Query options, kept as raw strings so they go through the same
/// validation as any other caller.
#[derive(Args, Default)]
pub struct QueryArgs {
    #[arg(long)]
    pub limit: Option<String>,
    #[arg(long)]
    pub offset: Option<String>,
    /// `<field>[.asc|.desc]`, e.g. `unix_timestamp_in_s.desc`.
    #[arg(long)]
    pub sort: Option<String>,
    #[arg(long)]
    pub key_regex: Option<String>,
    #[arg(long)]
    pub definition: Option<String>,
    #[arg(long)]
    pub instance: Option<String>,
}

impl QueryArgs {
    /// Name/value pairs in request-parameter form.
    pub fn pairs(&self) -> Vec<(&'static str, &str)> {
        [
            ("limit", &self.limit),
            ("offset", &self.offset),
            ("sort", &self.sort),
            ("key_regex", &self.key_regex),
            ("process_definition_id", &self.definition),
            ("process_instance_id", &self.instance),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.as_deref().map(|v| (name, v)))
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_flags_follow_subcommands() {
        let cli = Cli::try_parse_from([
            "processio",
            "delete-instance",
            "i1",
            "--admin",
            "--user",
            "alice",
        ])
        .unwrap();
        assert!(cli.admin);
        assert_eq!(cli.user, "alice");
        assert!(matches!(cli.command, Commands::DeleteInstance { ref instance_id } if instance_id == "i1"));
    }

    #[test]
    fn query_args_become_pairs() {
        let cli = Cli::try_parse_from([
            "processio",
            "list",
            "--limit",
            "2",
            "--key-regex",
            "b.r",
            "--instance",
            "i3",
        ])
        .unwrap();
        let Commands::List(args) = cli.command else {
            panic!("expected list");
        };
        assert_eq!(
            args.pairs(),
            vec![("limit", "2"), ("key_regex", "b.r"), ("process_instance_id", "i3")]
        );
    }

    #[test]
    fn value_instance_requires_definition() {
        let parsed = Cli::try_parse_from([
            "processio", "value", "set", "k", "1", "--instance", "i1",
        ]);
        assert!(parsed.is_err());
    }
}

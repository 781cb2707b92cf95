//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - daemon: run the distribution daemon in the foreground
//! - lead / consumer: manage the pool and the consumer directory
//! - distribute / upgrade / purchase / recycle: run a trigger once
//! - assignment: inspect and update a consumer's assignments
//! - watch: stream events from a running daemon

use clap::{Parser, Subcommand};
use leadflow::domain::{AssignmentKind, AssignmentStatus, PlanTier, SubscriptionStatus};
use std::path::PathBuf;

/// Leadflow - fair lead distribution and assignment recycling
#[derive(Parser, Debug)]
#[command(name = "leadflow")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the daemon (IPC server and daily jobs) in the foreground
    Daemon,

    /// Lead pool commands
    Lead {
        #[command(subcommand)]
        command: LeadCommands,
    },

    /// Consumer directory commands
    Consumer {
        #[command(subcommand)]
        command: ConsumerCommands,
    },

    /// Run a distribution trigger once
    Distribute {
        #[command(subcommand)]
        command: DistributeCommands,
    },

    /// Record a plan upgrade and grant the new plan's quota now
    Upgrade {
        /// Consumer ID
        consumer_id: String,

        /// New plan tier (free, basic, standard, premium)
        tier: PlanTier,
    },

    /// Record a single purchased lead
    Purchase {
        /// Consumer ID
        consumer_id: String,

        /// Lead ID
        lead_id: String,
    },

    /// Run today's recycling sweep (no-op if it already ran)
    Recycle,

    /// Assignment commands
    Assignment {
        #[command(subcommand)]
        command: AssignmentCommands,
    },

    /// Stream events from a running daemon
    Watch,
}

/// Lead pool subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum LeadCommands {
    /// Append a lead to the pool
    Add {
        /// Opaque JSON payload
        #[arg(short, long, default_value = "{}")]
        payload: String,
    },

    /// List the pool in sequence order
    List,
}

/// Consumer subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum ConsumerCommands {
    /// Create a consumer, or update plan and subscription of an existing one
    Add {
        /// Consumer ID (generated when omitted)
        id: Option<String>,

        /// Plan tier
        #[arg(short, long, default_value = "free")]
        tier: PlanTier,

        /// Subscription status (active, past_due, canceled)
        #[arg(short, long, default_value = "active")]
        subscription: SubscriptionStatus,
    },

    /// List consumers
    List,

    /// Show one consumer and its assignment counts
    Show {
        /// Consumer ID
        id: String,
    },
}

/// Distribution trigger subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum DistributeCommands {
    /// Today's quota for every active consumer
    Scheduled,

    /// Fixed count for one consumer or all active consumers
    Admin {
        /// Consumer ID or "all-active"
        target: String,

        /// Leads per consumer
        #[arg(short = 'n', long)]
        count: u32,
    },

    /// Today's quota for one consumer
    #[command(name = "self")]
    SelfService {
        /// Consumer ID
        consumer_id: String,
    },
}

/// Assignment subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum AssignmentCommands {
    /// List a consumer's assignments
    List {
        /// Consumer ID
        consumer_id: String,

        /// Collection (subscription, purchased)
        #[arg(short, long, default_value = "subscription")]
        kind: AssignmentKind,
    },

    /// Change an assignment's status
    Set {
        /// Consumer ID
        consumer_id: String,

        /// Lead ID
        lead_id: String,

        /// New status (new, follow_up, not_interested, pending)
        status: AssignmentStatus,

        /// Days until the lead resurfaces
        #[arg(short = 'd', long)]
        countdown: Option<u32>,

        /// Collection (subscription, purchased)
        #[arg(short, long, default_value = "subscription")]
        kind: AssignmentKind,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_parse_no_args() {
        let cli = Cli::try_parse_from(["leadflow"]).unwrap();
        assert!(cli.command.is_none());
        assert!(!cli.verbose);
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_cli_config_option() {
        let cli = Cli::try_parse_from(["leadflow", "-c", "/path/to/leadflow.yml", "-v"]).unwrap();
        assert_eq!(cli.config.as_ref(), Some(&PathBuf::from("/path/to/leadflow.yml")));
        assert!(cli.is_verbose());
    }

    #[test]
    fn test_consumer_add_parses_enums() {
        let cli = Cli::try_parse_from(["leadflow", "consumer", "add", "c-1", "--tier", "premium", "-s", "past_due"])
            .unwrap();
        match cli.command {
            Some(Commands::Consumer {
                command: ConsumerCommands::Add { id, tier, subscription },
            }) => {
                assert_eq!(id.as_deref(), Some("c-1"));
                assert_eq!(tier, PlanTier::Premium);
                assert_eq!(subscription, SubscriptionStatus::PastDue);
            }
            _ => panic!("Expected consumer add command"),
        }
    }

    #[test]
    fn test_bad_tier_rejected() {
        assert!(Cli::try_parse_from(["leadflow", "upgrade", "c-1", "gold"]).is_err());
    }

    #[test]
    fn test_distribute_self() {
        let cli = Cli::try_parse_from(["leadflow", "distribute", "self", "c-1"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Distribute {
                command: DistributeCommands::SelfService { .. }
            })
        ));
    }

    #[test]
    fn test_distribute_admin_count() {
        let cli = Cli::try_parse_from(["leadflow", "distribute", "admin", "all-active", "-n", "3"]).unwrap();
        match cli.command {
            Some(Commands::Distribute {
                command: DistributeCommands::Admin { target, count },
            }) => {
                assert_eq!(target, "all-active");
                assert_eq!(count, 3);
            }
            _ => panic!("Expected distribute admin command"),
        }
    }

    #[test]
    fn test_assignment_set() {
        let cli = Cli::try_parse_from([
            "leadflow", "assignment", "set", "c-1", "lead-1", "follow_up", "-d", "3", "--kind", "purchased",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Assignment {
                command:
                    AssignmentCommands::Set {
                        status, countdown, kind, ..
                    },
            }) => {
                assert_eq!(status, AssignmentStatus::FollowUp);
                assert_eq!(countdown, Some(3));
                assert_eq!(kind, AssignmentKind::Purchased);
            }
            _ => panic!("Expected assignment set command"),
        }
    }
}

use clap::Parser;
use colored::*;
use eyre::{Context, Result, eyre};
use log::info;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

mod cli;

use cli::Cli;
use cli::commands::{AssignmentCommands, Commands, ConsumerCommands, DistributeCommands, LeadCommands};
use leadflow::allocator::AllocationOutcome;
use leadflow::config::Config;
use leadflow::daemon::{self, DaemonContext};
use leadflow::distribution::{BatchReport, DistributionTarget};
use leadflow::domain::{AssignmentKind, Consumer};
use leadflow::id::generate_consumer_id;
use leadflow::ipc::IpcClient;
use leadflow::recycling::RecyclingReport;
use leadflow::store::SqliteStore;

fn setup_logging(config: &Config, verbose: bool) -> Result<()> {
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("leadflow")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("leadflow.log");

    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    let level = if verbose { "debug" } else { config.log_level.as_deref().unwrap_or("info") };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

/// Open the configured database and wire the core around it
fn open_context(config: &Config) -> Result<DaemonContext> {
    let store = SqliteStore::open(&config.storage.db_path)
        .with_context(|| format!("Failed to open database {}", config.storage.db_path.display()))?;
    let ctx = DaemonContext::with_system_clock(Arc::new(store), config).context("Failed to build context")?;
    Ok(ctx)
}

async fn run_application(cli: &Cli, config: &Config) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    match &cli.command {
        None => handle_status(config),
        Some(Commands::Daemon) => {
            println!("{} {}", "Daemon listening on".cyan(), config.ipc.socket_path.display());
            daemon::run(config).await.context("Daemon failed")
        }
        Some(Commands::Watch) => handle_watch(config).await,
        Some(command) => {
            let ctx = open_context(config)?;
            handle_local_command(command, &ctx).await
        }
    }
}

fn handle_status(config: &Config) -> Result<()> {
    let ctx = open_context(config)?;
    let leads = ctx.store.ordered_lead_ids()?.len();
    let consumers = ctx.store.list_consumers()?;
    let active = consumers.iter().filter(|c| c.subscription.is_active()).count();
    println!("{} {}", "Database:".green(), config.storage.db_path.display());
    println!("  leads:     {}", leads);
    println!("  consumers: {} ({} active)", consumers.len(), active);
    println!("  today:     {} ({})", ctx.clock.today(), ctx.clock.weekday());
    Ok(())
}

async fn handle_local_command(command: &Commands, ctx: &DaemonContext) -> Result<()> {
    match command {
        Commands::Lead { command } => handle_lead_command(command, ctx),
        Commands::Consumer { command } => handle_consumer_command(command, ctx),
        Commands::Distribute { command } => handle_distribute_command(command, ctx).await,
        Commands::Upgrade { consumer_id, tier } => {
            info!("Plan upgrade: {} -> {}", consumer_id, tier);
            let (consumer, outcome) = ctx.distributor.on_plan_upgraded(consumer_id, *tier).await?;
            println!("{} {} is now on {}", "Upgraded:".green(), consumer.id, consumer.plan_tier);
            print_outcome(&outcome);
            Ok(())
        }
        Commands::Purchase { consumer_id, lead_id } => {
            info!("Purchase: {} bought {}", consumer_id, lead_id);
            if ctx.distributor.on_lead_purchased(consumer_id, lead_id).await? {
                println!("{} {} -> {}", "Purchased:".green(), lead_id, consumer_id);
            } else {
                println!("{} {} already owns {}", "Unchanged:".yellow(), consumer_id, lead_id);
            }
            Ok(())
        }
        Commands::Recycle => {
            let report = ctx.recycler.run_daily();
            print_recycling(&report);
            if report.is_complete() {
                Ok(())
            } else {
                Err(eyre!("Recycling incomplete ({} collection(s) failed)", report.errors.len()))
            }
        }
        Commands::Assignment { command } => handle_assignment_command(command, ctx),
        Commands::Daemon | Commands::Watch => Ok(()),
    }
}

fn handle_lead_command(command: &LeadCommands, ctx: &DaemonContext) -> Result<()> {
    match command {
        LeadCommands::Add { payload } => {
            let payload: serde_json::Value = serde_json::from_str(payload).context("Payload is not valid JSON")?;
            let lead = ctx.store.append_lead(payload)?;
            println!("{} {} (#{})", "Added lead:".green(), lead.id, lead.sequence);
        }
        LeadCommands::List => {
            let leads = ctx.store.list_leads()?;
            if leads.is_empty() {
                println!("{}", "Lead pool is empty".yellow());
            }
            for lead in leads {
                println!("{:>6}  {}  {}", lead.sequence, lead.id.cyan(), lead.payload);
            }
        }
    }
    Ok(())
}

fn handle_consumer_command(command: &ConsumerCommands, ctx: &DaemonContext) -> Result<()> {
    match command {
        ConsumerCommands::Add { id, tier, subscription } => {
            let id = id.clone().unwrap_or_else(generate_consumer_id);
            let consumer = Consumer::new(&id, *tier).with_subscription(*subscription);
            ctx.store.upsert_consumer(&consumer)?;
            println!("{} {} ({}, {})", "Saved consumer:".green(), id, tier, subscription);
        }
        ConsumerCommands::List => {
            for consumer in ctx.store.list_consumers()? {
                print_consumer(&consumer);
            }
        }
        ConsumerCommands::Show { id } => {
            let consumer = ctx
                .store
                .get_consumer(id)?
                .ok_or_else(|| eyre!("Consumer not found: {}", id))?;
            print_consumer(&consumer);
            for kind in [AssignmentKind::Subscription, AssignmentKind::Purchased] {
                let assignments = ctx.store.list_assignments(kind, id)?;
                let pending = assignments.iter().filter(|a| a.countdown_days.is_some()).count();
                println!("  {:<13} {} held, {} counting down", kind.to_string(), assignments.len(), pending);
            }
        }
    }
    Ok(())
}

async fn handle_distribute_command(command: &DistributeCommands, ctx: &DaemonContext) -> Result<()> {
    match command {
        DistributeCommands::Scheduled => {
            let report = ctx.distributor.scheduled_distribute_all().await?;
            print_batch(&report);
        }
        DistributeCommands::Admin { target, count } => {
            let target: DistributionTarget = target.parse()?;
            let report = ctx.distributor.admin_distribute(&target, *count).await?;
            print_batch(&report);
        }
        DistributeCommands::SelfService { consumer_id } => {
            let outcome = ctx.distributor.self_distribute(consumer_id).await?;
            print_outcome(&outcome);
        }
    }
    Ok(())
}

fn handle_assignment_command(command: &AssignmentCommands, ctx: &DaemonContext) -> Result<()> {
    match command {
        AssignmentCommands::List { consumer_id, kind } => {
            for a in ctx.store.list_assignments(*kind, consumer_id)? {
                let countdown = a.countdown_days.map(|d| format!("{}d", d)).unwrap_or_else(|| "-".to_string());
                println!("{}  {:<15} {:<8} {}", a.lead_id.cyan(), a.status.to_string(), a.action.as_str(), countdown);
            }
        }
        AssignmentCommands::Set {
            consumer_id,
            lead_id,
            status,
            countdown,
            kind,
        } => {
            let a = ctx
                .store
                .update_assignment(*kind, consumer_id, lead_id, *status, *countdown)?;
            println!("{} {} is {} ({})", "Updated:".green(), a.lead_id, a.status, a.action.as_str());
        }
    }
    Ok(())
}

async fn handle_watch(config: &Config) -> Result<()> {
    let client = IpcClient::new(&config.ipc.socket_path);
    client
        .connect()
        .await
        .with_context(|| format!("Failed to connect to {}", config.ipc.socket_path.display()))?;
    client.subscribe().await.context("Failed to subscribe")?;
    println!("{}", "Watching daemon events (Ctrl-C to stop)".cyan());

    while let Some(event) = client.recv_event().await {
        println!("{} {}", event.event.green(), event.data);
    }
    println!("{}", "Daemon closed the connection".yellow());
    Ok(())
}

fn print_consumer(consumer: &Consumer) {
    println!(
        "{}  {:<8} {:<9} cursor={}",
        consumer.id.cyan(),
        consumer.plan_tier.to_string(),
        consumer.subscription.to_string(),
        consumer.cursor
    );
}

fn print_outcome(outcome: &AllocationOutcome) {
    println!(
        "{} {} assigned to {} (cursor {})",
        "Distributed:".green(),
        outcome.assigned_count,
        outcome.consumer_id,
        outcome.new_cursor
    );
    if let Some(reason) = &outcome.reason {
        println!("  {}", reason.yellow());
    }
}

fn print_batch(report: &BatchReport) {
    if report.already_ran {
        println!("{}", "Scheduled distribution already ran today".yellow());
        return;
    }
    println!("{} {} lead(s) total", "Distributed:".green(), report.total_assigned);
    for result in &report.per_consumer {
        match (&result.error, &result.reason) {
            (Some(error), _) => println!("  {} {}", result.consumer_id, error.red()),
            (None, Some(reason)) => println!("  {} {} ({})", result.consumer_id, result.assigned, reason.yellow()),
            (None, None) => println!("  {} {}", result.consumer_id, result.assigned),
        }
    }
}

fn print_recycling(report: &RecyclingReport) {
    for kind in [AssignmentKind::Subscription, AssignmentKind::Purchased] {
        match report.counts(kind) {
            Some(counts) if counts.already_ran => println!("  {:<13} {}", kind.to_string(), "already ran today".yellow()),
            Some(counts) => println!(
                "  {:<13} {} decremented, {} resurfaced",
                kind.to_string(),
                counts.decremented,
                counts.reset
            ),
            None => {}
        }
    }
    for error in &report.errors {
        println!("  {:<13} {}", error.collection.to_string(), error.message.red());
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    setup_logging(&config, cli.is_verbose()).context("Failed to setup logging")?;

    info!("Starting with config from: {:?}", cli.config);

    run_application(&cli, &config).await.context("Application failed")?;

    Ok(())
}

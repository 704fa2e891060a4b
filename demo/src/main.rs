//! BASTION Permission Engine demo CLI
//!
//! Runs the bundled scenarios, or resolves ad-hoc checks against a registry
//! file.
//!
//! Usage:
//!   cargo run -p demo -- run-all
//!   cargo run -p demo -- precedence
//!   cargo run -p demo -- check --principal player:alex --grant world.spectate=true world.break
//!   cargo run -p demo -- validate --registry demo/registries/server.toml --strict

mod host;
mod scenarios;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use bastion_contracts::{
    error::{BastionError, BastionResult},
    principal::PrincipalId,
};
use bastion_core::Permissible;
use bastion_registry::InMemoryRegistry;

use crate::host::{OperatorFlag, Plugin};

// ── CLI definition ────────────────────────────────────────────────────────────

/// BASTION layered permission engine demo.
#[derive(Parser)]
#[command(
    name = "demo",
    about = "BASTION permission engine demo",
    long_about = "Runs BASTION demo scenarios showing attachment precedence, child\n\
                  inheritance, expiring grants, decision interceptors and the audit chain."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run every scenario in sequence.
    RunAll,
    /// Scenario 1: later attachments win, removal restores lower layers.
    Precedence,
    /// Scenario 2: parent grants flow through children; operator defaults.
    Inheritance,
    /// Scenario 3: a temporary grant expires on the tick clock.
    Expiry,
    /// Scenario 4: a veto interceptor and the hash-chained audit trail.
    Audit,
    /// Scenario 5: registry changes report which principals to recalculate.
    LiveRegistry,
    /// Resolve permissions for one principal.
    Check(CheckArgs),
    /// Load a registry file and report problems.
    Validate(ValidateArgs),
}

#[derive(Args)]
struct CheckArgs {
    /// Registry TOML file. Defaults to the bundled server registry.
    #[arg(long)]
    registry: Option<PathBuf>,

    #[arg(long, default_value = "player:demo")]
    principal: String,

    /// Treat the principal as an operator.
    #[arg(long)]
    op: bool,

    /// Explicit value as `name=true|false`; repeatable, later grants win.
    #[arg(long = "grant", value_name = "NAME=VALUE")]
    grants: Vec<String>,

    /// Print the full effective map instead of individual checks.
    #[arg(long)]
    all: bool,

    /// Permissions to check.
    permissions: Vec<String>,
}

#[derive(Args)]
struct ValidateArgs {
    #[arg(long)]
    registry: PathBuf,

    /// Fail when the child graph contains a cycle.
    #[arg(long)]
    strict: bool,
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() {
    // Initialize structured logging.  Set RUST_LOG=debug for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();

    print_banner();

    let result = match cli.command {
        Command::RunAll => run_all(),
        Command::Precedence => scenarios::precedence(),
        Command::Inheritance => scenarios::inheritance(),
        Command::Expiry => scenarios::expiry(),
        Command::Audit => scenarios::audit(),
        Command::LiveRegistry => scenarios::live_registry(),
        Command::Check(args) => run_check(args),
        Command::Validate(args) => run_validate(args),
    };

    match result {
        Ok(()) => {
            println!("Done.");
        }
        Err(e) => {
            eprintln!("Demo error: {}", e);
            std::process::exit(1);
        }
    }
}

// ── Dispatch ──────────────────────────────────────────────────────────────────

fn run_all() -> BastionResult<()> {
    scenarios::precedence()?;
    scenarios::inheritance()?;
    scenarios::expiry()?;
    scenarios::audit()?;
    scenarios::live_registry()?;
    Ok(())
}

fn load_registry(path: Option<&PathBuf>) -> BastionResult<Arc<InMemoryRegistry>> {
    match path {
        Some(path) => Ok(Arc::new(InMemoryRegistry::from_file(path)?)),
        None => scenarios::server_registry(),
    }
}

fn parse_grant(grant: &str) -> BastionResult<(&str, bool)> {
    let (name, value) = grant.split_once('=').unwrap_or((grant, "true"));
    let value = value
        .trim()
        .parse::<bool>()
        .map_err(|_| BastionError::InvalidArgument {
            reason: format!("grant '{}' must look like name=true or name=false", grant),
        })?;
    Ok((name, value))
}

fn run_check(args: CheckArgs) -> BastionResult<()> {
    let registry = load_registry(args.registry.as_ref())?;
    let principal = Permissible::builder(PrincipalId::new(&args.principal), registry)
        .operator(OperatorFlag::new(args.op))
        .build();

    let cli = Plugin::new("cli");
    for grant in &args.grants {
        let (name, value) = parse_grant(grant)?;
        principal.add_attachment_with(cli.clone(), name, value)?;
    }

    println!(
        "  {} (operator: {}, attachments: {})",
        principal.principal(),
        principal.is_operator(),
        principal.attachments().len()
    );

    if args.all || args.permissions.is_empty() {
        for entry in principal.effective_permissions() {
            println!(
                "    {:<20} {:<5}  ({})",
                entry.key.as_str(),
                if entry.value { "ALLOW" } else { "DENY" },
                if entry.is_default() { "registry default" } else { "attachment" }
            );
        }
    }

    let names: Vec<&str> = args.permissions.iter().map(String::as_str).collect();
    scenarios::show(&principal, &names)?;

    let cycles = principal.cycles();
    if !cycles.is_empty() {
        println!("  note: resolution truncated {} cyclic branch(es)", cycles.len());
    }
    Ok(())
}

fn run_validate(args: ValidateArgs) -> BastionResult<()> {
    let registry = InMemoryRegistry::from_file(&args.registry)?;
    println!(
        "  {}: {} permission(s), fallback '{}'",
        args.registry.display(),
        registry.len(),
        bastion_core::traits::PermissionRegistry::fallback_policy(&registry)
    );

    let cycles = registry.find_cycles();
    for permission in &cycles {
        println!("  cycle through '{}'", permission);
    }
    if args.strict {
        registry.ensure_acyclic()?;
    }
    if cycles.is_empty() {
        println!("  child graph is acyclic");
    }
    Ok(())
}

// ── Banner ────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("BASTION: Layered Permission Engine");
    println!("==================================");
    println!();
    println!("Resolution per principal:");
    println!("  [1] Registry defaults for the operator class, children propagated");
    println!("  [2] Attachments oldest first; later writes win");
    println!("  [3] Check: effective map → node default → registry fallback");
    println!("  [4] Interceptors see and may override every decision");
    println!();
}

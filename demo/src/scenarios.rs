//! Demo scenarios. Each one builds real BASTION components against the
//! bundled server registry and prints what a host would observe.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use bastion_audit::AuditInterceptor;
use bastion_contracts::{
    decision::DecisionRecord,
    error::{BastionError, BastionResult},
    node::{DefaultPolicy, PermissionNode},
    principal::PrincipalId,
};
use bastion_core::{AttachmentOptions, InterceptorChain, Permissible, TickScheduler};
use bastion_registry::InMemoryRegistry;

use crate::host::{OperatorFlag, Plugin};

/// The registry shipped with the demo.
pub const SERVER_REGISTRY: &str = include_str!("../registries/server.toml");

pub fn server_registry() -> BastionResult<Arc<InMemoryRegistry>> {
    Ok(Arc::new(InMemoryRegistry::from_toml_str(SERVER_REGISTRY)?))
}

// ── Output helpers ────────────────────────────────────────────────────────────

/// Print one line per permission: decision plus where it came from.
pub fn show(principal: &Permissible, names: &[&str]) -> BastionResult<()> {
    for name in names {
        let allowed = principal.check(name)?;
        let origin = match principal.explain(name)? {
            Some(entry) => match entry.source {
                Some(id) => format!("attachment {}", short(&id.to_string())),
                None => "registry default".to_string(),
            },
            None => "fallback".to_string(),
        };
        println!(
            "    {:<20} {:<5}  ({})",
            name,
            if allowed { "ALLOW" } else { "DENY" },
            origin
        );
    }
    Ok(())
}

fn short(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

// ── Scenario 1: attachment precedence ─────────────────────────────────────────

/// Later attachments win; removing one re-exposes the layer beneath it.
pub fn precedence() -> BastionResult<()> {
    println!("=== Scenario 1: Attachment precedence ===");
    println!();

    let registry = server_registry()?;
    let alex = Permissible::builder(PrincipalId::new("player:alex"), registry).build();

    let muted = alex.add_attachment_with(Plugin::new("mute-guard"), "chat.send", false)?;
    let vip = alex.add_attachment_with(Plugin::new("vip-perks"), "chat.send", true)?;
    println!("  A1 mute-guard chat.send=false, A2 vip-perks chat.send=true");
    show(&alex, &["chat.send"])?;

    alex.remove_attachment(&vip)?;
    println!("  removed A2");
    show(&alex, &["chat.send"])?;

    alex.remove_attachment(&muted)?;
    println!("  removed A1");
    show(&alex, &["chat.send"])?;

    match alex.remove_attachment(&muted) {
        Err(BastionError::NotAttached { .. }) => {
            println!("  removing A1 again: NotAttached (expected)")
        }
        other => println!("  removing A1 again: unexpected {:?}", other),
    }

    let retired = Plugin::new("retired-plugin");
    retired.disable();
    match alex.add_attachment(retired) {
        Err(e @ BastionError::InvalidOwner { .. }) => println!("  disabled plugin: {}", e),
        other => println!("  disabled plugin: unexpected {:?}", other),
    }
    println!();
    Ok(())
}

// ── Scenario 2: child inheritance and operator status ─────────────────────────

/// Granting or denying a parent node flows through its children.
pub fn inheritance() -> BastionResult<()> {
    println!("=== Scenario 2: Child inheritance ===");
    println!();

    let registry = server_registry()?;
    let operator = OperatorFlag::new(false);
    let alex = Permissible::builder(PrincipalId::new("player:alex"), registry)
        .operator(operator)
        .build();
    let names = [
        "world.build",
        "world.place",
        "world.break",
        "moderation.kick",
        "tutorial.hints",
    ];

    println!("  defaults for a regular player");
    show(&alex, &names)?;

    let spectate = alex.add_attachment_with(Plugin::new("spectator"), "world.spectate", true)?;
    println!("  spectator grants world.spectate (implies world.build=false)");
    show(&alex, &names)?;
    alex.remove_attachment(&spectate)?;

    alex.set_operator(true)?;
    println!("  promoted to operator");
    show(&alex, &names)?;
    println!();
    Ok(())
}

// ── Scenario 3: expiring attachments ──────────────────────────────────────────

/// A temporary grant removes itself once the scheduler reaches its tick.
pub fn expiry() -> BastionResult<()> {
    println!("=== Scenario 3: Expiring attachment ===");
    println!();

    let registry = server_registry()?;
    let scheduler = Arc::new(TickScheduler::new());
    let alex = Permissible::builder(PrincipalId::new("player:alex"), registry)
        .scheduler(scheduler.clone())
        .build();

    let released = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&released);
    alex.create_attachment(
        Plugin::new("vote-rewards"),
        AttachmentOptions::new()
            .permission("chat.color", true)
            .expire_after(3)
            .on_removed(move |info| {
                if let Ok(mut sink) = sink.lock() {
                    sink.push(info.owner.clone());
                }
            }),
    )?;

    for tick in 0..=3u64 {
        if tick > 0 {
            scheduler.tick();
        }
        println!("  tick {}", scheduler.now());
        show(&alex, &["chat.color"])?;
    }

    let released = released.lock().map(|r| r.join(", ")).unwrap_or_default();
    println!("  removal callbacks ran for: {}", released);

    scheduler.shutdown();
    match alex.add_expiring_attachment(Plugin::new("vote-rewards"), 5) {
        Err(e @ BastionError::SchedulingFailed { .. }) => {
            println!("  after shutdown: {} (nothing published)", e)
        }
        other => println!("  after shutdown: unexpected {:?}", other),
    }
    println!();
    Ok(())
}

// ── Scenario 4: interceptors and the audit trail ──────────────────────────────

/// A veto interceptor overrides decisions; the audit trail records them.
pub fn audit() -> BastionResult<()> {
    println!("=== Scenario 4: Interceptors and decision audit ===");
    println!();

    let registry = server_registry()?;
    let audit = AuditInterceptor::new("session-001");
    let chain = Arc::new(InterceptorChain::new());
    chain.register(Arc::new(|record: &mut DecisionRecord| {
        if record.principal.0 == "player:griefer" && record.key.as_str().starts_with("world.") {
            record.set_allowed(false);
        }
    }));
    chain.register(Arc::new(audit.clone()));

    let alex = Permissible::builder(PrincipalId::new("player:alex"), registry.clone())
        .interceptors(chain.clone())
        .build();
    let griefer = Permissible::builder(PrincipalId::new("player:griefer"), registry)
        .interceptors(chain)
        .build();

    println!("  player:alex");
    show(&alex, &["world.build", "world.break"])?;
    println!("  player:griefer (world.* vetoed by interceptor)");
    show(&griefer, &["world.build", "world.break"])?;

    let log = audit.export_log();
    println!();
    println!(
        "  Audit trail {}: {} decision(s), {} denial(s)",
        log.trail_id,
        log.events.len(),
        log.denials()
    );
    println!(
        "  Audit chain integrity:  {}",
        if audit.verify_integrity() { "VERIFIED" } else { "FAILED" }
    );
    println!("  Terminal hash:          {}", log.terminal_hash);
    println!();
    Ok(())
}

// ── Scenario 5: live registry changes ─────────────────────────────────────────

/// Registry mutations report stale principals; the host recalculates them.
pub fn live_registry() -> BastionResult<()> {
    println!("=== Scenario 5: Live registry changes ===");
    println!();

    let registry = server_registry()?;
    let mut online: BTreeMap<PrincipalId, Arc<Permissible>> = BTreeMap::new();
    for id in ["player:alex", "player:sam"] {
        let principal = Permissible::builder(PrincipalId::new(id), registry.clone()).build();
        online.insert(principal.principal().clone(), principal);
    }
    let recalculate = |affected: &std::collections::BTreeSet<PrincipalId>| {
        for id in affected {
            if let Some(principal) = online.get(id) {
                principal.recalculate();
            }
        }
        println!(
            "  recalculated: {}",
            affected
                .iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );
    };

    let node = PermissionNode::new("home.set", DefaultPolicy::AlwaysTrue)?
        .describe("Set a home location")
        .child("home.teleport", true)?;
    recalculate(&registry.add_permission(node)?);
    if let Some(alex) = online.get(&PrincipalId::new("player:alex")) {
        show(alex, &["home.set", "home.teleport"])?;
    }

    recalculate(&registry.set_default("chat.send", DefaultPolicy::TrueIfOperator)?);
    if let Some(sam) = online.get(&PrincipalId::new("player:sam")) {
        show(sam, &["chat.send"])?;
    }
    println!();
    Ok(())
}

//! Dry-run activation: `servitor start`.

use anyhow::{Context, Result};
use servitor::descriptor::ServiceId;
use servitor::observer::{EventKind, EventLog};
use servitor::orchestrator::Orchestrator;
use std::path::Path;
use std::sync::Arc;

use super::{load, lookup};

fn join(ids: &[ServiceId]) -> String {
    ids.iter()
        .map(ServiceId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

fn describe(kind: &EventKind) -> String {
    match kind {
        EventKind::Activated { service } => format!("activated {}", service),
        EventKind::Deactivated { service } => format!("deactivated {}", service),
        EventKind::ActivationFailed { service, error } => {
            format!("failed to activate {}: {}", service, error)
        }
        EventKind::RolledBack { services } => format!("rolled back [{}]", join(services)),
        EventKind::CycleDetected { path } => {
            let rendered: Vec<&str> = path.iter().map(ServiceId::as_str).collect();
            format!("dependency cycle {}", rendered.join(" -> "))
        }
        EventKind::Restarted {
            service,
            dependents,
        } => format!("restarted {} with [{}]", service, join(dependents)),
        EventKind::RestartFailed {
            service,
            dependents,
            error,
        } => format!(
            "restart of {} failed, pending [{}]: {}",
            service,
            join(dependents),
            error
        ),
        EventKind::ContextOpened { context } => format!("opened context {}", context),
        EventKind::ContextReleased {
            context,
            deactivated,
        } => format!("released context {} [{}]", context, join(deactivated)),
    }
}

fn print_events(log: &EventLog) {
    for event in log.take() {
        println!("  [{:>3}] {}", event.seq, describe(&event.kind));
    }
}

pub fn cmd_start(manifest_path: &Path, services: &[String]) -> Result<()> {
    let (manifest, registry) = load(manifest_path)?;
    for service in services {
        lookup(&registry, service)?;
    }

    let log = Arc::new(EventLog::new());
    let orchestrator = Orchestrator::builder(registry)
        .with_config(manifest)
        .with_observer(log.clone())
        .build();

    let ids: Vec<&str> = services.iter().map(String::as_str).collect();
    let started = orchestrator.start_all(&ids);

    println!("Startup:");
    print_events(&log);
    started.context("Failed to start services")?;

    println!();
    println!("Active: {}", join(&orchestrator.active_services()?));

    orchestrator.shut_down_all()?;
    println!();
    println!("Shutdown:");
    print_events(&log);
    Ok(())
}

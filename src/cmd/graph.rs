//! Static graph inspection: `servitor plan`, `servitor check`, `servitor dependents`.

use anyhow::{Result, bail};
use serde::Serialize;
use servitor::descriptor::ServiceId;
use servitor::errors::LifecycleError;
use servitor::resolver::Resolver;
use std::collections::{BTreeSet, HashSet};
use std::path::Path;

use super::{load, lookup};

#[derive(Serialize)]
struct PlanOutput<'a> {
    services: &'a [String],
    order: Vec<ServiceId>,
}

pub fn cmd_plan(manifest_path: &Path, services: &[String], json: bool) -> Result<()> {
    let (_, registry) = load(manifest_path)?;
    let roots = services
        .iter()
        .map(|service| lookup(&registry, service))
        .collect::<Result<Vec<_>>>()?;
    let order = registry.ids(&Resolver::new(&registry).resolve_all(&roots)?);

    if json {
        let output = PlanOutput { services, order };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let requested: Vec<String> = services.iter().map(|s| format!("'{}'", s)).collect();
    println!("Activation order for {}:", requested.join(", "));
    for (i, id) in order.iter().enumerate() {
        println!("  {:>2}. {}", i + 1, id);
    }
    Ok(())
}

pub fn cmd_check(manifest_path: &Path) -> Result<()> {
    let (_, registry) = load(manifest_path)?;
    let resolver = Resolver::new(&registry);

    // The same cycle is found from every service that reaches it.
    let mut seen: HashSet<BTreeSet<ServiceId>> = HashSet::new();
    let mut cycles = Vec::new();
    for index in 0..registry.len() {
        if let Err(LifecycleError::DependencyCycle { path }) = resolver.resolve(index) {
            if seen.insert(path.iter().cloned().collect()) {
                cycles.push(path);
            }
        }
    }

    if cycles.is_empty() {
        let roots = registry.ids(&registry.roots());
        let roots: Vec<&str> = roots.iter().map(ServiceId::as_str).collect();
        println!("OK: {} services, no dependency cycles", registry.len());
        println!("Roots: {}", roots.join(", "));
        return Ok(());
    }

    for path in &cycles {
        let rendered: Vec<&str> = path.iter().map(ServiceId::as_str).collect();
        println!("Cycle: {}", rendered.join(" -> "));
    }
    bail!("Found {} dependency cycle(s)", cycles.len())
}

pub fn cmd_dependents(manifest_path: &Path, service: &str, direct: bool) -> Result<()> {
    let (_, registry) = load(manifest_path)?;
    let index = lookup(&registry, service)?;

    let mut found: BTreeSet<usize> = registry.dependents(index).iter().copied().collect();
    if !direct {
        let mut stack: Vec<usize> = found.iter().copied().collect();
        while let Some(next) = stack.pop() {
            for &dependent in registry.dependents(next) {
                if dependent != index && found.insert(dependent) {
                    stack.push(dependent);
                }
            }
        }
    }
    found.remove(&index);

    if found.is_empty() {
        println!("No services depend on '{}'", service);
        return Ok(());
    }
    println!("Services depending on '{}':", service);
    for i in found {
        println!("  {}", registry.id(i));
    }
    Ok(())
}

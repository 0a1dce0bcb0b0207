//! Runtime commands - list, validate, inspect and install runtimes.

use crate::app::App;
use aftp::runtime::{backends_for, tools, Backend, RuntimeCatalog, RuntimeState};
use clap::Subcommand;

#[derive(Subcommand)]
pub(crate) enum RuntimeCommand {
    /// List catalog runtimes and whether each is created
    List,

    /// Check that a runtime's capabilities import (all runtimes when omitted)
    Validate {
        /// Runtime name
        name: Option<String>,
    },

    /// Show per-capability import details
    Details {
        /// Runtime name
        name: String,
    },

    /// Rescan runtimes and tools and rewrite the registry
    Rescan,

    /// Run a runtime's setup script
    Install {
        /// Runtime name
        name: String,
        /// Compute backend (cpu, cuda, rocm, intel)
        #[arg(long)]
        backend: Option<Backend>,
    },
}

pub(crate) async fn run(app: &App, command: RuntimeCommand) -> anyhow::Result<()> {
    match command {
        RuntimeCommand::List => list(app),
        RuntimeCommand::Validate { name: Some(name) } => {
            let state = app.probe().state(&name).await;
            print_state(&state);
            Ok(())
        }
        RuntimeCommand::Validate { name: None } => {
            let (_, states) = app
                .registry()
                .rescan_with_states(RuntimeCatalog::builtin())
                .await?;
            for state in &states {
                print_state(state);
            }
            Ok(())
        }
        RuntimeCommand::Details { name } => details(app, &name).await,
        RuntimeCommand::Rescan => {
            let doc = app.registry().rescan_and_update(RuntimeCatalog::builtin())?;
            println!("{}", serde_json::to_string_pretty(&doc)?);
            Ok(())
        }
        RuntimeCommand::Install { name, backend } => install(app, &name, backend).await,
    }
}

fn list(app: &App) -> anyhow::Result<()> {
    let probe = app.probe();
    println!("Runtimes under {}:", probe.layout().root().display());
    for spec in RuntimeCatalog::builtin().iter() {
        let status = if probe.is_materialized(&spec.name) {
            "created"
        } else {
            "missing"
        };
        let backends: Vec<&str> = backends_for(&spec.name).iter().map(|b| b.as_str()).collect();
        println!(
            "  {:<12} {:<8} [{}]  backends: {}",
            spec.name,
            status,
            spec.capabilities.join(", "),
            backends.join(", ")
        );
    }
    Ok(())
}

fn print_state(state: &RuntimeState) {
    if state.ok {
        println!("{}: OK", state.name);
    } else if !state.created {
        println!("{}: runtime not created yet", state.name);
    } else {
        let missing: Vec<&str> = state.missing.iter().map(String::as_str).collect();
        println!("{}: missing imports: {}", state.name, missing.join(", "));
    }
}

async fn details(app: &App, name: &str) -> anyhow::Result<()> {
    let details = app.probe().details(name).await;
    println!("{} - import details", name);
    if details.is_empty() {
        println!("  (no capabilities defined for this runtime)");
    }
    for (capability, status) in &details {
        if status.ok {
            println!(
                "  ok    {} ({})",
                capability,
                status.version.as_deref().unwrap_or("version unknown")
            );
        } else {
            println!(
                "  FAIL  {} ({})",
                capability,
                status.error.as_deref().unwrap_or("import failed")
            );
        }
    }
    Ok(())
}

async fn install(app: &App, name: &str, backend: Option<Backend>) -> anyhow::Result<()> {
    let outcome = app.installer().run(name, backend).await?;
    print!("{}", outcome.output);
    if !outcome.output.ends_with('\n') && !outcome.output.is_empty() {
        println!();
    }
    match outcome.exit_code {
        Some(code) => println!("{} exited with {}", outcome.script.display(), code),
        None => println!("{} was terminated", outcome.script.display()),
    }

    let state = app.probe().state(name).await;
    println!("{}: {}", name, state.status_label());
    app.registry().rescan_and_update(RuntimeCatalog::builtin())?;

    if !outcome.success {
        anyhow::bail!("installer for {} failed", name);
    }
    Ok(())
}

pub(crate) fn show_registry(app: &App) -> anyhow::Result<()> {
    let doc = app.registry().read();
    println!("{}", serde_json::to_string_pretty(&doc)?);
    Ok(())
}

pub(crate) fn tools() -> anyhow::Result<()> {
    for (name, status) in tools::scan_tools() {
        if status.found {
            println!("{:<10} {}", name, status.path);
        } else {
            println!("{:<10} not found", name);
        }
    }
    Ok(())
}

//! Diagnostics command - plain-text report of runtimes, tools and service.

use crate::app::App;
use aftp::runtime::{DiagnosticsReport, RuntimeCatalog, ServiceSnapshot};

pub(crate) async fn run(app: &App, probe: bool) -> anyhow::Result<()> {
    let registry = app.registry();

    let report = if probe {
        let (doc, states) = registry.rescan_with_states(RuntimeCatalog::builtin()).await?;
        let executor = app.executor()?;
        let reachable = executor.server_reachable(None).await;
        let models = if reachable {
            executor.list_models().await
        } else {
            Vec::new()
        };
        DiagnosticsReport::new(doc)
            .with_states(states)
            .with_service(ServiceSnapshot {
                endpoint: executor.service().endpoint().to_string(),
                reachable,
                models,
            })
    } else {
        DiagnosticsReport::new(registry.read())
    };

    print!("{}", report);
    if !probe {
        println!();
        println!("Tip: run `aftp diagnostics --probe` for per-runtime import checks.");
    }
    Ok(())
}

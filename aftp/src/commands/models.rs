//! Model handle commands - the local registry of known models.

use crate::app::App;
use aftp::ModelHandle;
use clap::Subcommand;

#[derive(Subcommand)]
pub(crate) enum ModelsCommand {
    /// List registered handles
    List {
        /// Only this kind (ollama, hf, tts, stt, custom)
        #[arg(long)]
        kind: Option<String>,
    },

    /// Register or replace a handle
    Add {
        /// Handle name
        handle: String,
        /// Kind (ollama, hf, tts, stt, custom)
        #[arg(long = "type", default_value = "ollama")]
        kind: String,
        /// Model name as the backend knows it
        name: String,
        #[arg(long, default_value = "")]
        source: String,
        #[arg(long, default_value = "")]
        license_url: String,
        #[arg(long, default_value = "")]
        notes: String,
    },

    /// Remove a handle
    Remove {
        /// Handle name
        handle: String,
    },
}

pub(crate) fn run(app: &App, command: ModelsCommand) -> anyhow::Result<()> {
    let registry = app.models();
    match command {
        ModelsCommand::List { kind } => {
            let models = registry.list(kind.as_deref());
            if models.is_empty() {
                println!("(no models registered)");
            }
            for (handle, model) in models {
                println!("{:<20} {:<8} {}", handle, model.kind, model.name);
            }
        }
        ModelsCommand::Add {
            handle,
            kind,
            name,
            source,
            license_url,
            notes,
        } => {
            let model = ModelHandle::new(kind, name)
                .with_source(source)
                .with_license_url(license_url)
                .with_notes(notes);
            registry.upsert(handle.clone(), model)?;
            println!("registered {}", handle);
        }
        ModelsCommand::Remove { handle } => {
            if registry.remove(&handle)? {
                println!("removed {}", handle);
            } else {
                println!("{} was not registered", handle);
            }
        }
    }
    Ok(())
}

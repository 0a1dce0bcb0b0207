//! Chat commands - conversations stored one file per id.

use super::cancel_on_ctrl_c;
use crate::app::App;
use clap::Subcommand;

#[derive(Subcommand)]
pub(crate) enum ChatCommand {
    /// List conversation ids
    List,

    /// Print a conversation
    Show {
        /// Conversation id
        id: String,
    },

    /// Create a conversation (no-op when it exists)
    New {
        /// Conversation id
        id: String,
    },

    /// Delete a conversation
    Delete {
        /// Conversation id
        id: String,
    },

    /// Send a message and record the reply (Ctrl-C cancels without saving)
    Send {
        /// Conversation id
        id: String,
        /// Message text
        prompt: String,
        /// Model for a conversation with none bound
        #[arg(long)]
        model: Option<String>,
    },

    /// Bind a model to a conversation
    Bind {
        /// Conversation id
        id: String,
        /// Model name
        model: String,
    },
}

pub(crate) async fn run(app: &App, command: ChatCommand) -> anyhow::Result<()> {
    let store = app.conversations();
    match command {
        ChatCommand::List => {
            for id in store.list()? {
                println!("{}", id);
            }
        }
        ChatCommand::Show { id } => {
            let conversation = store.load(&id)?;
            println!(
                "# {} (model: {})",
                conversation.id,
                conversation.model.as_deref().unwrap_or("none")
            );
            for message in &conversation.messages {
                println!("\n[{}]\n{}", message.role.as_str(), message.content);
            }
        }
        ChatCommand::New { id } => {
            store.create(&id)?;
            println!("created {}", id);
        }
        ChatCommand::Delete { id } => {
            store.delete(&id)?;
            println!("deleted {}", id);
        }
        ChatCommand::Send { id, prompt, model } => {
            let executor = app.executor()?;
            if let Some(model) = model {
                if store.load(&id)?.model.is_none() {
                    executor.bind_model(&id, model)?;
                }
            }
            let result = executor.chat(&id, prompt, None, cancel_on_ctrl_c()).await?;
            println!("{}", result.content);
            if result.is_cancelled() {
                eprintln!("[cancelled, not saved]");
            }
        }
        ChatCommand::Bind { id, model } => {
            let conversation = app.executor()?.bind_model(&id, model)?;
            println!(
                "{} now uses {}",
                conversation.id,
                conversation.model.as_deref().unwrap_or("none")
            );
        }
    }
    Ok(())
}

//! Service commands - status, model lifecycle and generation.

use super::cancel_on_ctrl_c;
use crate::app::App;
use aftp::{FinishReason, GenerateRequest};
use clap::Subcommand;
use futures::StreamExt;
use std::io::Write;
use std::path::PathBuf;

#[derive(Subcommand)]
pub(crate) enum ServiceCommand {
    /// Show the resolved endpoint and whether it answers
    Status,

    /// List models available on the service
    Models,

    /// Pull a model
    Pull {
        /// Model name, e.g. `llama3:8b`
        name: String,
    },

    /// Delete a model
    Delete {
        /// Model name
        name: String,
    },

    /// Generate text from a prompt
    Generate {
        /// Model name
        model: String,
        /// Prompt text
        prompt: String,
        /// Print fragments as they arrive (Ctrl-C stops)
        #[arg(long)]
        stream: bool,
        /// Sampling option as `key=value` (value parsed as JSON when possible)
        #[arg(long = "option", value_parser = parse_option)]
        options: Vec<(String, serde_json::Value)>,
    },

    /// Run the service installer script
    Install {
        /// Script to run instead of the default one
        script: Option<PathBuf>,
    },
}

pub(crate) async fn run(app: &App, command: ServiceCommand) -> anyhow::Result<()> {
    match command {
        ServiceCommand::Status => {
            let executor = app.executor()?;
            let endpoint = executor.service().endpoint();
            if executor.server_reachable(None).await {
                println!("{}: reachable", endpoint);
            } else {
                println!("{}: not reachable", endpoint);
            }
            Ok(())
        }
        ServiceCommand::Models => {
            let models = app.executor()?.list_models().await;
            if models.is_empty() {
                println!("(no models reported; the service may be down)");
            }
            for model in models {
                println!("{}", model);
            }
            Ok(())
        }
        ServiceCommand::Pull { name } => {
            println!("pulling {}...", name);
            let message = app.executor()?.pull_model(&name, None).await?;
            println!("{}", message);
            if app.settings.show_model_license_notice {
                println!("Check the model's license before use.");
            }
            Ok(())
        }
        ServiceCommand::Delete { name } => {
            let message = app.executor()?.delete_model(&name, None).await?;
            println!("{}", message);
            Ok(())
        }
        ServiceCommand::Generate {
            model,
            prompt,
            stream,
            options,
        } => generate(app, model, prompt, stream, options).await,
        ServiceCommand::Install { script } => {
            let outcome = app.installer().install_service(script.as_deref()).await?;
            print!("{}", outcome.output);
            if !outcome.success {
                anyhow::bail!("{} failed", outcome.script.display());
            }
            Ok(())
        }
    }
}

async fn generate(
    app: &App,
    model: String,
    prompt: String,
    stream: bool,
    options: Vec<(String, serde_json::Value)>,
) -> anyhow::Result<()> {
    let executor = app.executor()?;
    let mut req = GenerateRequest::new(model, prompt);
    for (key, value) in options {
        req = req.with_option(key, value);
    }

    if !stream {
        let result = executor.generate_text(req).await?;
        println!("{}", result.content);
        return Ok(());
    }

    let mut fragments = executor.spawn_stream(req.with_stream(true), cancel_on_ctrl_c());
    let mut stdout = std::io::stdout();
    while let Some(chunk) = fragments.next().await {
        let chunk = chunk?;
        write!(stdout, "{}", chunk.delta)?;
        stdout.flush()?;
        match chunk.finish_reason {
            Some(FinishReason::Cancelled) => {
                writeln!(stdout)?;
                eprintln!("[cancelled]");
                return Ok(());
            }
            Some(_) => break,
            None => {}
        }
    }
    writeln!(stdout)?;
    Ok(())
}

fn parse_option(raw: &str) -> Result<(String, serde_json::Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))?;
    let value = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok((key.trim().to_string(), value))
}

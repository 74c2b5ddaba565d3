//! `medchat ask` — Run one query through the pipeline and stream to stdout.

use std::io::Write;
use std::path::PathBuf;

use medchat_config::AppConfig;
use medchat_pipeline::{StreamEvent, StreamRequest};
use tokio::sync::mpsc;

pub async fn run(
    query: String,
    history_file: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    let history = match history_file {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
            serde_json::from_str::<serde_json::Value>(&content)
                .map_err(|e| format!("Invalid history in {}: {e}", path.display()))?
        }
        None => serde_json::Value::Null,
    };

    let request =
        StreamRequest::from_json(&serde_json::json!({ "query": query, "history": history }))?;

    let state = medchat_gateway::build_state(&config).await?;
    let rx = state.controller.run(request);

    let mut stdout = std::io::stdout();
    let failed = print_events(rx, &mut stdout).await?;
    if failed {
        return Err("Generation failed; see log output for details".into());
    }

    Ok(())
}

/// Write fragments to `out` as they arrive. Returns `true` if the stream
/// carried an error event.
async fn print_events(
    mut rx: mpsc::Receiver<StreamEvent>,
    out: &mut impl Write,
) -> std::io::Result<bool> {
    let mut failed = false;

    while let Some(event) = rx.recv().await {
        match event {
            StreamEvent::Data(text) => {
                write!(out, "{text}")?;
                out.flush()?;
            }
            StreamEvent::Error(message) => {
                failed = true;
                writeln!(out)?;
                eprintln!("{message}");
            }
            StreamEvent::Done => {
                writeln!(out)?;
                break;
            }
        }
    }

    Ok(failed)
}

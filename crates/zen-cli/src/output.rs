//! Frame output for the chat command

use clap::ValueEnum;
use console::style;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

use zen_core::protocol::{pump_frames, Frame, FrameWriter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// One JSON frame per line
    Ndjson,
    /// Human-readable transcript
    Pretty,
}

/// Whether a `tool_end` output is an error report rather than a tool result
fn is_failure(output: &Value) -> bool {
    output.get("error").is_some() && output.get("kind").is_some()
}

/// Render a frame for a terminal. Text is passed through unchanged so
/// streamed fragments join up.
pub fn render_pretty(frame: &Frame) -> String {
    match frame {
        Frame::Text { content } => content.clone(),
        Frame::ToolStart { tool, input } => format!(
            "\n  {} {}] {}\n",
            style("[Executing:").dim(),
            style(tool).yellow(),
            style(zen_core::truncate_str(input, 120)).dim()
        ),
        Frame::ToolEnd { tool, output } if is_failure(output) => format!(
            "  {} {}\n",
            style("✗").red(),
            style(format!(
                "{} failed: {}",
                tool,
                output["error"].as_str().unwrap_or_default()
            ))
            .dim()
        ),
        Frame::ToolEnd { tool, .. } => format!(
            "  {} {}\n",
            style("✓").green(),
            style(format!("{} completed", tool)).dim()
        ),
        Frame::Error { content } => format!("\n{}\n", style(format!("Error: {}", content)).red()),
    }
}

/// Write frames to stdout until the channel closes
pub async fn write_frames(rx: mpsc::Receiver<Frame>, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Ndjson => {
            let mut writer = FrameWriter::new(tokio::io::stdout());
            pump_frames(rx, &mut writer).await?;
        }
        OutputFormat::Pretty => write_pretty(rx).await?,
    }
    Ok(())
}

async fn write_pretty(mut rx: mpsc::Receiver<Frame>) -> std::io::Result<()> {
    let mut stdout = tokio::io::stdout();
    let mut at_line_start = true;

    while let Some(frame) = rx.recv().await {
        let rendered = render_pretty(&frame);
        if rendered.is_empty() {
            continue;
        }
        stdout.write_all(rendered.as_bytes()).await?;
        stdout.flush().await?;
        at_line_start = rendered.ends_with('\n');
    }

    if !at_line_start {
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }
    Ok(())
}

//! NDJSON wire protocol
//!
//! Each loop event becomes one JSON object on its own line:
//!
//! ```text
//! {"type":"text","content":"Let me look."}
//! {"type":"tool_start","tool":"execute_shell","input":"{\"command\":\"ls\"}"}
//! {"type":"tool_end","tool":"execute_shell","output":{"stdout":"a.txt\n","stderr":"","exit_code":0}}
//! {"type":"error","content":"iteration_bound_exceeded: ..."}
//! ```
//!
//! Frames are written and flushed one at a time, in the order the loop emits them.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{Error, Result};

/// Content type for the frame stream
pub const CONTENT_TYPE: &str = "application/x-ndjson";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    /// Assistant text fragment
    Text { content: String },
    /// A tool call is about to run; `input` is the raw argument text
    ToolStart { tool: String, input: String },
    /// A tool call finished, successfully or not
    ToolEnd { tool: String, output: Value },
    /// The loop stopped without finishing
    Error { content: String },
}

impl Frame {
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text {
            content: content.into(),
        }
    }

    pub fn tool_start(tool: impl Into<String>, input: impl Into<String>) -> Self {
        Self::ToolStart {
            tool: tool.into(),
            input: input.into(),
        }
    }

    pub fn tool_end(tool: impl Into<String>, output: Value) -> Self {
        Self::ToolEnd {
            tool: tool.into(),
            output,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self::Error {
            content: content.into(),
        }
    }

    /// Terminal error frame for a loop failure: `"<kind>: <message>"`
    pub fn from_error(error: &Error) -> Self {
        Self::error(format!("{}: {}", error.kind(), error))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    /// One line of output, newline included
    pub fn encode(&self) -> Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

/// Writes frames to any async byte sink
pub struct FrameWriter<W> {
    inner: W,
    written: usize,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, written: 0 }
    }

    /// Encode, write and flush one frame
    pub async fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        let line = frame.encode()?;
        self.inner.write_all(line.as_bytes()).await?;
        self.inner.flush().await?;
        self.written += 1;
        Ok(())
    }

    pub fn frames_written(&self) -> usize {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

/// Drain a frame channel into a writer until every sender is dropped
pub async fn pump_frames<W: AsyncWrite + Unpin>(
    mut rx: mpsc::Receiver<Frame>,
    writer: &mut FrameWriter<W>,
) -> Result<()> {
    while let Some(frame) = rx.recv().await {
        writer.write_frame(&frame).await?;
    }
    debug!("Frame stream closed after {} frames", writer.frames_written());
    Ok(())
}

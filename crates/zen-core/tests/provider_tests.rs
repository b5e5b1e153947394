//! Provider tests
//!
//! Runs the OpenAI-compatible client against a throwaway local HTTP server
//! that answers with canned server-sent events.

use futures::StreamExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use zen_core::error::ModelError;
use zen_core::orchestration::ToolRegistryBuilder;
use zen_core::protocol::Frame;
use zen_core::provider::{ModelClient, ModelRequest, OpenAiCompatClient};
use zen_core::session::{AgentLoop, LoopConfig, MemoryStore, NoBackoff, StreamAccumulator, Turn};

/// SSE body: one `data:` event per chunk, then the `[DONE]` marker
fn sse(chunks: &[Value]) -> String {
    let mut body: String = chunks
        .iter()
        .map(|c| format!("data: {}\n\n", c))
        .collect();
    body.push_str("data: [DONE]\n\n");
    body
}

fn text_chunk(text: &str) -> Value {
    json!({"choices": [{"index": 0, "delta": {"content": text}}]})
}

fn tool_chunk(index: usize, id: Option<&str>, name: Option<&str>, args: &str) -> Value {
    let mut call = json!({"index": index, "function": {"arguments": args}});
    if let Some(id) = id {
        call["id"] = json!(id);
        call["type"] = json!("function");
    }
    if let Some(name) = name {
        call["function"]["name"] = json!(name);
    }
    json!({"choices": [{"index": 0, "delta": {"tool_calls": [call]}}]})
}

async fn read_request(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);

        let text = String::from_utf8_lossy(&buf);
        if let Some(header_end) = text.find("\r\n\r\n") {
            let content_length = text[..header_end]
                .lines()
                .find_map(|line| {
                    let (key, value) = line.split_once(':')?;
                    if key.eq_ignore_ascii_case("content-length") {
                        value.trim().parse::<usize>().ok()
                    } else {
                        None
                    }
                })
                .unwrap_or(0);
            if buf.len() >= header_end + 4 + content_length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).to_string()
}

/// Serve one canned response per connection, in order. The handle yields
/// the raw requests received.
async fn serve(responses: Vec<(&'static str, String)>) -> (String, JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let mut requests = Vec::new();
        for (status, body) in responses {
            let (mut socket, _) = listener.accept().await.unwrap();
            requests.push(read_request(&mut socket).await);

            let response = format!(
                "HTTP/1.1 {}\r\ncontent-type: text/event-stream\r\nconnection: close\r\n\r\n{}",
                status, body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
        }
        requests
    });

    (format!("http://{}/v1", addr), handle)
}

fn request_body(raw: &str) -> Value {
    let (_, body) = raw.split_once("\r\n\r\n").unwrap();
    serde_json::from_str(body).unwrap()
}

mod openai_compat_tests {
    use super::*;

    #[tokio::test]
    async fn test_stream_reassembles_tool_call() {
        let body = sse(&[
            text_chunk("Let me "),
            text_chunk("look."),
            tool_chunk(0, Some("call_1"), Some("execute_shell"), ""),
            tool_chunk(0, None, None, "{\"comm"),
            tool_chunk(0, None, None, "and\":\"ls\"}"),
        ]);
        let (url, server) = serve(vec![("200 OK", body)]).await;

        let client = OpenAiCompatClient::new(url, Some("sk-test".into())).unwrap();
        let turns = vec![Turn::user("list files")];
        let mut stream = client
            .open_stream(ModelRequest {
                model: "big-pickle",
                turns: &turns,
                tools: &[],
            })
            .await
            .unwrap();

        let mut accumulator = StreamAccumulator::new();
        while let Some(delta) = stream.next().await {
            accumulator.push(&delta.unwrap());
        }
        let turn = accumulator.finish();

        assert_eq!(turn.text, "Let me look.");
        assert_eq!(turn.tool_calls.len(), 1);
        assert_eq!(turn.tool_calls[0].id, "call_1");
        assert_eq!(turn.tool_calls[0].name, "execute_shell");
        assert_eq!(turn.tool_calls[0].arguments, r#"{"command":"ls"}"#);

        let requests = server.await.unwrap();
        assert!(requests[0].starts_with("POST /v1/chat/completions"));
        assert!(requests[0]
            .to_lowercase()
            .contains("authorization: bearer sk-test"));

        let sent = request_body(&requests[0]);
        assert_eq!(sent["model"], "big-pickle");
        assert_eq!(sent["stream"], true);
        assert_eq!(sent["messages"][0]["content"], "list files");
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let (url, _server) = serve(vec![(
            "401 Unauthorized",
            r#"{"error":{"message":"invalid api key"}}"#.to_string(),
        )])
        .await;

        let client = OpenAiCompatClient::new(url, Some("bad".into())).unwrap();
        let result = client
            .open_stream(ModelRequest {
                model: "big-pickle",
                turns: &[Turn::user("hi")],
                tools: &[],
            })
            .await;

        match result {
            Err(err @ ModelError::Status { status: 401, .. }) => {
                assert!(!err.is_retryable());
                assert!(err.to_string().contains("invalid api key"));
            }
            Err(other) => panic!("unexpected error {:?}", other),
            Ok(_) => panic!("expected an error"),
        }
    }

    #[tokio::test]
    async fn test_error_event_mid_stream() {
        let body = format!(
            "data: {}\n\ndata: {}\n\n",
            text_chunk("Hel"),
            json!({"error": {"message": "overloaded"}})
        );
        let (url, _server) = serve(vec![("200 OK", body)]).await;

        let client = OpenAiCompatClient::new(url, None).unwrap();
        let deltas: Vec<_> = client
            .open_stream(ModelRequest {
                model: "big-pickle",
                turns: &[Turn::user("hi")],
                tools: &[],
            })
            .await
            .unwrap()
            .collect()
            .await;

        assert_eq!(deltas.len(), 2);
        assert!(deltas[0].is_ok());
        assert!(deltas[1]
            .as_ref()
            .unwrap_err()
            .to_string()
            .contains("overloaded"));
    }
}

mod loop_over_http_tests {
    use super::*;

    #[tokio::test]
    async fn test_read_file_round_trip() {
        let workspace = TempDir::new().unwrap();
        std::fs::write(workspace.path().join("a.txt"), "alpha").unwrap();

        let (url, server) = serve(vec![
            (
                "200 OK",
                sse(&[
                    tool_chunk(0, Some("call_1"), Some("read_file"), "{\"pa"),
                    tool_chunk(0, None, None, "th\":\"a.txt\"}"),
                ]),
            ),
            ("200 OK", sse(&[text_chunk("It says alpha.")])),
        ])
        .await;

        let client = Arc::new(OpenAiCompatClient::new(url, None).unwrap());
        let registry = ToolRegistryBuilder::new(workspace.path().to_path_buf()).build();
        let agent = AgentLoop::new(
            client,
            Arc::new(registry),
            Arc::new(MemoryStore::new()),
            LoopConfig {
                model: "big-pickle".into(),
                ..LoopConfig::default()
            },
        )
        .with_backoff(Arc::new(NoBackoff));

        let (tx, mut rx) = mpsc::channel(64);
        let outcome = agent
            .handle_message(None, "what is in a.txt?", &tx)
            .await
            .unwrap();
        drop(tx);
        assert_eq!(outcome.final_text, "It says alpha.");

        let mut frames = Vec::new();
        while let Some(frame) = rx.recv().await {
            frames.push(frame);
        }
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0], Frame::tool_start("read_file", r#"{"path":"a.txt"}"#));
        match &frames[1] {
            Frame::ToolEnd { output, .. } => assert_eq!(output["content"], "alpha"),
            other => panic!("expected tool_end, got {:?}", other),
        }

        let requests = server.await.unwrap();
        let second = request_body(&requests[1]);
        let messages = second["messages"].as_array().unwrap();
        let tool_message = messages.last().unwrap();
        assert_eq!(tool_message["role"], "tool");
        assert_eq!(tool_message["tool_call_id"], "call_1");
        assert_eq!(second["tools"].as_array().unwrap().len(), 5);
    }
}

//! Session persistence tests
//!
//! Runs the loop against the JSON-lines store and checks what survives a
//! restart.

use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::mpsc;

use zen_core::provider::{ScriptedClient, ScriptedResponse};
use zen_core::session::{
    AgentLoop, ConversationStore, ExecutionStatus, JsonlStore, LoopConfig, NoBackoff, Role,
};
use zen_core::tools::ToolRegistry;
use zen_core::orchestration::ToolRegistryBuilder;

async fn agent(
    client: Arc<ScriptedClient>,
    registry: ToolRegistry,
    data_dir: &TempDir,
) -> (AgentLoop, Arc<JsonlStore>) {
    let store = Arc::new(JsonlStore::open(data_dir.path()).await.unwrap());
    let agent = AgentLoop::new(client, Arc::new(registry), store.clone(), LoopConfig::default())
        .with_backoff(Arc::new(NoBackoff));
    (agent, store)
}

mod jsonl_store_tests {
    use super::*;

    #[tokio::test]
    async fn test_conversation_survives_restart() {
        let data = TempDir::new().unwrap();
        let workspace = TempDir::new().unwrap();
        std::fs::write(workspace.path().join("a.txt"), "alpha").unwrap();

        let client = Arc::new(ScriptedClient::new([
            ScriptedResponse::tool_calls("", &[("call_1", "read_file", r#"{"path":"a.txt"}"#)]),
            ScriptedResponse::text("It says alpha."),
        ]));
        let registry = ToolRegistryBuilder::new(workspace.path().to_path_buf()).build();
        let (agent, _) = agent(client, registry, &data).await;

        let (tx, _rx) = mpsc::channel(64);
        let outcome = agent
            .handle_message(None, "what is in a.txt?", &tx)
            .await
            .unwrap();

        // A new store over the same directory sees everything
        let reopened = JsonlStore::open(data.path()).await.unwrap();

        let conversations = reopened.conversations().await.unwrap();
        assert_eq!(conversations.len(), 1);
        assert_eq!(conversations[0].title, "what is in a.txt?");

        let turns = reopened.load_messages(&outcome.conversation_id).await.unwrap();
        let roles: Vec<Role> = turns.iter().map(|t| t.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::Tool, Role::Assistant]);
        assert_eq!(turns[1].tool_calls()[0].name, "read_file");
        assert_eq!(
            turns[2].tool_result_payload().unwrap().output["content"],
            "alpha"
        );

        let records = reopened.executions().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].tool_name, "read_file");
        assert_eq!(records[0].status, ExecutionStatus::Success);
    }

    #[tokio::test]
    async fn test_resume_after_restart() {
        let data = TempDir::new().unwrap();

        let first_client = Arc::new(ScriptedClient::new([ScriptedResponse::text("Noted.")]));
        let (first, _) = agent(first_client, ToolRegistry::new(), &data).await;
        let (tx, _rx) = mpsc::channel(64);
        let outcome = first
            .handle_message(None, "my name is Ada", &tx)
            .await
            .unwrap();
        drop(first);

        let second_client = Arc::new(ScriptedClient::new([ScriptedResponse::text("Ada.")]));
        let (second, _) = agent(second_client.clone(), ToolRegistry::new(), &data).await;
        second
            .handle_message(Some(outcome.conversation_id), "what is my name?", &tx)
            .await
            .unwrap();

        let sent: Vec<String> = second_client.requests()[0]
            .iter()
            .filter(|t| t.role != Role::System)
            .map(|t| t.content.clone())
            .collect();
        assert_eq!(sent, vec!["my name is Ada", "Noted.", "what is my name?"]);
    }

    #[tokio::test]
    async fn test_conversations_are_isolated() {
        let data = TempDir::new().unwrap();
        let store = JsonlStore::open(data.path()).await.unwrap();

        let a = store.create_conversation("a").await.unwrap();
        let b = store.create_conversation("b").await.unwrap();
        store
            .append_message(&a, &zen_core::Turn::user("for a"))
            .await
            .unwrap();

        assert_eq!(store.load_messages(&a).await.unwrap().len(), 1);
        assert!(store.load_messages(&b).await.unwrap().is_empty());
    }
}

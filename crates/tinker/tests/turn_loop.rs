//! End-to-end turn loop tests: scripted model, real file tools, temp directory.

use std::sync::{Arc, Mutex};

use serde_json::json;

use tinker::{
    AgentRunner, CompletionRequest, CompletionResponse, ContentBlock, Conversation, Error,
    LlmProvider, Role, Sandbox, StopReason, TokenUsage, ToolCall, ToolRegistry, TurnFinish,
    builtin_tools,
};

/// Replays canned responses and records every request it sees.
struct ScriptedProvider {
    responses: Mutex<Vec<CompletionResponse>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedProvider {
    fn new(responses: Vec<CompletionResponse>) -> Self {
        Self {
            responses: Mutex::new(responses),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl LlmProvider for ScriptedProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, Error> {
        self.requests.lock().unwrap().push(request);
        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            return Err(Error::Agent("script exhausted".into()));
        }
        Ok(responses.remove(0))
    }
}

fn tool_use(id: &str, name: &str, input: serde_json::Value) -> CompletionResponse {
    CompletionResponse {
        content: vec![ContentBlock::ToolUse {
            id: id.into(),
            name: name.into(),
            input,
        }],
        stop_reason: StopReason::ToolUse,
        usage: TokenUsage::default(),
    }
}

fn text(text: &str) -> CompletionResponse {
    CompletionResponse {
        content: vec![ContentBlock::Text { text: text.into() }],
        stop_reason: StopReason::EndTurn,
        usage: TokenUsage::default(),
    }
}

fn project() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    std::fs::write(root.join(".gitignore"), "target/\n*.log\n").unwrap();
    std::fs::write(root.join("README.md"), "# demo\n").unwrap();
    std::fs::write(root.join("app.log"), "noise").unwrap();
    std::fs::create_dir_all(root.join("src")).unwrap();
    std::fs::write(root.join("src/main.rs"), "fn main() {}\n").unwrap();
    std::fs::create_dir_all(root.join("target/debug")).unwrap();
    std::fs::write(root.join("target/debug/app"), "bin").unwrap();
    dir
}

fn tool_result_of(message: &tinker::Message) -> (&str, &str, bool) {
    match &message.content[0] {
        ContentBlock::ToolResult {
            tool_use_id,
            content,
            is_error,
        } => (tool_use_id, content, *is_error),
        other => panic!("expected tool result, got {other:?}"),
    }
}

#[tokio::test]
async fn list_files_scenario() {
    let dir = project();
    let sandbox = Arc::new(Sandbox::open(dir.path()).unwrap());
    let provider = Arc::new(ScriptedProvider::new(vec![
        tool_use("toolu_1", "list_files", json!({})),
        text("The project has a README and a src directory."),
    ]));
    let runner = AgentRunner::builder(provider.clone())
        .system_prompt("You are a coding assistant.")
        .tools(builtin_tools(sandbox))
        .build()
        .unwrap();
    let mut conv = Conversation::new();

    let output = runner.run_turn(&mut conv, "list files").await.unwrap();
    assert_eq!(output.finish, TurnFinish::Completed);
    assert_eq!(output.text, "The project has a README and a src directory.");
    assert_eq!(output.model_calls, 2);

    let (id, listing, is_error) = tool_result_of(&conv.messages()[2]);
    assert_eq!(id, "toolu_1");
    assert!(!is_error);
    let entries: Vec<String> = serde_json::from_str(listing).unwrap();
    assert_eq!(entries, vec![".gitignore", "README.md", "src/", "src/main.rs"]);

    // The model saw all three tools and the listing before answering.
    let requests = provider.requests();
    let names: Vec<&str> = requests[0].tools.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["list_files", "read_file", "edit_file"]);
    assert_eq!(requests[1].messages.len(), 3);
    assert_eq!(requests[1].messages[2].role, Role::User);
}

#[tokio::test]
async fn create_then_edit_then_read_across_turns() {
    let dir = tempfile::tempdir().unwrap();
    let sandbox = Arc::new(Sandbox::open(dir.path()).unwrap());
    let provider = Arc::new(ScriptedProvider::new(vec![
        tool_use(
            "t1",
            "edit_file",
            json!({"path": "notes/todo.txt", "old_str": "", "new_str": "buy milk\nbuy eggs\n"}),
        ),
        text("Created it."),
        tool_use(
            "t2",
            "edit_file",
            json!({"path": "notes/todo.txt", "old_str": "milk", "new_str": "oat milk"}),
        ),
        tool_use("t3", "read_file", json!({"path": "notes/todo.txt"})),
        text("Updated."),
    ]));
    let runner = AgentRunner::builder(provider)
        .tools(builtin_tools(sandbox))
        .build()
        .unwrap();
    let mut conv = Conversation::new();

    runner.run_turn(&mut conv, "make a todo list").await.unwrap();
    let (_, created, _) = tool_result_of(&conv.messages()[2]);
    assert_eq!(created, "Created notes/todo.txt");

    let output = runner.run_turn(&mut conv, "switch to oat milk").await.unwrap();
    assert_eq!(output.steps, 2);
    let (_, read_back, is_error) = tool_result_of(&conv.messages()[8]);
    assert!(!is_error);
    assert_eq!(read_back, "buy oat milk\nbuy eggs\n");
    assert!(conv.unresolved_tool_uses().is_empty());
}

#[tokio::test]
async fn escape_attempts_fail_for_every_tool() {
    let dir = project();
    let sandbox = Arc::new(Sandbox::open(dir.path()).unwrap());
    let registry = ToolRegistry::new(builtin_tools(sandbox)).unwrap();

    let calls = vec![
        ToolCall {
            id: "a".into(),
            name: "list_files".into(),
            input: json!({"path": "../../etc"}),
        },
        ToolCall {
            id: "b".into(),
            name: "read_file".into(),
            input: json!({"path": "../../etc/passwd"}),
        },
        ToolCall {
            id: "c".into(),
            name: "edit_file".into(),
            input: json!({"path": "../../etc/passwd", "old_str": "", "new_str": "x"}),
        },
    ];
    let results = registry.dispatch_all(&calls).await;

    let ids: Vec<&str> = results.iter().map(|r| r.tool_use_id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
    for result in &results {
        assert!(result.is_error);
        assert!(
            result.content.contains("escapes the working directory"),
            "got: {}",
            result.content
        );
    }
}

#[tokio::test]
async fn failed_edit_is_reported_to_model_and_file_untouched() {
    let dir = project();
    let sandbox = Arc::new(Sandbox::open(dir.path()).unwrap());
    let provider = Arc::new(ScriptedProvider::new(vec![
        tool_use(
            "t1",
            "edit_file",
            json!({"path": "README.md", "old_str": "not there", "new_str": "x"}),
        ),
        text("That text isn't in the file."),
    ]));
    let runner = AgentRunner::builder(provider)
        .tools(builtin_tools(sandbox))
        .build()
        .unwrap();
    let mut conv = Conversation::new();

    let output = runner.run_turn(&mut conv, "edit readme").await.unwrap();
    assert_eq!(output.finish, TurnFinish::Completed);
    let (_, message, is_error) = tool_result_of(&conv.messages()[2]);
    assert!(is_error);
    assert_eq!(message, "old_str not found in README.md");
    assert_eq!(
        std::fs::read_to_string(dir.path().join("README.md")).unwrap(),
        "# demo\n"
    );
}

//! Tool calls dispatched through the registry against mocked upstreams

mod common;

use std::sync::Arc;

use mockito::Matcher;
use serde_json::{Value, json};

use common::{ScriptedProvider, assert_tool_pairing, sandbox_settings, test_config, tool_call};
use toolchat::agent::tools::{JavaScriptTool, ProxyRequestTool, SearchTool, ToolRegistry};
use toolchat::agent::{AgentLoop, TurnOutcome};
use toolchat::credentials::{CredentialStore, MemoryCredentialStore, SearchCredentials};

fn registry(search_endpoint: &str, proxy_base: &str) -> ToolRegistry {
    let credentials: Arc<dyn CredentialStore> = Arc::new(MemoryCredentialStore::with_credentials(
        SearchCredentials::new("google-key", "engine-id"),
    ));

    let mut registry = ToolRegistry::new();
    registry
        .register(Box::new(SearchTool::with_endpoint(credentials, search_endpoint)))
        .unwrap();
    registry
        .register(Box::new(JavaScriptTool::new(sandbox_settings())))
        .unwrap();
    registry
        .register(Box::new(ProxyRequestTool::new(proxy_base, Some("pipe-token".to_string()))))
        .unwrap();
    registry
}

#[tokio::test]
async fn test_search_and_proxy_in_one_turn() {
    let mut server = mockito::Server::new_async().await;

    let search = server
        .mock("GET", "/search")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("key".into(), "google-key".into()),
            Matcher::UrlEncoded("cx".into(), "engine-id".into()),
            Matcher::UrlEncoded("q".into(), "rust async".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "items": [
                    {"title": "Async Book", "snippet": "Intro", "link": "https://rust-lang.github.io/async-book/"}
                ]
            })
            .to_string(),
        )
        .create_async()
        .await;

    let page = server
        .mock("GET", "/proxy/https://rust-lang.github.io/async-book/")
        .match_header("authorization", "Bearer pipe-token")
        .with_status(200)
        .with_body(
            "<!DOCTYPE html><html><head><title>Async Book</title>\
             <meta name=\"description\" content=\"Asynchronous programming in Rust\"></head>\
             <body><nav>menu</nav><main><h1>Getting Started</h1><script>track()</script></main></body></html>",
        )
        .create_async()
        .await;

    let registry = registry(
        &format!("{}/search", server.url()),
        &format!("{}/proxy", server.url()),
    );
    let provider = Arc::new(
        ScriptedProvider::new()
            .call_tools(vec![
                tool_call("s1", "google_search", json!({"query": "rust async"})),
                tool_call(
                    "p1",
                    "ai_pipe_request",
                    json!({"url": "https://rust-lang.github.io/async-book/"}),
                ),
            ])
            .reply("Read the Async Book."),
    );
    let agent = AgentLoop::new(provider, "gpt-5", Arc::new(registry));

    let outcome = agent.submit("How do I learn async Rust?").await.unwrap();
    assert_eq!(outcome, TurnOutcome::Replied("Read the Async Book.".to_string()));

    let transcript = agent.transcript();
    assert_tool_pairing(&transcript);

    let search_result: Value = serde_json::from_str(transcript[3].text()).unwrap();
    assert_eq!(search_result["query"], "rust async");
    assert_eq!(search_result["results"][0]["title"], "Async Book");
    assert_eq!(
        search_result["results"][0]["link"],
        "https://rust-lang.github.io/async-book/"
    );

    let page_result: Value = serde_json::from_str(transcript[4].text()).unwrap();
    assert_eq!(page_result["contentType"], "html");
    assert_eq!(page_result["title"], "Async Book");
    assert_eq!(page_result["description"], "Asynchronous programming in Rust");
    assert_eq!(page_result["content"], "Getting Started");
    assert!(page_result["extractedAt"].as_str().unwrap().ends_with('Z'));

    search.assert_async().await;
    page.assert_async().await;
}

#[tokio::test]
async fn test_tool_failures_become_error_results() {
    let mut server = mockito::Server::new_async().await;
    let _search = server
        .mock("GET", "/search")
        .match_query(Matcher::Any)
        .with_status(429)
        .create_async()
        .await;

    let registry = registry(
        &format!("{}/search", server.url()),
        &format!("{}/proxy", server.url()),
    );

    let calls = [
        tool_call("s1", "google_search", json!({"query": "busy"})),
        tool_call("j1", "execute_javascript", json!({"code": "throw new Error('boom')"})),
        tool_call("p1", "ai_pipe_request", json!({"url": "https://example.com", "method": "BREW"})),
        tool_call("m1", "ai_pipe_request", json!({})),
    ];

    let mut contents = Vec::new();
    for call in &calls {
        let outcome = registry.dispatch(call).await;
        assert!(outcome.is_error, "{} should fail", call.id);
        assert_eq!(outcome.message.tool_call_id.as_deref(), Some(call.id.as_str()));
        contents.push(outcome.message.text().to_string());
    }

    assert!(contents[0].starts_with("Error: Search failed: 429"));
    assert!(contents[1].starts_with("Error: JavaScript execution failed"));
    assert!(contents[1].contains("boom"));
    assert!(contents[2].contains("Unsupported HTTP method"));
    assert!(contents[3].contains("Missing required parameter 'url'"));
}

#[tokio::test]
async fn test_javascript_runs_with_configured_limits() {
    let config = test_config();
    let registry = ToolRegistry::with_default_tools(&config, Arc::new(MemoryCredentialStore::new()));

    let outcome = registry
        .dispatch(&tool_call(
            "j1",
            "execute_javascript",
            json!({"code": "const xs = [1, 2, 3];\nreturn xs.map(x => x * 2);"}),
        ))
        .await;
    assert!(!outcome.is_error);
    let value: Value = serde_json::from_str(outcome.message.text()).unwrap();
    let doubled: Vec<f64> = value["result"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(Value::as_f64)
        .collect();
    assert_eq!(doubled, vec![2.0, 4.0, 6.0]);
    assert_eq!(value["type"], "object");

    let outcome = registry
        .dispatch(&tool_call("j2", "execute_javascript", json!({"code": "while (true) {}"})))
        .await;
    assert!(outcome.is_error);
}

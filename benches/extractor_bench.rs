use criterion::{Criterion, black_box, criterion_group, criterion_main};
use serde_json::{Value, json};
use std::path::PathBuf;
use std::sync::Arc;

use toolchat::agent::tools::ToolRegistry;
use toolchat::config::{Config, SandboxSettings};
use toolchat::credentials::MemoryCredentialStore;
use toolchat::extractor::extract;
use toolchat::providers::LlmToolCall;

const URL: &str = "https://example.com/bench";

fn large_page() -> String {
    let paragraphs = "<p>The quick brown fox jumps over the lazy dog.</p>".repeat(2000);
    format!(
        "<!DOCTYPE html><html><head><title>Benchmark</title>\
         <meta name=\"description\" content=\"A large page\">\
         <script>{}</script></head><body><nav>menu</nav><main>{}</main></body></html>",
        "var x = 1;".repeat(500),
        paragraphs
    )
}

fn large_object() -> Value {
    json!({
        "title": "t".repeat(5000),
        "data": (0..500).map(|i| json!({"id": i, "text": "x".repeat(2000)})).collect::<Vec<_>>(),
        "other": "y".repeat(10_000),
    })
}

fn bench_extract_html(c: &mut Criterion) {
    let page = Value::String(large_page());
    c.bench_function("extract_html_large_page", |b| {
        b.iter(|| extract(black_box(&page), URL))
    });
}

fn bench_extract_json(c: &mut Criterion) {
    let object = large_object();
    c.bench_function("extract_json_large_object", |b| {
        b.iter(|| extract(black_box(&object), URL))
    });
}

fn bench_javascript_dispatch(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let config = Config {
        sandbox: SandboxSettings {
            executable: Some(PathBuf::from(env!("CARGO_BIN_EXE_toolchat"))),
            ..SandboxSettings::default()
        },
        ..Config::default()
    };
    let registry = Arc::new(ToolRegistry::with_default_tools(
        &config,
        Arc::new(MemoryCredentialStore::new()),
    ));
    let call = LlmToolCall::new(
        "bench",
        "execute_javascript",
        r#"{"code":"[1,2,3,4,5].reduce((a, b) => a + b, 0)"}"#,
    );

    c.bench_function("dispatch_execute_javascript", |b| {
        b.to_async(&runtime).iter(|| {
            let registry = Arc::clone(&registry);
            let call = call.clone();
            async move { registry.dispatch(black_box(&call)).await }
        })
    });
}

criterion_group!(
    benches,
    bench_extract_html,
    bench_extract_json,
    bench_javascript_dispatch
);
criterion_main!(benches);

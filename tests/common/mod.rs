#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use crmgate::api::{AppState, build_router, payload_too_large};
use crmgate::server::Server;
use crmgate::config::Config;
use crmgate::middleware::{LoggerMiddleware, Pipeline, from_middleware};
use crmgate::security::CorsMiddleware;
use crmgate::{Method, Request, StatusCode};
use serde_json::{Value, json};

pub const GEMINI_KEY: &str = "AIzaSy-test-key-0001";
pub const OPENAI_KEY: &str = "sk-test-0123456789abcdef";

fn config(vars: &[(&str, &str)]) -> Config {
    let vars: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
        .collect();
    Config::from_lookup(move |key| vars.get(key).cloned()).unwrap()
}

/// The full middleware stack over the real router, configured from `vars`.
pub fn gateway(vars: &[(&str, &str)]) -> Pipeline {
    let config = config(vars);
    let state = Arc::new(AppState::from_config(&config).unwrap());

    Pipeline::new(build_router(state))
        .layer(from_middleware(Arc::new(LoggerMiddleware)))
        .layer(from_middleware(Arc::new(CorsMiddleware::new(
            config.cors_allowed_origins.clone(),
        ))))
}

/// Binds an ephemeral port and serves the gateway on it the way the binary does.
pub async fn serve(vars: &[(&str, &str)]) -> SocketAddr {
    let pipeline = gateway(vars);
    let config = config(vars);
    let server = Server::bind("127.0.0.1:0")
        .await
        .unwrap()
        .with_max_request_bytes(config.max_request_bytes)
        .with_payload_too_large(payload_too_large(&config));
    let addr = server.local_addr();
    tokio::spawn(server.run(move |req| {
        let pipeline = pipeline.clone();
        async move { pipeline.handle(req).await }
    }));
    addr
}

pub async fn call(gateway: &Pipeline, request: Request) -> (StatusCode, Value) {
    let response = gateway.handle(request).await;
    let body = if response.payload().is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(response.payload()).unwrap()
    };
    (response.status(), body)
}

pub fn get(path: &str) -> Request {
    Request::new(Method::Get, path)
}

pub fn post_json(path: &str, body: Value) -> Request {
    Request::new(Method::Post, path)
        .header("Content-Type", "application/json")
        .with_body(body.to_string())
}

/// A `generateContent` response whose first candidate says `text`.
pub fn gemini_reply(text: &str) -> String {
    json!({
        "candidates": [{
            "content": {"parts": [{"text": text}], "role": "model"},
            "finishReason": "STOP",
            "index": 0
        }],
        "usageMetadata": {"promptTokenCount": 70, "candidatesTokenCount": 30, "totalTokenCount": 100}
    })
    .to_string()
}

/// A chat completion whose only choice says `text`.
pub fn openai_reply(text: &str) -> String {
    json!({
        "choices": [{"message": {"role": "assistant", "content": text}, "finish_reason": "stop"}],
        "usage": {"prompt_tokens": 70, "completion_tokens": 30, "total_tokens": 100}
    })
    .to_string()
}

use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use bytes::Bytes;
use futures::{StreamExt, stream};
use ragchat_rag::{
    ChromaVectorStore, DocumentIndex, EmbeddingProvider, EmbeddingVector, FALLBACK_PHRASE,
    InMemoryVectorStore, RagPipeline, RecursiveChunker, VectorStore,
};
use ragchat_server::model::ByteStream;
use ragchat_server::{AppState, ModelGenerator, OllamaGenerator, app_router};
use reqwest::multipart::{Form, Part};
use serde_json::{Value, json};

struct LetterEmbedder;

#[async_trait]
impl EmbeddingProvider for LetterEmbedder {
    async fn embed(&self, text: &str) -> ragchat_rag::Result<EmbeddingVector> {
        let mut vector = vec![0.01f32; 26];
        for c in text.to_ascii_lowercase().chars().filter(char::is_ascii_lowercase) {
            vector[(c as u8 - b'a') as usize] += 1.0;
        }
        Ok(vector)
    }
}

/// Replays a canned NDJSON body and records the prompts it was given.
struct ScriptedGenerator {
    chunks: Vec<&'static str>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    fn new(chunks: Vec<&'static str>) -> Arc<Self> {
        Arc::new(Self { chunks, prompts: Mutex::default() })
    }

    fn last_prompt(&self) -> String {
        self.prompts.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl ModelGenerator for ScriptedGenerator {
    fn model(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, prompt: &str) -> ragchat_rag::Result<ByteStream> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let chunks: Vec<ragchat_rag::Result<Bytes>> =
            self.chunks.iter().map(|c| Ok(Bytes::from_static(c.as_bytes()))).collect();
        Ok(stream::iter(chunks).boxed())
    }
}

const HELLO_BODY: [&str; 3] = [
    "{\"model\":\"mistral\",\"response\":\"Hel\",\"done\":false}\n{\"model\":\"mis",
    "tral\",\"response\":\"lo\",\"done\":false}\n",
    "{\"model\":\"mistral\",\"response\":\"\",\"done\":true,\"done_reason\":\"stop\",\"eval_count\":2}\n",
];

async fn state_with(store: Arc<dyn VectorStore>, generator: Arc<dyn ModelGenerator>) -> AppState {
    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(LetterEmbedder);
    let index = Arc::new(DocumentIndex::new(store, embedder.clone(), "documents"));
    index.ensure_collection().await;
    let pipeline = RagPipeline::builder()
        .embedding_provider(embedder)
        .index(index)
        .chunker(Arc::new(RecursiveChunker::new(1000, 200)))
        .build()
        .expect("pipeline");
    AppState::new(Arc::new(pipeline), generator)
}

async fn memory_state(generator: Arc<dyn ModelGenerator>) -> AppState {
    state_with(Arc::new(InMemoryVectorStore::new()), generator).await
}

async fn spawn_router(router: Router) -> (String, tokio::task::JoinHandle<()>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("listener addr");
    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.expect("server run");
    });
    (format!("http://{}", addr), handle)
}

async fn spawn_server(state: AppState) -> (String, tokio::task::JoinHandle<()>) {
    spawn_router(app_router(state)).await
}

async fn closed_port_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);
    format!("http://{}", addr)
}

fn sse_payloads(body: &str) -> Vec<Value> {
    body.split("\n\n")
        .filter_map(|frame| {
            let data: Vec<&str> = frame
                .lines()
                .filter_map(|line| line.strip_prefix("data:").map(str::trim_start))
                .collect();
            (!data.is_empty()).then(|| data.join("\n"))
        })
        .map(|data| serde_json::from_str(&data).expect("frame json"))
        .collect()
}

async fn ask(base: &str, prompt: &str) -> reqwest::Response {
    reqwest::Client::new()
        .post(format!("{}/api/ollama", base))
        .json(&json!({ "prompt": prompt }))
        .send()
        .await
        .expect("chat response")
}

async fn upload(base: &str, name: &str, bytes: Vec<u8>) -> reqwest::Response {
    let form = Form::new().part("file", Part::bytes(bytes).file_name(name.to_string()));
    reqwest::Client::new()
        .post(format!("{}/api/upload", base))
        .multipart(form)
        .send()
        .await
        .expect("upload response")
}

async fn status(base: &str) -> Value {
    reqwest::get(format!("{}/api/status", base))
        .await
        .expect("status response")
        .json()
        .await
        .expect("status json")
}

#[tokio::test]
async fn health_endpoint_reports_ok() {
    let (base, handle) = spawn_server(memory_state(ScriptedGenerator::new(vec![])).await).await;

    let body: Value = reqwest::get(format!("{}/health", base)).await.unwrap().json().await.unwrap();
    assert_eq!(body["status"], "ok");

    handle.abort();
}

#[tokio::test]
async fn chat_streams_sse_frames() {
    let generator = ScriptedGenerator::new(HELLO_BODY.to_vec());
    let (base, handle) = spawn_server(memory_state(generator.clone()).await).await;

    let response = ask(&base, "say hello").await;
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("text/event-stream"), "{content_type}");

    let body = response.text().await.unwrap();
    assert!(!body.contains("event:"));
    let payloads = sse_payloads(&body);
    assert_eq!(payloads.len(), 3);
    assert_eq!(payloads[0]["response"], "Hel");
    assert_eq!(payloads[1]["response"], "lo");
    assert_eq!(payloads[2]["done"], true);
    assert_eq!(payloads[2]["done_reason"], "stop");

    // Nothing indexed yet, so the model is told to fall back.
    let prompt = generator.last_prompt();
    assert!(prompt.contains(FALLBACK_PHRASE));
    assert!(prompt.contains("say hello"));

    handle.abort();
}

#[tokio::test]
async fn empty_prompt_is_rejected() {
    let generator = ScriptedGenerator::new(HELLO_BODY.to_vec());
    let (base, handle) = spawn_server(memory_state(generator.clone()).await).await;

    let response = ask(&base, "   ").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["message"], "Prompt is required");
    assert!(generator.prompts.lock().unwrap().is_empty());

    handle.abort();
}

#[tokio::test]
async fn upload_status_chat_and_clear() {
    let generator = ScriptedGenerator::new(HELLO_BODY.to_vec());
    let (base, handle) = spawn_server(memory_state(generator.clone()).await).await;

    let response = upload(&base, "big.txt", "x".repeat(2500).into_bytes()).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["filename"], "big.txt");
    assert_eq!(body["chunks"], 3);
    assert_eq!(body["ids"].as_array().unwrap().len(), 3);

    let current = status(&base).await;
    assert_eq!(current["vector_store"], "ready");
    assert_eq!(current["rag_available"], true);
    assert_eq!(current["collection"], "documents");
    assert_eq!(current["documents"], 3);

    ask(&base, "what is in the file?").await.text().await.unwrap();
    assert!(generator.last_prompt().contains("Context:\nxxxx"));

    let cleared: Value = reqwest::Client::new()
        .post(format!("{}/api/clear-store", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(cleared["message"], "Vector store cleared successfully");

    let current = status(&base).await;
    assert_eq!(current["vector_store"], "uninitialized");
    assert_eq!(current["rag_available"], false);
    assert_eq!(current["documents"], Value::Null);

    let response = upload(&base, "small.txt", b"fresh start".to_vec()).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(status(&base).await["documents"], 1);

    handle.abort();
}

#[tokio::test]
async fn upload_rejects_binary_and_missing_file() {
    let (base, handle) = spawn_server(memory_state(ScriptedGenerator::new(vec![])).await).await;

    let response = upload(&base, "image.png", vec![0x89, 0x50, 0xff, 0xfe]).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert!(body["message"].as_str().unwrap().contains("image.png"));

    let form = Form::new().text("note", "no file here");
    let response = reqwest::Client::new()
        .post(format!("{}/api/upload", base))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    handle.abort();
}

#[tokio::test]
async fn unreachable_vector_store_degrades_chat_and_blocks_upload() {
    let chroma = Arc::new(ChromaVectorStore::new(closed_port_url().await).unwrap());
    let generator = ScriptedGenerator::new(HELLO_BODY.to_vec());
    let (base, handle) = spawn_server(state_with(chroma, generator.clone()).await).await;

    let current = status(&base).await;
    assert_eq!(current["vector_store"], "degraded");
    assert_eq!(current["rag_available"], false);
    assert!(current["reason"].as_str().is_some());

    let response = ask(&base, "still there?").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(sse_payloads(&response.text().await.unwrap()).len(), 3);
    assert!(generator.last_prompt().contains(FALLBACK_PHRASE));

    let response = upload(&base, "notes.txt", b"hello".to_vec()).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let response =
        reqwest::Client::new().post(format!("{}/api/clear-store", base)).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    handle.abort();
}

#[tokio::test]
async fn refused_model_connection_is_503() {
    let generator = Arc::new(OllamaGenerator::new(closed_port_url().await, "mistral").unwrap());
    let (base, handle) = spawn_server(memory_state(generator).await).await;

    let response = ask(&base, "hello?").await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Ollama service is not ready yet");
    assert_eq!(body["message"], "Please wait a few moments and try again");

    handle.abort();
}

#[tokio::test]
async fn slow_model_is_504() {
    let ollama = Router::new().route(
        "/api/generate",
        post(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            "{}"
        }),
    );
    let (ollama_base, ollama_handle) = spawn_router(ollama).await;
    let generator = Arc::new(
        OllamaGenerator::new(ollama_base, "mistral")
            .unwrap()
            .with_first_byte_timeout(Duration::from_millis(200)),
    );
    let (base, handle) = spawn_server(memory_state(generator).await).await;

    let response = ask(&base, "hello?").await;
    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Ollama service timeout");

    handle.abort();
    ollama_handle.abort();
}

#[tokio::test]
async fn stalled_model_stream_ends_with_error_frame() {
    let ollama = Router::new().route(
        "/api/generate",
        post(|| async {
            let first = stream::iter([Ok::<_, Infallible>(Bytes::from_static(b"{\"response\":\"Hel\"}\n"))]);
            Body::from_stream(first.chain(stream::pending()))
        }),
    );
    let (ollama_base, ollama_handle) = spawn_router(ollama).await;
    let generator = Arc::new(
        OllamaGenerator::new(ollama_base, "mistral")
            .unwrap()
            .with_first_byte_timeout(Duration::from_millis(200)),
    );
    let (base, handle) = spawn_server(memory_state(generator).await).await;

    let response = ask(&base, "hello?").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = tokio::time::timeout(Duration::from_secs(5), response.text())
        .await
        .expect("relay finished after the stall")
        .unwrap();
    let payloads = sse_payloads(&body);

    assert_eq!(payloads.len(), 2);
    assert_eq!(payloads[0]["response"], "Hel");
    assert_eq!(payloads[1]["done"], true);
    assert!(payloads[1]["error"].as_str().unwrap().contains("no data"));

    handle.abort();
    ollama_handle.abort();
}

#[tokio::test]
async fn model_error_status_is_500() {
    let ollama = Router::new().route(
        "/api/generate",
        post(|| async {
            (StatusCode::NOT_FOUND, Json(json!({ "error": "model \"mistral\" not found" })))
        }),
    );
    let (ollama_base, ollama_handle) = spawn_router(ollama).await;
    let generator = Arc::new(OllamaGenerator::new(ollama_base, "mistral").unwrap());
    let (base, handle) = spawn_server(memory_state(generator).await).await;

    let response = ask(&base, "hello?").await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "Error communicating with Ollama");
    assert!(body["details"].as_str().unwrap().contains("not found"));

    handle.abort();
    ollama_handle.abort();
}

#[tokio::test]
async fn relays_chunked_ollama_stream_end_to_end() {
    let seen = Arc::new(Mutex::new(None::<Value>));
    let recorder = seen.clone();
    let ollama = Router::new().route(
        "/api/generate",
        post(move |Json(request): Json<Value>| {
            let recorder = recorder.clone();
            async move {
                *recorder.lock().unwrap() = Some(request);
                let chunks = HELLO_BODY.into_iter().map(|c| Ok::<_, Infallible>(Bytes::from_static(c.as_bytes())));
                Body::from_stream(stream::iter(chunks))
            }
        }),
    );
    let (ollama_base, ollama_handle) = spawn_router(ollama).await;
    let generator = Arc::new(OllamaGenerator::new(ollama_base, "mistral").unwrap());
    let (base, handle) = spawn_server(memory_state(generator).await).await;

    let response = ask(&base, "hi").await;
    assert_eq!(response.status(), StatusCode::OK);
    let payloads = sse_payloads(&response.text().await.unwrap());
    let text: String = payloads.iter().filter_map(|p| p["response"].as_str()).collect();
    assert_eq!(text, "Hello");
    assert_eq!(payloads.last().unwrap()["done"], true);

    let request = seen.lock().unwrap().clone().expect("generate request");
    assert_eq!(request["model"], "mistral");
    assert_eq!(request["stream"], true);
    assert_eq!(request["options"]["temperature"].as_f64().map(|t| (t * 10.0).round()), Some(7.0));
    assert_eq!(request["options"]["seed"], 42);

    handle.abort();
    ollama_handle.abort();
}

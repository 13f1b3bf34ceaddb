//! Example: send one prompt through the configured chat model
//!
//! Run with:
//!   OPENAI_API_KEY=sk-xxx cargo run --example provider_smoke
//!
//!   # Anthropic, via the same variables the app reads:
//!   MODEL_PROVIDER=anthropic MODEL=claude-3-5-haiku-20241022 \
//!   ANTHROPIC_API_KEY=sk-xxx cargo run --example provider_smoke
//!
//!   # Local OpenAI-compatible server (Ollama):
//!   MODEL_PROVIDER=local MODEL=llama3.3 LOCAL_LLM_BASE_URL=http://localhost:11434/v1 \
//!   cargo run --example provider_smoke -- "Explain off-by-one errors in one sentence"

use codementor_runtime::{init_chat_model, ChatMessage, CompletionRequest, Configuration, LlmProvider};
use std::env;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let prompt = env::args()
        .skip(1)
        .collect::<Vec<_>>()
        .join(" ");
    let prompt = if prompt.is_empty() {
        "In two sentences, why does `for i in 0..=v.len()` panic in Rust?".to_string()
    } else {
        prompt
    };

    let config = Configuration::from_runnable_config(None)?;
    let model = init_chat_model(&config)?;
    println!("Using {} ({}, temperature {})...", model.name(), model.model(), model.temperature());

    let request = CompletionRequest::new(vec![
        ChatMessage::system("You are a concise programming tutor."),
        ChatMessage::user(prompt),
    ]);

    let response = model
        .complete(request)
        .await
        .map_err(|e| e.into_error("provider_smoke"))?;

    println!("\n{}\n", response.content.unwrap_or_default());
    println!(
        "tokens: {} prompt + {} completion = {}",
        response.usage.prompt_tokens, response.usage.completion_tokens, response.usage.total_tokens
    );
    Ok(())
}

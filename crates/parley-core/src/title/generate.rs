//! Conversation title generation via LLM.
//!
//! `generate_title` creates a short, descriptive title from the first
//! user-assistant exchange of a conversation.

use parley_types::llm::{CompletionRequest, LlmError, Message, SamplingParams};

use crate::llm::box_provider::BoxLlmProvider;

/// System prompt for the title generation LLM call.
const TITLE_SYSTEM_PROMPT: &str = r#"Generate a short, descriptive title (3-7 words) for this conversation based on the first exchange. The title should capture the main topic or intent. Return ONLY the title text, nothing else.

Examples:
- "Debugging Rust lifetime errors"
- "Planning a weekend trip to Tokyo"
- "Understanding quantum computing basics"
- "Recipe ideas for dinner party""#;

/// Upper bound on the exchange text sent to the title model.
const MAX_EXCERPT_CHARS: usize = 2000;

/// Generate a conversation title from the first user-assistant exchange.
///
/// Uses an LLM call at low temperature (0.3) with a strict prompt. The result
/// is trimmed of whitespace and surrounding quotes.
#[tracing::instrument(
    name = "generate_title",
    skip(provider, first_user_message, first_assistant_message),
    fields(model = %model, provider = provider.name())
)]
pub async fn generate_title(
    provider: &BoxLlmProvider,
    first_user_message: &str,
    first_assistant_message: &str,
    model: &str,
) -> Result<String, LlmError> {
    let request = CompletionRequest {
        model: model.to_string(),
        messages: vec![
            Message::user(excerpt(first_user_message)),
            Message::assistant(excerpt(first_assistant_message)),
            Message::user("Based on our exchange above, generate a title."),
        ],
        system: Some(TITLE_SYSTEM_PROMPT.to_string()),
        sampling: SamplingParams {
            temperature: Some(0.3),
            max_tokens: Some(50),
            ..Default::default()
        },
    };

    let response = provider.complete(&request).await?;
    Ok(clean_title(&response.content))
}

fn excerpt(text: &str) -> String {
    text.chars().take(MAX_EXCERPT_CHARS).collect()
}

fn clean_title(raw: &str) -> String {
    raw.trim()
        .trim_matches('"')
        .trim_matches('\'')
        .trim()
        .to_string()
}

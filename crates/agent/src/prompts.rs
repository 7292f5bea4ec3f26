//! Prompt templates rendered with Tera.

use serde::Serialize;
use soof_core::config::ShopConfig;
use soof_core::domain::claims::ClaimsValidationResult;
use soof_core::domain::message::Message;
use tera::{Context, Tera};
use thiserror::Error;

pub const FALLBACK_REPLY: &str =
    "Sorry, er ging iets mis bij het verwerken van je vraag. Probeer het later nog eens of vraag naar onze klantenservice.";

pub const BASE_SYSTEM_TEMPLATE: &str = r#"You are a digital customer support assistant called {{ chatbot_name }} for the webshop: {{ shop_name }}.
You help customers with their questions and help them find products in the store.

## Your Role & Personality
- Your tone of voice is warm, kind and helpful
- Only talk about information that was provided to you, never about information from yourself
- Never talk about other webshops or companies
- Keep your messages concise and consistent
- Respond in the language the customer uses

## Message Formatting
Use Markdown: headings, **bold** and *italics* for key terms, and bulleted or numbered lists.

## Store Information
- Selling products in the category: {{ product_category }}
- Estimated delivery time: 1-2 working days

## Chat History
You can see up to {{ window_size }} previous messages.

System time: {{ system_time }}"#;

pub const CLASSIFICATION_TEMPLATE: &str = r#"You are an intent classifier for a health supplement chatbot. Classify the user's latest message into exactly one intent.

1. product_info: questions about specific products, ingredients, health benefits, safety or interactions.
2. recommendation: requests for product suggestions or comparisons.
3. order_lookup: order status, tracking, returns, refunds or account issues.
4. handoff: frustration, urgency, complaints or an explicit request for a human.
5. general_chat: greetings, thanks, company questions and small talk.

Compliance rules:
- Product health claims go to product_info.
- Any mention of medical conditions, pregnancy or medication goes to product_info.
- Order numbers, tracking and returns go to order_lookup.
- Frustrated or urgent language goes to handoff.

Latest message: "{{ latest_message }}"
Previous context: {{ recent_context | join(sep=" -> ") }}

Answer with a JSON object holding `intent`, `confidence` (0.0 to 1.0) and `reasoning`."#;

pub const PRODUCT_INFO_TEMPLATE: &str = r#"The customer asks about a product. Call the `product_info` tool with a short `search_query` naming the product and a `context` sentence describing what the customer wants to know.
Answer only from the returned product data. If the customer wants a human, call `handoff`."#;

pub const REGENERATION_TEMPLATE: &str = r#"You are a helpful assistant specialising in nutritional supplements. Rewrite your previous response so it complies with Dutch and EU regulations on nutrition and health claims.

ORIGINAL USER QUESTION: {{ original_query }}

YOUR PREVIOUS RESPONSE: {{ previous_response }}

CLAIMS VALIDATION FEEDBACK:
- Forbidden claims (avoid these): {{ violated_claims | join(sep="; ") }}
- Allowed claims (you may use these): {{ allowed_claims | join(sep="; ") }}
- Suggestions: {{ suggestions | join(sep="; ") }}

Guidelines:
1. Keep all factual product information from the previous response
2. Remove or rephrase every forbidden claim
3. Use only the allowed claim wording for the relevant nutrients
4. Keep the same helpful and professional tone
5. Respond with the rewritten answer only

System time: {{ system_time }}"#;

pub const PASSTHROUGH_TEMPLATE: &str = r#"The response below already passed the nutrition and health claims check. Return the text unchanged, character for character. Do not rephrase, shorten or add anything.

RESPONSE:
{{ response }}

System time: {{ system_time }}"#;

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("prompt template `{name}` failed to render: {reason}")]
    Render { name: &'static str, reason: String },
}

#[derive(Serialize)]
struct BaseSystemVars<'a> {
    chatbot_name: &'a str,
    shop_name: &'a str,
    product_category: &'a str,
    window_size: usize,
    system_time: &'a str,
}

pub fn render_base_system(
    shop: &ShopConfig,
    window_size: usize,
    system_time: &str,
) -> Result<String, PromptError> {
    render(
        "base_system",
        BASE_SYSTEM_TEMPLATE,
        &BaseSystemVars {
            chatbot_name: &shop.chatbot_name,
            shop_name: &shop.shop_name,
            product_category: &shop.product_category,
            window_size,
            system_time,
        },
    )
}

#[derive(Serialize)]
struct ClassificationVars<'a> {
    latest_message: &'a str,
    recent_context: Vec<&'a str>,
}

/// `recent` is the trailing context, oldest first; its last user message is
/// treated as the message to classify.
pub fn render_classification(recent: &[Message]) -> Result<String, PromptError> {
    let latest_message = recent.last().map(|message| message.content.as_str()).unwrap_or_default();
    let recent_context = recent
        .iter()
        .map(|message| message.content.as_str())
        .filter(|content| !content.is_empty())
        .collect();

    render("classification", CLASSIFICATION_TEMPLATE, &ClassificationVars { latest_message, recent_context })
}

#[derive(Serialize)]
struct RegenerationVars<'a> {
    original_query: &'a str,
    previous_response: &'a str,
    violated_claims: &'a [String],
    allowed_claims: &'a [String],
    suggestions: &'a [String],
    system_time: &'a str,
}

pub fn render_regeneration(
    original_query: &str,
    previous_response: &str,
    validation: &ClaimsValidationResult,
    system_time: &str,
) -> Result<String, PromptError> {
    render(
        "regeneration",
        REGENERATION_TEMPLATE,
        &RegenerationVars {
            original_query,
            previous_response,
            violated_claims: &validation.violated_claims,
            allowed_claims: &validation.allowed_claims,
            suggestions: &validation.suggestions,
            system_time,
        },
    )
}

#[derive(Serialize)]
struct PassthroughVars<'a> {
    response: &'a str,
    system_time: &'a str,
}

pub fn render_passthrough(response: &str, system_time: &str) -> Result<String, PromptError> {
    render("passthrough", PASSTHROUGH_TEMPLATE, &PassthroughVars { response, system_time })
}

pub fn router_note(intent_label: &str, routing_reason: &str) -> String {
    match intent_label {
        "handoff" => format!(
            "[ROUTER] Customer service handoff requested. Reason: {routing_reason}. Tell the customer their request is being escalated to a human agent."
        ),
        "recommendation" => format!(
            "[ROUTER] Product recommendation request detected. Reason: {routing_reason}. No recommendation handler is available, answer as general chat without naming specific health effects."
        ),
        "order_lookup" => format!(
            "[ROUTER] Order lookup request detected. Reason: {routing_reason}. No order handler is available, ask the customer to contact support with their order number."
        ),
        other => format!("[ROUTER] Handling `{other}` as general chat. Reason: {routing_reason}."),
    }
}

fn render<T>(name: &'static str, template: &str, vars: &T) -> Result<String, PromptError>
where
    T: Serialize,
{
    let context = Context::from_serialize(vars)
        .map_err(|error| PromptError::Render { name, reason: error.to_string() })?;
    Tera::one_off(template, &context, false)
        .map_err(|error| PromptError::Render { name, reason: error.to_string() })
}

//! Catalog lookup through the shop's MCP endpoint (`search_shop_catalog`).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::tools::{Tool, ToolContext, ToolError};

pub const PRODUCT_SUMMARY_INSTRUCTIONS: &str =
    "Create a small and concise description about this product.";

#[derive(Debug, Default, Deserialize)]
struct ProductInfoArgs {
    #[serde(default, alias = "searchQuery")]
    search_query: Option<String>,
    #[serde(default)]
    context: Option<String>,
}

#[derive(Clone)]
pub struct ProductInfoTool {
    client: Client,
    timeout: Duration,
}

impl ProductInfoTool {
    pub fn new(timeout: Duration) -> Self {
        Self { client: Client::new(), timeout }
    }

    pub fn with_client(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

#[async_trait]
impl Tool for ProductInfoTool {
    fn name(&self) -> &'static str {
        "product_info"
    }

    fn description(&self) -> &'static str {
        "Fetch product information based on a search query and context."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "search_query": { "type": "string", "description": "The product search query." },
                "context": {
                    "type": "string",
                    "description": "Additional context about what the user is requesting."
                }
            },
            "required": ["search_query", "context"]
        })
    }

    fn requires_compliance(&self) -> bool {
        true
    }

    async fn execute(&self, input: Value, context: &ToolContext) -> Result<Value, ToolError> {
        let domain = context
            .shop_domain
            .as_deref()
            .map(str::trim)
            .filter(|domain| !domain.is_empty())
            .ok_or_else(|| ToolError::Configuration("shop domain is required for product_info".into()))?;

        let args: ProductInfoArgs = match input {
            Value::Null => ProductInfoArgs::default(),
            other => serde_json::from_value(other)
                .map_err(|error| ToolError::InvalidArguments(error.to_string()))?,
        };
        let query = args
            .search_query
            .filter(|query| !query.trim().is_empty())
            .unwrap_or_else(|| context.latest_user_text.clone());
        if query.trim().is_empty() {
            return Err(ToolError::InvalidArguments("search_query is empty".into()));
        }

        let payload = catalog_request(&query, args.context.as_deref().unwrap_or_default());
        let request = self
            .client
            .post(catalog_endpoint(domain))
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&payload)
            .send();

        let response = tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| ToolError::Timeout(self.timeout))?
            .map_err(|error| ToolError::Upstream(format!("Error fetching product info: {error}")))?;
        let body: Value = response
            .json()
            .await
            .map_err(|error| ToolError::Upstream(format!("Error fetching product info: {error}")))?;

        Ok(map_catalog_response(&body))
    }
}

pub fn catalog_endpoint(domain: &str) -> String {
    format!("https://{}/api/mcp", domain.trim_start_matches("https://").trim_end_matches('/'))
}

pub fn catalog_request(query: &str, context: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "method": "tools/call",
        "id": 1,
        "params": {
            "name": "search_shop_catalog",
            "arguments": { "query": query, "context": context }
        }
    })
}

/// Picks the best product from a `search_shop_catalog` reply. Lookup misses
/// are returned as `{"error": ...}` payloads.
pub fn map_catalog_response(body: &Value) -> Value {
    let Some(text) = body.pointer("/result/content/0/text").and_then(Value::as_str) else {
        return json!({ "error": "No product info found in response." });
    };
    let Ok(parsed) = serde_json::from_str::<Value>(text) else {
        return json!({ "error": "Failed to parse product info JSON." });
    };
    let Some(best) = parsed.pointer("/products/0") else {
        return json!({ "error": "No products found." });
    };

    let variants: Vec<Value> = best
        .get("variants")
        .and_then(Value::as_array)
        .map(|variants| {
            variants
                .iter()
                .map(|variant| {
                    json!({
                        "currency": variant.get("currency"),
                        "title": variant.get("title"),
                        "available": variant.get("available"),
                        "price": variant.get("price"),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    json!({
        "metadata": best,
        "product": {
            "description": best.get("description"),
            "product_type": best.get("product_type"),
            "title": best.get("title"),
            "price_range": best.get("price_range"),
            "variants": variants,
        },
        "instructions": PRODUCT_SUMMARY_INSTRUCTIONS,
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::{json, Value};

    use super::{catalog_endpoint, catalog_request, map_catalog_response, ProductInfoTool};
    use crate::tools::{Tool, ToolContext, ToolError};

    fn catalog_body(products: Value) -> Value {
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": { "content": [{ "type": "text", "text": json!({ "products": products }).to_string() }] }
        })
    }

    #[test]
    fn best_product_is_mapped_with_metadata() {
        let body = catalog_body(json!([
            {
                "title": "Foliumzuur 400",
                "description": "Foliumzuur voor vrouwen met een kinderwens",
                "product_type": "supplement",
                "price_range": { "min": "9.95", "max": "9.95" },
                "image_url": "https://cdn.example/foliumzuur.png",
                "variants": [{ "title": "60 tabletten", "price": "9.95", "currency": "EUR", "available": true, "sku": "F-60" }]
            },
            { "title": "Omega 3" }
        ]));

        let mapped = map_catalog_response(&body);

        assert_eq!(mapped["product"]["title"], "Foliumzuur 400");
        assert_eq!(mapped["product"]["variants"][0], json!({
            "currency": "EUR", "title": "60 tabletten", "available": true, "price": "9.95"
        }));
        assert_eq!(mapped["metadata"]["image_url"], "https://cdn.example/foliumzuur.png");
        assert_eq!(mapped["instructions"], "Create a small and concise description about this product.");
    }

    #[test]
    fn misses_become_error_payloads() {
        assert_eq!(map_catalog_response(&catalog_body(json!([])))["error"], "No products found.");
        assert_eq!(map_catalog_response(&json!({ "result": {} }))["error"], "No product info found in response.");
        assert_eq!(
            map_catalog_response(&json!({ "result": { "content": [{ "text": "not json" }] } }))["error"],
            "Failed to parse product info JSON."
        );
    }

    #[test]
    fn request_targets_shop_mcp_endpoint() {
        assert_eq!(catalog_endpoint("soof-shop.myshopify.com"), "https://soof-shop.myshopify.com/api/mcp");
        let request = catalog_request("foliumzuur", "veilig tijdens zwangerschap?");
        assert_eq!(request["params"]["name"], "search_shop_catalog");
        assert_eq!(request["params"]["arguments"]["query"], "foliumzuur");
    }

    #[tokio::test]
    async fn missing_shop_domain_is_a_configuration_error() {
        let tool = ProductInfoTool::new(Duration::from_secs(1));
        let result = tool
            .execute(json!({ "search_query": "omega 3", "context": "" }), &ToolContext::default())
            .await;

        assert!(matches!(result, Err(ToolError::Configuration(_))));
        assert!(tool.requires_compliance());
    }
}

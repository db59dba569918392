//! HTTP client for the Lilly gateway.
//!
//! Response interpretation is factored out of the transport so the status and
//! body handling can be tested without a live server.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::controller::{AssistantBackend, BackendError};
use crate::persona::Persona;

/// Client for the gateway's `/api/chat` and `/api/weather` endpoints.
pub struct GatewayClient {
    base_url: String,
    client: reqwest::Client,
}

impl GatewayClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Current weather line for a city, or `None` when the gateway is down or
    /// has nothing to say. Never an error; the header just stays empty.
    pub async fn weather(&self, city: &str) -> Option<String> {
        let url = format!("{}/api/weather", self.base_url);
        let res = self
            .client
            .get(&url)
            .query(&[("city", city)])
            .send()
            .await
            .ok()?;
        let body: Value = res.json().await.ok()?;
        weather_line(&body)
    }
}

/// Render the header line from a weather payload. Accepts either the full
/// `{tempC, desc}` shape or a plain `{text}` fallback.
fn weather_line(body: &Value) -> Option<String> {
    if let (Some(temp), Some(desc)) = (
        body.get("tempC").and_then(Value::as_f64),
        body.get("desc").and_then(Value::as_str),
    ) {
        return Some(format!("{}° {}", temp.round() as i64, desc));
    }
    let text = body.get("text")?.as_str()?.trim();
    if text.is_empty() || text == "—" {
        None
    } else {
        Some(text.to_string())
    }
}

/// Map a gateway response (status plus parsed body, if it parsed) to a reply
/// or a categorized failure.
fn interpret_response(status: u16, body: Option<&Value>) -> Result<String, BackendError> {
    if let Some(body) = body {
        if (200..300).contains(&status) {
            if let Some(reply) = body.get("reply").and_then(Value::as_str) {
                return Ok(reply.to_string());
            }
        }
        if let Some(message) = body.get("error").and_then(Value::as_str) {
            return Err(BackendError::Server {
                message: message.to_string(),
            });
        }
    }
    Err(BackendError::BadReply { status })
}

#[async_trait]
impl AssistantBackend for GatewayClient {
    async fn complete(
        &self,
        message: &str,
        persona: &Persona,
        session: &str,
    ) -> Result<String, BackendError> {
        let url = format!("{}/api/chat", self.base_url);
        let res = self
            .client
            .post(&url)
            .json(&json!({
                "message": message,
                "persona": persona,
                "session": session,
            }))
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;

        let status = res.status().as_u16();
        let body: Option<Value> = res.json().await.ok();
        interpret_response(status, body.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_reply() {
        let body = json!({"reply": "أهلًا مامي"});
        assert_eq!(
            interpret_response(200, Some(&body)).unwrap(),
            "أهلًا مامي"
        );
    }

    #[test]
    fn test_error_body_wins_over_status() {
        let body = json!({"error": "مفتاح OpenAI غير مضبوط في الخادم."});
        match interpret_response(500, Some(&body)) {
            Err(BackendError::Server { message }) => {
                assert_eq!(message, "مفتاح OpenAI غير مضبوط في الخادم.")
            }
            other => panic!("expected server error, got {:?}", other),
        }
    }

    #[test]
    fn test_ok_status_without_reply_is_bad() {
        let body = json!({"unexpected": true});
        assert!(matches!(
            interpret_response(200, Some(&body)),
            Err(BackendError::BadReply { status: 200 })
        ));
    }

    #[test]
    fn test_unparseable_body_is_bad() {
        assert!(matches!(
            interpret_response(502, None),
            Err(BackendError::BadReply { status: 502 })
        ));
    }

    #[test]
    fn test_weather_line_shapes() {
        let full = json!({"city": "Riyadh", "tempC": 31.6, "desc": "صحو"});
        assert_eq!(weather_line(&full).unwrap(), "32° صحو");

        let fallback = json!({"text": "—"});
        assert!(weather_line(&fallback).is_none());

        let plain = json!({"text": "طقس"});
        assert_eq!(weather_line(&plain).unwrap(), "طقس");

        assert!(weather_line(&json!({})).is_none());
    }

    #[test]
    fn test_error_body_on_success_status() {
        // A 200 carrying an error field still surfaces the error text.
        let body = json!({"error": "busy"});
        assert!(matches!(
            interpret_response(200, Some(&body)),
            Err(BackendError::Server { .. })
        ));
    }
}

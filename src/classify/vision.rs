//! Vision classifier backed by an OpenAI-compatible chat completions API.

use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use super::{AssetImage, Classifier, ClassifyError, TaskSpec};
use crate::credentials::CredentialRotator;
use crate::http_client::HttpClient;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<serde_json::Value>,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    content: Option<String>,
}

/// Asks one task's question about an image.
pub struct VisionClassifier {
    http: HttpClient,
    endpoint: String,
    model: String,
    max_tokens: u32,
    task: TaskSpec,
    credentials: Arc<CredentialRotator>,
}

impl VisionClassifier {
    pub fn new(
        http: HttpClient,
        endpoint: impl Into<String>,
        model: impl Into<String>,
        task: TaskSpec,
        credentials: Arc<CredentialRotator>,
    ) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
            model: model.into(),
            max_tokens: 300,
            task,
            credentials,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    fn messages(&self, image: &AssetImage) -> Vec<serde_json::Value> {
        let data_url = format!("data:{};base64,{}", image.mime, STANDARD.encode(&image.bytes));
        vec![
            json!({"role": "system", "content": self.task.prompt}),
            json!({"role": "user", "content": format!("Classify the image '{}'.", image.filename)}),
            json!({"role": "user", "content": [
                {"type": "image_url", "image_url": {"url": data_url}}
            ]}),
        ]
    }
}

#[async_trait]
impl Classifier for VisionClassifier {
    fn field(&self) -> &str {
        self.task.field
    }

    async fn classify(&self, image: &AssetImage) -> Result<String, ClassifyError> {
        let request = ChatRequest {
            model: &self.model,
            messages: self.messages(image),
            max_tokens: self.max_tokens,
        };

        debug!("{} -> {} ({})", image.filename, self.task.name, self.model);
        let response = self
            .http
            .post_json(&self.endpoint, Some(self.credentials.next()), &request)
            .await?;

        if !response.is_success() {
            let status = response.status_code();
            let body = response.text().await.unwrap_or_default();
            return Err(ClassifyError::Api { status, body });
        }

        let body = response.text().await?;
        let parsed: ChatResponse =
            serde_json::from_str(&body).map_err(|e| ClassifyError::Parse(e.to_string()))?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(ClassifyError::EmptyResponse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Domain;
    use std::path::PathBuf;
    use std::time::Duration;

    fn classifier() -> VisionClassifier {
        let http = HttpClient::new(None, Duration::from_secs(5)).unwrap();
        let keys = Arc::new(CredentialRotator::new("openai", vec!["sk-1".into()]).unwrap());
        VisionClassifier::new(
            http,
            "http://localhost:9/v1/chat/completions",
            "gpt-4o",
            Domain::House.tasks()[1],
            keys,
        )
    }

    #[test]
    fn test_messages_carry_prompt_name_and_image() {
        let image = AssetImage {
            filename: "7_house.png".into(),
            path: PathBuf::from("7_house.png"),
            bytes: b"abc".to_vec(),
            mime: "image/png",
        };
        let messages = classifier().messages(&image);

        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0]["role"], "system");
        assert!(messages[0]["content"]
            .as_str()
            .unwrap()
            .contains("roof type"));
        assert_eq!(messages[1]["content"], "Classify the image '7_house.png'.");
        assert_eq!(
            messages[2]["content"][0]["image_url"]["url"],
            "data:image/png;base64,YWJj"
        );
    }

    #[test]
    fn test_parse_chat_response() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"Filename: a.png, Type_Class: 1"}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(body).unwrap();
        assert_eq!(
            parsed.choices[0].message.content.as_deref(),
            Some("Filename: a.png, Type_Class: 1")
        );
    }

    #[test]
    fn test_field_comes_from_task() {
        assert_eq!(classifier().field(), "Roof_Type_Prediction");
    }
}

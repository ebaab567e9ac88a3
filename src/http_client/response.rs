//! HTTP response wrapper.

use reqwest::{Response, StatusCode};

/// HTTP response wrapper.
pub struct HttpResponse {
    pub status: StatusCode,
    pub(crate) response: Response,
}

impl HttpResponse {
    pub(crate) fn from_response(response: Response) -> Self {
        Self {
            status: response.status(),
            response,
        }
    }

    /// Check if the response is successful.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Numeric status code.
    pub fn status_code(&self) -> u16 {
        self.status.as_u16()
    }

    /// Get response body as bytes.
    pub async fn bytes(self) -> Result<Vec<u8>, reqwest::Error> {
        self.response.bytes().await.map(|b| b.to_vec())
    }

    /// Get response body as text.
    pub async fn text(self) -> Result<String, reqwest::Error> {
        self.response.text().await
    }
}

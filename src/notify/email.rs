use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

use crate::error::{AppError, AppResult};

/// Resend-compatible email client with a bounded request timeout.
pub struct EmailClient {
    api_key: String,
    from_email: String,
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct EmailRequest {
    to: String,
    from: String,
    subject: String,
    html: String,
}

#[derive(Debug, Deserialize)]
struct EmailResponse {
    id: String,
}

impl EmailClient {
    pub fn new(api_key: String, from_email: String) -> Self {
        Self {
            api_key,
            from_email,
            base_url: "https://api.resend.com".to_string(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("failed to build email HTTP client"),
        }
    }

    pub async fn send_email(&self, to: &str, subject: &str, html_body: &str) -> AppResult<String> {
        let request = EmailRequest {
            to: to.to_string(),
            from: self.from_email.clone(),
            subject: subject.to_string(),
            html: html_body.to_string(),
        };

        let response = self
            .client
            .post(format!("{}/emails", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalError(format!(
                "Email API error: {}",
                error_text
            )));
        }

        let result: EmailResponse = response.json().await?;
        info!("Email sent: {}", result.id);
        Ok(result.id)
    }
}

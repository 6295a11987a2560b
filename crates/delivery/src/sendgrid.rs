//! SendGrid mail-send client.

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use tracing::{debug, warn};

use printshop_core::config::DeliveryConfig;
use printshop_core::gateway::{DeliveryGateway, GatewayError, QuoteEmail, TemplateKind};

use crate::templates::EmailRenderer;

pub struct SendGridGateway {
    client: Client,
    api_key: SecretString,
    sender: String,
    base_url: String,
    renderer: EmailRenderer,
}

impl SendGridGateway {
    pub fn from_config(config: &DeliveryConfig) -> Result<Self, GatewayError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| GatewayError::Request("delivery api key is not configured".to_string()))?;
        let renderer = EmailRenderer::new()
            .map_err(|error| GatewayError::Request(error.to_string()))?;
        Ok(Self {
            client: Client::new(),
            api_key,
            sender: config.sender.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            renderer,
        })
    }
}

#[async_trait]
impl DeliveryGateway for SendGridGateway {
    async fn send(
        &self,
        template: TemplateKind,
        recipient: &str,
        email: &QuoteEmail,
    ) -> Result<String, GatewayError> {
        let rendered = self
            .renderer
            .render(template, email)
            .map_err(|error| GatewayError::Request(error.to_string()))?;

        let body = json!({
            "personalizations": [{ "to": [{ "email": recipient }] }],
            "from": { "email": self.sender },
            "subject": rendered.subject,
            "content": [{ "type": "text/html", "value": rendered.html }],
        });

        let response = self
            .client
            .post(format!("{}/v3/mail/send", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|error| GatewayError::Request(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            warn!(%status, quote_id = %email.quote_id, "mail send rejected");
            return Err(GatewayError::Rejected(format!("{status}: {detail}")));
        }

        let message_id = response
            .headers()
            .get("X-Message-Id")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                GatewayError::Rejected("provider response missing X-Message-Id".to_string())
            })?;

        debug!(quote_id = %email.quote_id, message_id = %message_id, "mail accepted");
        Ok(message_id)
    }
}

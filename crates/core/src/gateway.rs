//! Delivery gateway boundary. The core never talks to an email provider
//! directly; it hands a rendered-payload request to this trait and consumes
//! the provider's webhook events as [`DeliveryEvent`] values.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::quote::{Quote, QuoteId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateKind {
    QuoteDelivery,
    QuoteReminder,
}

/// Everything a template needs to render an outbound quote email.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuoteEmail {
    pub quote_id: QuoteId,
    pub customer_name: String,
    pub lines: Vec<QuoteEmailLine>,
    pub total: Decimal,
    pub view_url: String,
    pub approve_url: String,
    pub reject_url: String,
    pub link_expires_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuoteEmailLine {
    pub description: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

impl QuoteEmail {
    /// Both links embed the same token; the redeemed endpoint decides the
    /// action.
    pub fn for_quote(
        quote: &Quote,
        token: &str,
        portal_base_url: &str,
        link_expires_at: DateTime<Utc>,
    ) -> Self {
        let base = portal_base_url.trim_end_matches('/');
        Self {
            quote_id: quote.id.clone(),
            customer_name: quote.customer.name.clone(),
            lines: quote
                .lines
                .iter()
                .map(|line| QuoteEmailLine {
                    description: line.description.clone(),
                    quantity: line.quantity,
                    unit_price: line.unit_price,
                    line_total: line.line_total(),
                })
                .collect(),
            total: quote.total(),
            view_url: format!("{base}/quotes/verify/{token}"),
            approve_url: format!("{base}/quotes/approve/{token}"),
            reject_url: format!("{base}/quotes/reject/{token}"),
            link_expires_at,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryEventType {
    Delivered,
    Opened,
    Clicked,
    Bounced,
}

/// Inbound webhook event reported by the delivery provider.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryEvent {
    pub message_id: String,
    pub event_type: DeliveryEventType,
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("delivery request failed: {0}")]
    Request(String),
    #[error("delivery provider rejected the message: {0}")]
    Rejected(String),
}

#[async_trait]
pub trait DeliveryGateway: Send + Sync {
    /// Dispatches one email and returns the provider-assigned message id.
    async fn send(
        &self,
        template: TemplateKind,
        recipient: &str,
        email: &QuoteEmail,
    ) -> Result<String, GatewayError>;
}

#[derive(Clone, Debug, PartialEq)]
pub struct RecordedSend {
    pub message_id: String,
    pub template: TemplateKind,
    pub recipient: String,
    pub email: QuoteEmail,
}

/// Test double: records every send and hands out deterministic message ids.
/// Flip `fail_next` to simulate a provider outage.
#[derive(Debug, Default)]
pub struct RecordingDeliveryGateway {
    sent: std::sync::Mutex<Vec<RecordedSend>>,
    fail_next: std::sync::atomic::AtomicBool,
}

impl RecordingDeliveryGateway {
    pub fn sent(&self) -> Vec<RecordedSend> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().map(|sent| sent.len()).unwrap_or(0)
    }

    pub fn fail_next_send(&self) {
        self.fail_next.store(true, std::sync::atomic::Ordering::SeqCst);
    }
}

#[async_trait]
impl DeliveryGateway for RecordingDeliveryGateway {
    async fn send(
        &self,
        template: TemplateKind,
        recipient: &str,
        email: &QuoteEmail,
    ) -> Result<String, GatewayError> {
        if self.fail_next.swap(false, std::sync::atomic::Ordering::SeqCst) {
            return Err(GatewayError::Request("injected delivery failure".to_string()));
        }

        let mut sent = self
            .sent
            .lock()
            .map_err(|_| GatewayError::Request("recording gateway lock poisoned".to_string()))?;
        let message_id = format!("mock-msg-{}", sent.len() + 1);
        sent.push(RecordedSend {
            message_id: message_id.clone(),
            template,
            recipient: recipient.to_string(),
            email: email.clone(),
        });
        Ok(message_id)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;

    use crate::domain::customer::CustomerRef;
    use crate::domain::quote::{Quote, QuoteId, QuoteLine};

    use super::QuoteEmail;

    #[test]
    fn email_links_embed_the_token_under_the_portal_base() {
        let quote = Quote::draft(
            QuoteId("Q-7".to_string()),
            CustomerRef { name: "Bo".to_string(), email: "bo@example.com".to_string() },
            vec![QuoteLine {
                description: "Posters".to_string(),
                quantity: 50,
                unit_price: Decimal::new(199, 2),
            }],
        );

        let email =
            QuoteEmail::for_quote(&quote, "tok123", "https://shop.example/", Utc::now() + Duration::days(7));

        assert_eq!(email.approve_url, "https://shop.example/quotes/approve/tok123");
        assert_eq!(email.reject_url, "https://shop.example/quotes/reject/tok123");
        assert_eq!(email.view_url, "https://shop.example/quotes/verify/tok123");
        assert_eq!(email.total, Decimal::new(9950, 2));
        assert_eq!(email.lines[0].line_total, Decimal::new(9950, 2));
    }
}

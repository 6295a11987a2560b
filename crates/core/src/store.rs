//! Lifecycle store boundary.
//!
//! The one primitive everything leans on is [`QuoteStore::transition`]: an
//! atomic "set the status and stamps if the current status is still in the
//! accepted set" update. Redemption races and the reminder scan both resolve
//! through it; callers never read-then-write status.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::domain::quote::{Quote, QuoteId, QuoteStatus};
use crate::errors::DomainError;
use crate::gateway::{DeliveryEvent, DeliveryEventType};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("quote not found: {0}")]
    NotFound(QuoteId),
    #[error("quote already exists: {0}")]
    AlreadyExists(QuoteId),
    #[error("storage backend failure: {0}")]
    Backend(String),
}

/// Field updates applied together with a status change, as one atomic write.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StatusPatch {
    pub sent_at: Option<DateTime<Utc>>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub expired_at: Option<DateTime<Utc>>,
    pub reminder_sent_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub delivery_message_id: Option<String>,
}

impl StatusPatch {
    pub fn sent(at: DateTime<Utc>, message_id: String) -> (QuoteStatus, Self) {
        (
            QuoteStatus::Sent,
            Self { sent_at: Some(at), delivery_message_id: Some(message_id), ..Self::default() },
        )
    }

    pub fn reminded(at: DateTime<Utc>, message_id: String) -> (QuoteStatus, Self) {
        (
            QuoteStatus::Reminded,
            Self {
                reminder_sent_at: Some(at),
                delivery_message_id: Some(message_id),
                ..Self::default()
            },
        )
    }

    pub fn approved(at: DateTime<Utc>) -> (QuoteStatus, Self) {
        (QuoteStatus::Approved, Self { approved_at: Some(at), ..Self::default() })
    }

    pub fn rejected(at: DateTime<Utc>, reason: String) -> (QuoteStatus, Self) {
        (
            QuoteStatus::Rejected,
            Self { rejected_at: Some(at), rejection_reason: Some(reason), ..Self::default() },
        )
    }

    pub fn expired(at: DateTime<Utc>) -> (QuoteStatus, Self) {
        (QuoteStatus::Expired, Self { expired_at: Some(at), ..Self::default() })
    }

    pub fn apply_to(&self, quote: &mut Quote, status: QuoteStatus) -> Result<(), DomainError> {
        quote.transition_to(status)?;
        if let Some(sent_at) = self.sent_at {
            quote.sent_at = Some(sent_at);
        }
        if let Some(approved_at) = self.approved_at {
            quote.approved_at = Some(approved_at);
        }
        if let Some(rejected_at) = self.rejected_at {
            quote.rejected_at = Some(rejected_at);
        }
        if let Some(expired_at) = self.expired_at {
            quote.expired_at = Some(expired_at);
        }
        if let Some(reminder_sent_at) = self.reminder_sent_at {
            quote.reminder_sent_at = Some(reminder_sent_at);
        }
        if let Some(rejection_reason) = &self.rejection_reason {
            quote.rejection_reason = Some(rejection_reason.clone());
        }
        if let Some(message_id) = &self.delivery_message_id {
            quote.delivery.message_id = Some(message_id.clone());
        }
        Ok(())
    }
}

/// Result of a conditional transition: either this caller won the write, or
/// it lost and observes the state that beat it.
#[derive(Clone, Debug, PartialEq)]
pub enum TransitionOutcome {
    Applied(Quote),
    Conflict(Quote),
}

#[async_trait]
pub trait QuoteStore: Send + Sync {
    async fn create(&self, quote: Quote) -> Result<(), StoreError>;

    async fn find(&self, id: &QuoteId) -> Result<Option<Quote>, StoreError>;

    /// Atomically moves the quote to `status` and applies `patch`, but only
    /// if the current status is still in `accepted_from`.
    async fn transition(
        &self,
        id: &QuoteId,
        accepted_from: &[QuoteStatus],
        status: QuoteStatus,
        patch: StatusPatch,
    ) -> Result<TransitionOutcome, StoreError>;

    /// Sent quotes whose `sent_at` is at or before `cutoff`. Quotes already
    /// Reminded do not qualify; the status itself is the dedupe guard.
    async fn list_reminder_due(&self, cutoff: DateTime<Utc>) -> Result<Vec<Quote>, StoreError>;

    /// Stamps the engagement timestamp matching the event onto the quote with
    /// that provider message id. Returns whether any quote matched. Never
    /// touches the approval status.
    async fn apply_delivery_event(&self, event: &DeliveryEvent) -> Result<bool, StoreError>;
}

/// In-memory store for tests and local development.
#[derive(Debug, Default)]
pub struct InMemoryQuoteStore {
    quotes: RwLock<std::collections::HashMap<String, Quote>>,
}

impl InMemoryQuoteStore {
    pub async fn insert(&self, quote: Quote) {
        self.quotes.write().await.insert(quote.id.0.clone(), quote);
    }
}

#[async_trait]
impl QuoteStore for InMemoryQuoteStore {
    async fn create(&self, quote: Quote) -> Result<(), StoreError> {
        let mut quotes = self.quotes.write().await;
        if quotes.contains_key(&quote.id.0) {
            return Err(StoreError::AlreadyExists(quote.id));
        }
        quotes.insert(quote.id.0.clone(), quote);
        Ok(())
    }

    async fn find(&self, id: &QuoteId) -> Result<Option<Quote>, StoreError> {
        Ok(self.quotes.read().await.get(&id.0).cloned())
    }

    async fn transition(
        &self,
        id: &QuoteId,
        accepted_from: &[QuoteStatus],
        status: QuoteStatus,
        patch: StatusPatch,
    ) -> Result<TransitionOutcome, StoreError> {
        // The write lock is held across check-and-apply, which is what makes
        // this the in-memory equivalent of a conditional UPDATE.
        let mut quotes = self.quotes.write().await;
        let quote = quotes.get_mut(&id.0).ok_or_else(|| StoreError::NotFound(id.clone()))?;

        if !accepted_from.contains(&quote.status) {
            return Ok(TransitionOutcome::Conflict(quote.clone()));
        }

        patch
            .apply_to(quote, status)
            .map_err(|error| StoreError::Backend(error.to_string()))?;
        Ok(TransitionOutcome::Applied(quote.clone()))
    }

    async fn list_reminder_due(&self, cutoff: DateTime<Utc>) -> Result<Vec<Quote>, StoreError> {
        let quotes = self.quotes.read().await;
        let mut due: Vec<Quote> = quotes
            .values()
            .filter(|quote| {
                quote.status == QuoteStatus::Sent
                    && quote.sent_at.map(|sent_at| sent_at <= cutoff).unwrap_or(false)
            })
            .cloned()
            .collect();
        due.sort_by(|left, right| left.id.0.cmp(&right.id.0));
        Ok(due)
    }

    async fn apply_delivery_event(&self, event: &DeliveryEvent) -> Result<bool, StoreError> {
        let mut quotes = self.quotes.write().await;
        let Some(quote) = quotes
            .values_mut()
            .find(|quote| quote.delivery.message_id.as_deref() == Some(event.message_id.as_str()))
        else {
            return Ok(false);
        };

        let slot = match event.event_type {
            DeliveryEventType::Delivered => &mut quote.delivery.delivered_at,
            DeliveryEventType::Opened => &mut quote.delivery.opened_at,
            DeliveryEventType::Clicked => &mut quote.delivery.clicked_at,
            DeliveryEventType::Bounced => &mut quote.delivery.bounced_at,
        };
        *slot = Some(event.timestamp);
        Ok(true)
    }
}

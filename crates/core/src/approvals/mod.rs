//! Approval orchestration: validates incoming tokens against current quote
//! state, drives the status state machine through conditional store
//! transitions, and requests delivery dispatch.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::domain::quote::{Quote, QuoteId, QuoteStatus};
use crate::errors::ApprovalError;
use crate::gateway::{DeliveryEvent, DeliveryGateway, QuoteEmail, TemplateKind};
use crate::store::{QuoteStore, StatusPatch, StoreError, TransitionOutcome};
use crate::token::{TokenAction, TokenClaims, TokenCodec, TokenError, TokenScope};

/// Tunables shared by the service and the reminder scheduler.
#[derive(Clone, Debug)]
pub struct ApprovalPolicy {
    pub token_validity: Duration,
    pub reminder_threshold: Duration,
    pub rejection_reason_max_chars: usize,
    pub portal_base_url: String,
}

impl ApprovalPolicy {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            token_validity: Duration::days(config.approval.token_validity_days),
            reminder_threshold: Duration::days(config.approval.reminder_threshold_days),
            rejection_reason_max_chars: config.approval.rejection_reason_max_chars,
            portal_base_url: config.delivery.portal_base_url.clone(),
        }
    }
}

/// Read-only projection returned by token verification for display.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuoteSummary {
    pub quote_id: QuoteId,
    pub status: QuoteStatus,
    pub customer_name: String,
    pub lines: Vec<QuoteSummaryLine>,
    pub total: Decimal,
    pub sent_at: Option<DateTime<Utc>>,
    pub link_expires_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuoteSummaryLine {
    pub description: String,
    pub quantity: u32,
    pub unit_price: Decimal,
}

impl QuoteSummary {
    fn of(quote: &Quote, claims: &TokenClaims) -> Self {
        Self {
            quote_id: quote.id.clone(),
            status: quote.status,
            customer_name: quote.customer.name.clone(),
            lines: quote
                .lines
                .iter()
                .map(|line| QuoteSummaryLine {
                    description: line.description.clone(),
                    quantity: line.quantity,
                    unit_price: line.unit_price,
                })
                .collect(),
            total: quote.total(),
            sent_at: quote.sent_at,
            link_expires_at: claims.expires_at,
        }
    }
}

const REDEMPTION_STATES: [QuoteStatus; 2] = [QuoteStatus::Sent, QuoteStatus::Reminded];

pub struct ApprovalService {
    store: Arc<dyn QuoteStore>,
    gateway: Arc<dyn DeliveryGateway>,
    codec: TokenCodec,
    policy: ApprovalPolicy,
}

impl ApprovalService {
    pub fn new(
        store: Arc<dyn QuoteStore>,
        gateway: Arc<dyn DeliveryGateway>,
        codec: TokenCodec,
        policy: ApprovalPolicy,
    ) -> Self {
        Self { store, gateway, codec, policy }
    }

    pub fn store(&self) -> Arc<dyn QuoteStore> {
        Arc::clone(&self.store)
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    pub fn policy(&self) -> &ApprovalPolicy {
        &self.policy
    }

    /// Mints the approval token, dispatches the quote email, and moves the
    /// quote Draft -> Sent. Dispatch happens before the transition, so a
    /// gateway failure leaves the quote Draft for the operator to retry.
    pub async fn send_quote(
        &self,
        quote_id: &QuoteId,
        now: DateTime<Utc>,
    ) -> Result<Quote, ApprovalError> {
        let quote = self
            .store
            .find(quote_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(quote_id.clone()))?;
        if quote.status != QuoteStatus::Draft {
            return Err(ApprovalError::AlreadySent(quote_id.clone()));
        }

        let token =
            self.codec.mint(quote_id, TokenScope::ApproveOrReject, self.policy.token_validity, now);
        let email = QuoteEmail::for_quote(
            &quote,
            &token,
            &self.policy.portal_base_url,
            now + self.policy.token_validity,
        );
        let message_id =
            self.gateway.send(TemplateKind::QuoteDelivery, &quote.customer.email, &email).await?;

        let (status, patch) = StatusPatch::sent(now, message_id.clone());
        match self.store.transition(quote_id, &[QuoteStatus::Draft], status, patch).await? {
            TransitionOutcome::Applied(quote) => {
                info!(
                    quote_id = %quote_id,
                    message_id = %message_id,
                    "quote dispatched and marked sent"
                );
                Ok(quote)
            }
            TransitionOutcome::Conflict(_) => Err(ApprovalError::AlreadySent(quote_id.clone())),
        }
    }

    /// Read-only token check for the quote viewer. No state change except the
    /// lazy expiry transition.
    pub async fn verify_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<QuoteSummary, ApprovalError> {
        let claims = self.authenticate(token, TokenAction::Verify, now).await?;

        let quote = self.load_for_claims(&claims).await?;
        if REDEMPTION_STATES.contains(&quote.status) {
            return Ok(QuoteSummary::of(&quote, &claims));
        }
        Err(ApprovalError::NotActionable(quote.id))
    }

    /// Moves the quote to Approved. Idempotent against an already-Approved
    /// quote: the token cannot be invalidated server-side, so a re-redemption
    /// simply reports the existing terminal state.
    pub async fn approve(&self, token: &str, now: DateTime<Utc>) -> Result<Quote, ApprovalError> {
        let claims = self.authenticate(token, TokenAction::Approve, now).await?;

        let (status, patch) = StatusPatch::approved(now);
        match self
            .transition_for_claims(&claims, &REDEMPTION_STATES, status, patch)
            .await?
        {
            TransitionOutcome::Applied(quote) => {
                info!(quote_id = %quote.id, "quote approved");
                Ok(quote)
            }
            TransitionOutcome::Conflict(quote) if quote.status == QuoteStatus::Approved => {
                Ok(quote)
            }
            TransitionOutcome::Conflict(quote) => Err(ApprovalError::NotActionable(quote.id)),
        }
    }

    /// Moves the quote to Rejected and records the customer's reason. Empty
    /// reasons are stored as the empty string; oversized reasons are
    /// truncated to the configured cap.
    pub async fn reject(
        &self,
        token: &str,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<Quote, ApprovalError> {
        let claims = self.authenticate(token, TokenAction::Reject, now).await?;
        let reason: String = reason.chars().take(self.policy.rejection_reason_max_chars).collect();

        let (status, patch) = StatusPatch::rejected(now, reason);
        match self
            .transition_for_claims(&claims, &REDEMPTION_STATES, status, patch)
            .await?
        {
            TransitionOutcome::Applied(quote) => {
                info!(quote_id = %quote.id, "quote rejected");
                Ok(quote)
            }
            TransitionOutcome::Conflict(quote) if quote.status == QuoteStatus::Rejected => {
                Ok(quote)
            }
            TransitionOutcome::Conflict(quote) => Err(ApprovalError::NotActionable(quote.id)),
        }
    }

    /// Applies a provider engagement event to the matching quote. Unknown
    /// message ids are logged and dropped; the approval state machine is
    /// never touched from here.
    pub async fn handle_delivery_webhook(
        &self,
        event: DeliveryEvent,
    ) -> Result<bool, ApprovalError> {
        let matched = self.store.apply_delivery_event(&event).await?;
        if !matched {
            warn!(
                message_id = %event.message_id,
                event_type = ?event.event_type,
                "delivery event for unknown message id discarded"
            );
        }
        Ok(matched)
    }

    /// Decodes and authenticates the token, enforces scope, and observes
    /// expiry lazily: an authentic-but-expired token transitions the quote
    /// Sent/Reminded -> Expired before the failure is reported.
    async fn authenticate(
        &self,
        token: &str,
        action: TokenAction,
        now: DateTime<Utc>,
    ) -> Result<TokenClaims, ApprovalError> {
        let claims = self.codec.decode(token)?;

        if !claims.scope.permits(action) {
            return Err(ApprovalError::NotActionable(claims.quote_id));
        }

        if claims.is_expired(now) {
            let (status, patch) = StatusPatch::expired(now);
            match self
                .store
                .transition(&claims.quote_id, &REDEMPTION_STATES, status, patch)
                .await
            {
                Ok(TransitionOutcome::Applied(quote)) => {
                    info!(quote_id = %quote.id, "quote expired on redemption attempt");
                }
                Ok(TransitionOutcome::Conflict(_)) | Err(StoreError::NotFound(_)) => {}
                Err(error) => return Err(error.into()),
            }
            return Err(TokenError::Expired.into());
        }

        Ok(claims)
    }

    async fn load_for_claims(&self, claims: &TokenClaims) -> Result<Quote, ApprovalError> {
        // An authentic token for a missing quote (e.g. retention cleanup)
        // surfaces the same neutral not-actionable outcome.
        self.store
            .find(&claims.quote_id)
            .await?
            .ok_or_else(|| ApprovalError::NotActionable(claims.quote_id.clone()))
    }

    async fn transition_for_claims(
        &self,
        claims: &TokenClaims,
        accepted_from: &[QuoteStatus],
        status: QuoteStatus,
        patch: StatusPatch,
    ) -> Result<TransitionOutcome, ApprovalError> {
        match self.store.transition(&claims.quote_id, accepted_from, status, patch).await {
            Ok(outcome) => Ok(outcome),
            Err(StoreError::NotFound(id)) => Err(ApprovalError::NotActionable(id)),
            Err(error) => Err(error.into()),
        }
    }
}

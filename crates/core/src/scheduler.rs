//! Reminder sweep over quotes that were sent but never acted on.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::approvals::ApprovalPolicy;
use crate::domain::quote::{Quote, QuoteStatus};
use crate::gateway::{DeliveryGateway, QuoteEmail, TemplateKind};
use crate::store::{QuoteStore, StatusPatch, StoreError, TransitionOutcome};
use crate::token::{TokenCodec, TokenScope};

/// Tally of one sweep, surfaced to the CLI and the server loop.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReminderRun {
    /// Quotes matched by the due scan.
    pub scanned: usize,
    /// Reminders dispatched and recorded.
    pub reminded: usize,
    /// Quotes skipped because dispatch failed or another actor moved the
    /// quote first.
    pub skipped: usize,
}

pub struct ReminderScheduler {
    store: Arc<dyn QuoteStore>,
    gateway: Arc<dyn DeliveryGateway>,
    codec: TokenCodec,
    policy: ApprovalPolicy,
}

impl ReminderScheduler {
    pub fn new(
        store: Arc<dyn QuoteStore>,
        gateway: Arc<dyn DeliveryGateway>,
        codec: TokenCodec,
        policy: ApprovalPolicy,
    ) -> Self {
        Self { store, gateway, codec, policy }
    }

    /// Runs one sweep: every quote still Sent whose dispatch is at least the
    /// reminder threshold old gets one reminder email with a fresh
    /// full-validity token. The Sent -> Reminded transition is the dedupe
    /// guard, so repeated sweeps never re-remind.
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<ReminderRun, StoreError> {
        let cutoff = now - self.policy.reminder_threshold;
        let due = self.store.list_reminder_due(cutoff).await?;

        let mut run = ReminderRun { scanned: due.len(), ..ReminderRun::default() };
        for quote in due {
            match self.remind(&quote, now).await {
                Ok(true) => run.reminded += 1,
                Ok(false) => run.skipped += 1,
                Err(error) => return Err(error),
            }
        }

        info!(
            scanned = run.scanned,
            reminded = run.reminded,
            skipped = run.skipped,
            "reminder sweep complete"
        );
        Ok(run)
    }

    async fn remind(&self, quote: &Quote, now: DateTime<Utc>) -> Result<bool, StoreError> {
        let token =
            self.codec.mint(&quote.id, TokenScope::ApproveOrReject, self.policy.token_validity, now);
        let email = QuoteEmail::for_quote(
            quote,
            &token,
            &self.policy.portal_base_url,
            now + self.policy.token_validity,
        );

        let message_id = match self
            .gateway
            .send(TemplateKind::QuoteReminder, &quote.customer.email, &email)
            .await
        {
            Ok(message_id) => message_id,
            Err(error) => {
                // Skip this quote; the next sweep retries while it is Sent.
                warn!(quote_id = %quote.id, %error, "reminder dispatch failed");
                return Ok(false);
            }
        };

        let (status, patch) = StatusPatch::reminded(now, message_id);
        match self.store.transition(&quote.id, &[QuoteStatus::Sent], status, patch).await {
            Ok(TransitionOutcome::Applied(_)) => {
                info!(quote_id = %quote.id, "reminder sent");
                Ok(true)
            }
            Ok(TransitionOutcome::Conflict(current)) => {
                // The customer acted between the scan and the update.
                info!(quote_id = %quote.id, status = %current.status, "reminder superseded");
                Ok(false)
            }
            Err(StoreError::NotFound(_)) => Ok(false),
            Err(error) => Err(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;

    use crate::approvals::{ApprovalPolicy, ApprovalService};
    use crate::domain::customer::CustomerRef;
    use crate::domain::quote::{Quote, QuoteId, QuoteLine, QuoteStatus};
    use crate::gateway::{DeliveryGateway, RecordingDeliveryGateway, TemplateKind};
    use crate::store::{InMemoryQuoteStore, QuoteStore};
    use crate::token::TokenCodec;

    use super::ReminderScheduler;

    fn policy() -> ApprovalPolicy {
        ApprovalPolicy {
            token_validity: Duration::days(7),
            reminder_threshold: Duration::days(5),
            rejection_reason_max_chars: 500,
            portal_base_url: "http://localhost:8080".to_string(),
        }
    }

    fn draft(id: &str) -> Quote {
        Quote::draft(
            QuoteId(id.to_string()),
            CustomerRef { name: "Mac".to_string(), email: "mac@example.com".to_string() },
            vec![QuoteLine {
                description: "Vinyl banner".to_string(),
                quantity: 1,
                unit_price: Decimal::new(9900, 2),
            }],
        )
    }

    struct Fixture {
        scheduler: ReminderScheduler,
        service: ApprovalService,
        store: Arc<InMemoryQuoteStore>,
        gateway: Arc<RecordingDeliveryGateway>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryQuoteStore::default());
        let gateway = Arc::new(RecordingDeliveryGateway::default());
        let codec = TokenCodec::new("scheduler-test-secret");
        let scheduler = ReminderScheduler::new(
            Arc::clone(&store) as Arc<dyn QuoteStore>,
            Arc::clone(&gateway) as Arc<dyn DeliveryGateway>,
            codec.clone(),
            policy(),
        );
        let service = ApprovalService::new(
            Arc::clone(&store) as Arc<dyn QuoteStore>,
            Arc::clone(&gateway) as Arc<dyn DeliveryGateway>,
            codec,
            policy(),
        );
        Fixture { scheduler, service, store, gateway }
    }

    #[tokio::test]
    async fn reminds_only_past_threshold_and_only_once() {
        let fixture = fixture();
        fixture.store.create(draft("Q-20")).await.expect("create");
        let t0 = Utc::now();
        fixture.service.send_quote(&QuoteId("Q-20".to_string()), t0).await.expect("send");

        // Day 4: under the threshold, nothing to do.
        let run = fixture.scheduler.run_once(t0 + Duration::days(4)).await.expect("sweep");
        assert_eq!(run.scanned, 0);
        assert_eq!(run.reminded, 0);

        // Day 6: due, one reminder goes out.
        let day6 = t0 + Duration::days(6);
        let run = fixture.scheduler.run_once(day6).await.expect("sweep");
        assert_eq!(run.reminded, 1);

        let quote = fixture
            .store
            .find(&QuoteId("Q-20".to_string()))
            .await
            .expect("find")
            .expect("exists");
        assert_eq!(quote.status, QuoteStatus::Reminded);
        assert_eq!(quote.reminder_sent_at, Some(day6));

        let reminders: Vec<_> = fixture
            .gateway
            .sent()
            .into_iter()
            .filter(|send| send.template == TemplateKind::QuoteReminder)
            .collect();
        assert_eq!(reminders.len(), 1);
        // The reminder carries a fresh link valid a full window from the sweep.
        assert_eq!(reminders[0].email.link_expires_at, day6 + Duration::days(7));

        // Day 7: the Reminded quote is out of the scan, no second reminder.
        let run = fixture.scheduler.run_once(t0 + Duration::days(7)).await.expect("sweep");
        assert_eq!(run.scanned, 0);
        assert_eq!(fixture.gateway.sent_count(), 2, "one delivery plus one reminder");
    }

    #[tokio::test]
    async fn dispatch_failure_skips_and_leaves_quote_retryable() {
        let fixture = fixture();
        fixture.store.create(draft("Q-21")).await.expect("create");
        let t0 = Utc::now();
        fixture.service.send_quote(&QuoteId("Q-21".to_string()), t0).await.expect("send");

        fixture.gateway.fail_next_send();
        let run = fixture.scheduler.run_once(t0 + Duration::days(6)).await.expect("sweep");
        assert_eq!(run.scanned, 1);
        assert_eq!(run.reminded, 0);
        assert_eq!(run.skipped, 1);

        let quote = fixture
            .store
            .find(&QuoteId("Q-21".to_string()))
            .await
            .expect("find")
            .expect("exists");
        assert_eq!(quote.status, QuoteStatus::Sent, "failed reminder must stay retryable");

        // The next sweep picks it up again.
        let run = fixture.scheduler.run_once(t0 + Duration::days(6) + Duration::hours(1)).await.expect("sweep");
        assert_eq!(run.reminded, 1);
    }

    #[tokio::test]
    async fn approved_quotes_are_never_reminded() {
        let fixture = fixture();
        fixture.store.create(draft("Q-22")).await.expect("create");
        let t0 = Utc::now();
        fixture.service.send_quote(&QuoteId("Q-22".to_string()), t0).await.expect("send");

        let token = fixture
            .gateway
            .sent()
            .last()
            .and_then(|send| send.email.approve_url.rsplit('/').next().map(str::to_string))
            .expect("token");
        fixture.service.approve(&token, t0 + Duration::days(2)).await.expect("approve");

        let run = fixture.scheduler.run_once(t0 + Duration::days(6)).await.expect("sweep");
        assert_eq!(run.scanned, 0);
        assert_eq!(fixture.gateway.sent_count(), 1);
    }
}

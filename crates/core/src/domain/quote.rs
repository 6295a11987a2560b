use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::customer::CustomerRef;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuoteId(pub String);

impl std::fmt::Display for QuoteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteStatus {
    Draft,
    Sent,
    Reminded,
    Approved,
    Rejected,
    Expired,
}

impl QuoteStatus {
    /// Terminal statuses are never re-entered or left.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Approved | Self::Rejected | Self::Expired)
    }

    pub fn as_key(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Sent => "sent",
            Self::Reminded => "reminded",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Expired => "expired",
        }
    }
}

impl std::fmt::Display for QuoteStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_key())
    }
}

impl std::str::FromStr for QuoteStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "draft" => Ok(Self::Draft),
            "sent" => Ok(Self::Sent),
            "reminded" => Ok(Self::Reminded),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            "expired" => Ok(Self::Expired),
            other => Err(format!("unknown quote status `{other}`")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QuoteLine {
    pub description: String,
    pub quantity: u32,
    pub unit_price: Decimal,
}

impl QuoteLine {
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// Provider-reported delivery and engagement facts. These annotate a quote
/// but never drive the approval state machine.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DeliveryMetadata {
    pub message_id: Option<String>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub opened_at: Option<DateTime<Utc>>,
    pub clicked_at: Option<DateTime<Utc>>,
    pub bounced_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub id: QuoteId,
    pub customer: CustomerRef,
    pub status: QuoteStatus,
    pub lines: Vec<QuoteLine>,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub expired_at: Option<DateTime<Utc>>,
    pub reminder_sent_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub delivery: DeliveryMetadata,
}

impl Quote {
    pub fn draft(id: QuoteId, customer: CustomerRef, lines: Vec<QuoteLine>) -> Self {
        Self {
            id,
            customer,
            status: QuoteStatus::Draft,
            lines,
            created_at: Utc::now(),
            sent_at: None,
            approved_at: None,
            rejected_at: None,
            expired_at: None,
            reminder_sent_at: None,
            rejection_reason: None,
            delivery: DeliveryMetadata::default(),
        }
    }

    pub fn total(&self) -> Decimal {
        self.lines.iter().map(QuoteLine::line_total).sum()
    }

    pub fn can_transition_to(&self, next: QuoteStatus) -> bool {
        matches!(
            (self.status, next),
            (QuoteStatus::Draft, QuoteStatus::Sent)
                | (QuoteStatus::Sent, QuoteStatus::Reminded)
                | (QuoteStatus::Sent, QuoteStatus::Approved)
                | (QuoteStatus::Sent, QuoteStatus::Rejected)
                | (QuoteStatus::Sent, QuoteStatus::Expired)
                | (QuoteStatus::Reminded, QuoteStatus::Approved)
                | (QuoteStatus::Reminded, QuoteStatus::Rejected)
                | (QuoteStatus::Reminded, QuoteStatus::Expired)
        )
    }

    pub fn transition_to(&mut self, next: QuoteStatus) -> Result<(), DomainError> {
        if self.can_transition_to(next) {
            self.status = next;
            return Ok(());
        }

        Err(DomainError::InvalidQuoteTransition { from: self.status, to: next })
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use crate::domain::customer::CustomerRef;
    use crate::errors::DomainError;

    use super::{Quote, QuoteId, QuoteLine, QuoteStatus};

    fn quote(status: QuoteStatus) -> Quote {
        let mut quote = Quote::draft(
            QuoteId("Q-1".to_string()),
            CustomerRef { name: "Ada's Apparel".to_string(), email: "ada@example.com".to_string() },
            vec![
                QuoteLine {
                    description: "Screen printed tees".to_string(),
                    quantity: 24,
                    unit_price: Decimal::new(1250, 2),
                },
                QuoteLine {
                    description: "Setup fee".to_string(),
                    quantity: 1,
                    unit_price: Decimal::new(4500, 2),
                },
            ],
        );
        quote.status = status;
        quote
    }

    #[test]
    fn total_sums_line_totals() {
        assert_eq!(quote(QuoteStatus::Draft).total(), Decimal::new(34500, 2));
    }

    #[test]
    fn allows_send_and_redemption_transitions() {
        let mut quote = quote(QuoteStatus::Draft);
        quote.transition_to(QuoteStatus::Sent).expect("draft -> sent");
        quote.transition_to(QuoteStatus::Reminded).expect("sent -> reminded");
        quote.transition_to(QuoteStatus::Approved).expect("reminded -> approved");
        assert_eq!(quote.status, QuoteStatus::Approved);
    }

    #[test]
    fn blocks_skipping_the_sent_state() {
        let mut quote = quote(QuoteStatus::Draft);
        let error =
            quote.transition_to(QuoteStatus::Approved).expect_err("draft -> approved should fail");
        assert!(matches!(error, DomainError::InvalidQuoteTransition { .. }));
    }

    #[test]
    fn terminal_statuses_accept_no_further_transitions() {
        for terminal in [QuoteStatus::Approved, QuoteStatus::Rejected, QuoteStatus::Expired] {
            let mut quote = quote(terminal);
            assert!(terminal.is_terminal());
            for next in [
                QuoteStatus::Draft,
                QuoteStatus::Sent,
                QuoteStatus::Reminded,
                QuoteStatus::Approved,
                QuoteStatus::Rejected,
                QuoteStatus::Expired,
            ] {
                assert!(quote.transition_to(next).is_err());
            }
        }
    }
}

use thiserror::Error;

use crate::domain::quote::{QuoteId, QuoteStatus};
use crate::gateway::GatewayError;
use crate::store::StoreError;
use crate::token::TokenError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid quote transition from {from:?} to {to:?}")]
    InvalidQuoteTransition { from: QuoteStatus, to: QuoteStatus },
}

/// Failure taxonomy for approval lifecycle operations.
#[derive(Debug, Error)]
pub enum ApprovalError {
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error("quote {0} is not in an actionable state")]
    NotActionable(QuoteId),
    #[error("quote {0} has already been sent")]
    AlreadySent(QuoteId),
    #[error("delivery dispatch failed: {0}")]
    Delivery(#[from] GatewayError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl ApprovalError {
    /// Customer-facing message. Token and state failures collapse into one
    /// neutral string so the response never reveals whether a guessed token
    /// was malformed, tampered, expired, or already consumed.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Token(_) | Self::NotActionable(_) => "This link is no longer valid.",
            Self::AlreadySent(_) => "This quote has already been sent.",
            Self::Delivery(_) | Self::Store(_) | Self::Configuration(_) => {
                "The service is temporarily unavailable. Please retry shortly."
            }
        }
    }
}

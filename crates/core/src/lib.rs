pub mod approvals;
pub mod config;
pub mod domain;
pub mod errors;
pub mod gateway;
pub mod scheduler;
pub mod store;
pub mod token;

pub use approvals::{ApprovalPolicy, ApprovalService, QuoteSummary, QuoteSummaryLine};
pub use config::{AppConfig, ConfigError, ConfigOverrides, Environment, LogFormat};
pub use domain::customer::CustomerRef;
pub use domain::quote::{DeliveryMetadata, Quote, QuoteId, QuoteLine, QuoteStatus};
pub use errors::{ApprovalError, DomainError};
pub use gateway::{
    DeliveryEvent, DeliveryEventType, DeliveryGateway, GatewayError, QuoteEmail, QuoteEmailLine,
    RecordingDeliveryGateway, TemplateKind,
};
pub use scheduler::{ReminderRun, ReminderScheduler};
pub use store::{InMemoryQuoteStore, QuoteStore, StatusPatch, StoreError, TransitionOutcome};
pub use token::{TokenAction, TokenClaims, TokenCodec, TokenError, TokenScope};

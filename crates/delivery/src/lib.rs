pub mod sendgrid;
pub mod templates;
pub mod webhook;

pub use sendgrid::SendGridGateway;
pub use templates::{EmailRenderer, RenderError, RenderedEmail};
pub use webhook::{parse_events, ProviderEvent};

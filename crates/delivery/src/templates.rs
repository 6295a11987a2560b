//! Email rendering with embedded Tera templates.

use tera::{Context, Tera};
use thiserror::Error;

use printshop_core::gateway::{QuoteEmail, TemplateKind};

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("template registration failed: {0}")]
    Registration(#[from] tera::Error),
    #[error("template `{name}` failed to render: {source}")]
    Render {
        name: &'static str,
        #[source]
        source: tera::Error,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderedEmail {
    pub subject: String,
    pub html: String,
}

pub struct EmailRenderer {
    tera: Tera,
}

impl EmailRenderer {
    pub fn new() -> Result<Self, RenderError> {
        let mut tera = Tera::default();
        tera.add_raw_template(
            template_name(TemplateKind::QuoteDelivery),
            include_str!("../templates/quote_delivery.html"),
        )?;
        tera.add_raw_template(
            template_name(TemplateKind::QuoteReminder),
            include_str!("../templates/quote_reminder.html"),
        )?;
        Ok(Self { tera })
    }

    pub fn render(
        &self,
        template: TemplateKind,
        email: &QuoteEmail,
    ) -> Result<RenderedEmail, RenderError> {
        let name = template_name(template);
        let context = Context::from_serialize(email)
            .map_err(|source| RenderError::Render { name, source })?;
        let html = self
            .tera
            .render(name, &context)
            .map_err(|source| RenderError::Render { name, source })?;
        Ok(RenderedEmail { subject: subject_for(template, email), html })
    }
}

fn template_name(template: TemplateKind) -> &'static str {
    match template {
        TemplateKind::QuoteDelivery => "quote_delivery.html",
        TemplateKind::QuoteReminder => "quote_reminder.html",
    }
}

fn subject_for(template: TemplateKind, email: &QuoteEmail) -> String {
    match template {
        TemplateKind::QuoteDelivery => format!("Your quote {} is ready", email.quote_id),
        TemplateKind::QuoteReminder => {
            format!("Reminder: quote {} is waiting for you", email.quote_id)
        }
    }
}

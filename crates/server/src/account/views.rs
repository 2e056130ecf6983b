use std::sync::Arc;

use axum::response::Html;
use serde::Serialize;
use storefront_core::errors::ApplicationError;
use tera::{Context, Tera};
use tracing::{error, warn};

use crate::error::WebError;

pub const LOGIN_TEMPLATE: &str = "login.html";
pub const CONFIRMATION_TEMPLATE: &str = "external_login_confirmation.html";

pub fn init_templates() -> Arc<Tera> {
    let mut tera = match Tera::new("templates/account/**/*") {
        Ok(t) => t,
        Err(e) => {
            warn!(error = %e, "failed to load account templates from filesystem, using built-ins");
            Tera::default()
        }
    };

    if !tera.get_template_names().any(|name| name == LOGIN_TEMPLATE) {
        tera.add_raw_template(LOGIN_TEMPLATE, include_str!("../../../../templates/account/login.html"))
            .ok();
    }
    if !tera.get_template_names().any(|name| name == CONFIRMATION_TEMPLATE) {
        tera.add_raw_template(
            CONFIRMATION_TEMPLATE,
            include_str!("../../../../templates/account/external_login_confirmation.html"),
        )
        .ok();
    }

    Arc::new(tera)
}

#[derive(Clone, Debug, Serialize)]
pub struct ProviderButton {
    pub name: String,
    pub display_name: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct LoginPage {
    pub return_url: String,
    pub status_message: Option<String>,
    pub providers: Vec<ProviderButton>,
    pub antiforgery_token: String,
}

/// The confirmation form, pre-filled from the provider's claims or the rejected submission.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ConfirmationPage {
    pub email: String,
    pub provider_display_name: String,
    pub return_url: String,
    pub errors: Vec<String>,
    pub antiforgery_token: String,
}

pub fn render<T: Serialize>(
    templates: &Tera,
    template: &str,
    page: &T,
    correlation_id: &str,
) -> Result<Html<String>, WebError> {
    let context =
        Context::from_serialize(page).map_err(|e| render_failure(template, e, correlation_id))?;
    templates
        .render(template, &context)
        .map(Html)
        .map_err(|e| render_failure(template, e, correlation_id))
}

fn render_failure(template: &str, e: tera::Error, correlation_id: &str) -> WebError {
    error!(
        event_name = "web.template.render_failed",
        correlation_id = %correlation_id,
        template = template,
        error = %e,
        "template render failed"
    );
    WebError::application(
        ApplicationError::Configuration(format!("template `{template}` failed to render")),
        correlation_id,
    )
}

use crate::{
    application::{
        cards::CardSnapshot,
        error::{ErrorReport, HttpError},
        export::GeneratedImage,
        render::{CARD_HEIGHT, CARD_WIDTH, CardView},
    },
    domain::{export::ExportState, role::RoleTier},
};
use askama::{Error as AskamaError, Template};
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use base64::Engine;
use thiserror::Error;

pub const SITE_TITLE: &str = "Ritual Cards";

#[derive(Debug, Error)]
#[error("{public_message}")]
pub struct TemplateRenderError {
    pub(crate) source: &'static str,
    pub(crate) public_message: &'static str,
    #[source]
    pub(crate) error: AskamaError,
}

impl TemplateRenderError {
    pub fn new(source: &'static str, public_message: &'static str, error: AskamaError) -> Self {
        Self {
            source,
            public_message,
            error,
        }
    }
}

impl From<TemplateRenderError> for HttpError {
    fn from(err: TemplateRenderError) -> Self {
        let TemplateRenderError {
            source,
            public_message,
            error,
        } = err;

        HttpError::from_error(
            source,
            StatusCode::INTERNAL_SERVER_ERROR,
            public_message,
            &error,
        )
    }
}

pub fn render_template<T: Template>(template: T) -> Result<Html<String>, HttpError> {
    template.render().map(Html).map_err(|err| {
        TemplateRenderError::new(
            "presentation::views::render_template",
            "Template rendering failed",
            err,
        )
        .into()
    })
}

pub fn render_template_response<T: Template>(template: T, status: StatusCode) -> Response {
    match render_template(template) {
        Ok(html) => (status, html).into_response(),
        Err(err) => err.into_response(),
    }
}

pub fn render_not_found_response() -> Response {
    let view = LayoutContext::new("Not found", ErrorPageView::not_found());
    let mut response = render_template_response(ErrorTemplate { view }, StatusCode::NOT_FOUND);
    ErrorReport::from_message(
        "presentation::views::render_not_found_response",
        StatusCode::NOT_FOUND,
        "Resource not found",
    )
    .attach(&mut response);
    response
}

pub struct LayoutContext<T> {
    pub title: String,
    pub content: T,
}

impl<T> LayoutContext<T> {
    pub fn new(page_title: &str, content: T) -> Self {
        let title = if page_title.is_empty() {
            SITE_TITLE.to_string()
        } else {
            format!("{page_title} \u{b7} {SITE_TITLE}")
        };
        Self { title, content }
    }
}

pub struct RoleOptionView {
    pub slug: &'static str,
    pub name: &'static str,
    pub stars: u8,
    pub selected: bool,
}

impl RoleOptionView {
    fn all(selected: Option<RoleTier>) -> Vec<Self> {
        RoleTier::ALL
            .into_iter()
            .map(|tier| Self {
                slug: tier.slug(),
                name: tier.name(),
                stars: tier.style().stars,
                selected: selected == Some(tier),
            })
            .collect()
    }
}

pub struct CardPanelView {
    pub preview_href: String,
    pub export_action: String,
    pub reset_action: String,
    pub status_text: &'static str,
    pub failed: bool,
    pub busy: bool,
    pub width: u32,
    pub height: u32,
}

pub struct GeneratorView {
    pub form_action: String,
    pub handle_input: String,
    pub roles: Vec<RoleOptionView>,
    pub message: Option<String>,
    pub card: Option<CardPanelView>,
}

impl GeneratorView {
    /// Blank generator form.
    pub fn empty() -> Self {
        Self {
            form_action: "/cards".to_string(),
            handle_input: String::new(),
            roles: RoleOptionView::all(None),
            message: None,
            card: None,
        }
    }

    /// Form with rejected input and an inline message, before any card exists.
    pub fn rejected(handle_input: &str, role: Option<&str>, message: &str) -> Self {
        let selected = role.and_then(|raw| raw.parse::<RoleTier>().ok());
        Self {
            handle_input: handle_input.to_string(),
            roles: RoleOptionView::all(selected),
            message: Some(message.to_string()),
            ..Self::empty()
        }
    }

    pub fn from_snapshot(snapshot: &CardSnapshot) -> Self {
        let base = format!("/cards/{}", snapshot.id);
        let card = snapshot.is_generated().then(|| CardPanelView {
            preview_href: format!("{base}/card.svg"),
            export_action: format!("{base}/export"),
            reset_action: format!("{base}/reset"),
            status_text: snapshot.status_text(),
            failed: snapshot.export_state == ExportState::Failed,
            busy: snapshot.export_state.is_busy(),
            width: CARD_WIDTH,
            height: CARD_HEIGHT,
        });

        Self {
            form_action: base,
            handle_input: snapshot.handle_input.clone(),
            roles: RoleOptionView::all(snapshot.role),
            message: snapshot.message.clone(),
            card,
        }
    }

    /// Override the inline message, e.g. for a failed export.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

#[derive(Template)]
#[template(path = "card_page.html")]
pub struct CardPageTemplate {
    pub view: LayoutContext<GeneratorView>,
}

#[derive(Template)]
#[template(path = "card.svg", escape = "html")]
pub struct CardSvgTemplate<'a> {
    pub view: &'a CardView,
}

pub struct OverlayView {
    pub data_url: String,
    pub file_name: String,
    pub return_href: String,
}

impl OverlayView {
    pub fn new(image: &GeneratedImage, return_href: &str) -> Self {
        let encoded = base64::engine::general_purpose::STANDARD.encode(image.bytes());
        Self {
            data_url: format!("data:image/png;base64,{encoded}"),
            file_name: image.name().to_string(),
            return_href: return_href.to_string(),
        }
    }
}

#[derive(Template)]
#[template(path = "overlay.html")]
pub struct OverlayTemplate {
    pub view: OverlayView,
}

pub struct ErrorPageView {
    pub heading: String,
    pub message: String,
}

impl ErrorPageView {
    pub fn not_found() -> Self {
        Self {
            heading: "Card Not Found".to_string(),
            message: "This card no longer exists. Idle cards are cleared after a while; start a new one from the generator.".to_string(),
        }
    }
}

#[derive(Template)]
#[template(path = "error.html")]
pub struct ErrorTemplate {
    pub view: LayoutContext<ErrorPageView>,
}

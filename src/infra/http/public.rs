use std::sync::Arc;

use axum::{
    Form, Router,
    extract::{Path, State},
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{CACHE_CONTROL, CONTENT_TYPE, USER_AGENT},
    },
    middleware,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use uuid::Uuid;

use crate::{
    application::{
        cards::{CardError, CardForm, CardService},
        delivery::DeliveryContext,
        error::{ErrorReport, HttpError},
    },
    domain::platform::PlatformCapabilities,
    presentation::views::{
        CardPageTemplate, GeneratorView, LayoutContext, render_not_found_response,
        render_template_response,
    },
};

use super::{
    RouterState,
    middleware::{log_responses, set_request_context},
};

const MOBILE_HINT_HEADER: &str = "sec-ch-ua-mobile";
const SVG_CONTENT_TYPE: &str = "image/svg+xml; charset=utf-8";

#[derive(Clone)]
pub struct HttpState {
    pub cards: Arc<CardService>,
}

pub fn build_router(state: RouterState) -> Router<RouterState> {
    Router::new()
        .route("/", get(index))
        .route("/cards", post(create_card))
        .route("/cards/{id}", get(show_card).post(regenerate_card))
        .route("/cards/{id}/card.svg", get(card_document))
        .route("/cards/{id}/export", post(export_card))
        .route("/cards/{id}/reset", post(reset_card))
        .fallback(fallback)
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

async fn index() -> Response {
    page_response(GeneratorView::empty(), StatusCode::OK)
}

async fn create_card(State(state): State<HttpState>, Form(form): Form<CardForm>) -> Response {
    match state.cards.generate(&form).await {
        Ok(snapshot) => card_redirect(snapshot.id),
        Err(err) if err.is_inline() => {
            let view = GeneratorView::rejected(&form.handle, form.role.as_deref(), err.public_message());
            error_page_response(view, &err)
        }
        Err(err) => HttpError::from(err).into_response(),
    }
}

async fn show_card(State(state): State<HttpState>, Path(id): Path<Uuid>) -> Response {
    match state.cards.snapshot(id) {
        Ok(snapshot) => page_response(GeneratorView::from_snapshot(&snapshot), StatusCode::OK),
        Err(err) => card_error_response(&state.cards, id, err),
    }
}

async fn regenerate_card(
    State(state): State<HttpState>,
    Path(id): Path<Uuid>,
    Form(form): Form<CardForm>,
) -> Response {
    match state.cards.regenerate(id, &form).await {
        Ok(_) => card_redirect(id),
        Err(err) => card_error_response(&state.cards, id, err),
    }
}

async fn card_document(State(state): State<HttpState>, Path(id): Path<Uuid>) -> Response {
    match state.cards.preview(id).await {
        Ok(card) => {
            let mut response = card.svg.into_response();
            let headers = response.headers_mut();
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(SVG_CONTENT_TYPE));
            headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
            response
        }
        Err(CardError::NotFound(_)) => render_not_found_response(),
        Err(err) => HttpError::from(err).into_response(),
    }
}

async fn export_card(
    State(state): State<HttpState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Response {
    let capabilities = PlatformCapabilities::detect(
        header_str(&headers, USER_AGENT.as_str()),
        header_str(&headers, MOBILE_HINT_HEADER),
    );
    let context = DeliveryContext {
        return_href: card_href(id),
    };

    match state.cards.export(id, &capabilities, &context).await {
        Ok(delivered) => delivered.response,
        Err(err) => card_error_response(&state.cards, id, err),
    }
}

async fn reset_card(State(state): State<HttpState>, Path(id): Path<Uuid>) -> Response {
    match state.cards.reset(id) {
        Ok(_) => card_redirect(id),
        Err(err) => card_error_response(&state.cards, id, err),
    }
}

async fn fallback() -> Response {
    render_not_found_response()
}

fn card_href(id: Uuid) -> String {
    format!("/cards/{id}")
}

fn card_redirect(id: Uuid) -> Response {
    Redirect::to(&card_href(id)).into_response()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

fn page_response(view: GeneratorView, status: StatusCode) -> Response {
    let view = LayoutContext::new("", view);
    render_template_response(CardPageTemplate { view }, status)
}

fn error_page_response(view: GeneratorView, err: &CardError) -> Response {
    let status = err.status();
    let mut response = page_response(view, status);
    ErrorReport::from_error("infra::http::public", status, err).attach(&mut response);
    response
}

/// Show the card page again with the failure inline when the card still exists.
fn card_error_response(cards: &CardService, id: Uuid, err: CardError) -> Response {
    match err {
        CardError::NotFound(_) => render_not_found_response(),
        err if err.is_inline() => match cards.snapshot(id) {
            Ok(snapshot) => {
                let view =
                    GeneratorView::from_snapshot(&snapshot).with_message(err.public_message());
                error_page_response(view, &err)
            }
            Err(_) => render_not_found_response(),
        },
        err => HttpError::from(err).into_response(),
    }
}

//! Card sessions and the generate/export/reset workflow.

mod runtime;
mod session;

use std::{sync::Arc, time::Duration};

use axum::http::StatusCode;
use metrics::counter;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::{
    error::DomainError,
    export::ExportState,
    handle::{ArtifactName, Handle},
    platform::PlatformCapabilities,
    role::RoleTier,
};

use super::{
    delivery::{
        Delivered, DeliveryContext, DeliveryError, DeliveryStrategy, deliver_with_fallback,
        select_strategy,
    },
    error::HttpError,
    export::{ExportError, GeneratedImage, ImageExporter},
    profile::ProfileResolver,
    render::{CardRenderer, ReadyCard, RenderError},
};

pub use runtime::{ExportGuard, InFlightError, InFlightExports};
pub use session::{BoundCard, CardSession, CardSessions, CardSnapshot};

const METRIC_EXPORT_TOTAL: &str = "ritual_export_total";

pub const DEFAULT_IDLE_TTL: Duration = Duration::from_secs(30 * 60);

/// Generator form as submitted by the browser.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CardForm {
    #[serde(default)]
    pub handle: String,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Error)]
pub enum CardError {
    #[error("card {0} not found")]
    NotFound(Uuid),
    #[error(transparent)]
    Invalid(#[from] DomainError),
    #[error("no card has been generated yet")]
    NotGenerated,
    #[error(transparent)]
    InFlight(#[from] InFlightError),
    #[error("card rendering failed")]
    Render(#[from] RenderError),
    #[error("image export failed")]
    Export(#[from] ExportError),
    #[error("image delivery failed")]
    Delivery(#[from] DeliveryError),
}

impl CardError {
    pub fn status(&self) -> StatusCode {
        match self {
            CardError::NotFound(_) => StatusCode::NOT_FOUND,
            CardError::Invalid(err) if err.is_user_facing() => StatusCode::BAD_REQUEST,
            CardError::NotGenerated => StatusCode::BAD_REQUEST,
            CardError::InFlight(_) => StatusCode::CONFLICT,
            CardError::Invalid(_)
            | CardError::Render(_)
            | CardError::Export(_)
            | CardError::Delivery(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn public_message(&self) -> &'static str {
        match self {
            CardError::NotFound(_) => "Card not found",
            CardError::Invalid(err) => err.public_message(),
            CardError::NotGenerated => "Generate a card first",
            CardError::InFlight(_) => "An export is already in progress",
            CardError::Render(_) => "The card could not be rendered",
            CardError::Export(_) => "Could not generate the image",
            CardError::Delivery(_) => "Could not deliver the image",
        }
    }

    /// Whether the card page should be shown again with the error inline.
    pub fn is_inline(&self) -> bool {
        !matches!(self, CardError::NotFound(_) | CardError::InFlight(_))
    }
}

impl From<CardError> for HttpError {
    fn from(err: CardError) -> Self {
        HttpError::from_error(
            "application::cards::CardService",
            err.status(),
            err.public_message(),
            &err,
        )
    }
}

pub struct CardService {
    sessions: CardSessions,
    exports: InFlightExports,
    resolver: Arc<ProfileResolver>,
    renderer: Arc<CardRenderer>,
    exporter: Arc<ImageExporter>,
    idle_ttl: Duration,
}

impl CardService {
    pub fn new(
        resolver: Arc<ProfileResolver>,
        renderer: Arc<CardRenderer>,
        exporter: Arc<ImageExporter>,
        idle_ttl: Duration,
    ) -> Self {
        Self {
            sessions: CardSessions::new(),
            exports: InFlightExports::new(),
            resolver,
            renderer,
            exporter,
            idle_ttl,
        }
    }

    pub fn sessions(&self) -> &CardSessions {
        &self.sessions
    }

    fn session(&self, id: Uuid) -> Result<Arc<CardSession>, CardError> {
        self.sessions.get(id).ok_or(CardError::NotFound(id))
    }

    pub fn snapshot(&self, id: Uuid) -> Result<CardSnapshot, CardError> {
        Ok(self.session(id)?.snapshot())
    }

    /// Validate the form, then start a new session bound to the resolved profile.
    pub async fn generate(&self, form: &CardForm) -> Result<CardSnapshot, CardError> {
        let (handle, role) = validate(form)?;
        let session = self.sessions.create();
        self.bind(&session, form, handle, role).await;
        Ok(session.snapshot())
    }

    /// Replace the profile and role of an existing session.
    ///
    /// Invalid input leaves the bound card untouched and records the message.
    pub async fn regenerate(&self, id: Uuid, form: &CardForm) -> Result<CardSnapshot, CardError> {
        let session = self.session(id)?;
        let (handle, role) = validate(form).inspect_err(|err| {
            session.reject(&form.handle, err.public_message());
        })?;
        self.bind(&session, form, handle, role).await;
        Ok(session.snapshot())
    }

    async fn bind(&self, session: &CardSession, form: &CardForm, handle: Handle, role: RoleTier) {
        let profile = self.resolver.resolve_handle(handle).await;
        let cycle = session.bind(&form.handle, role, profile);
        debug!(
            target = "ritual_cards::cards",
            card_id = %session.id(),
            cycle,
            role = role.slug(),
            "card bound"
        );
    }

    pub fn reset(&self, id: Uuid) -> Result<CardSnapshot, CardError> {
        let session = self.session(id)?;
        session.reset();
        Ok(session.snapshot())
    }

    /// Rasterization-ready card document for the session.
    pub async fn preview(&self, id: Uuid) -> Result<ReadyCard, CardError> {
        let bound = self.session(id)?.bound().ok_or(CardError::NotGenerated)?;
        Ok(self.renderer.prepare(&bound.profile, bound.role).await?)
    }

    /// Render, rasterize and deliver the session's card.
    ///
    /// A second export for the same card while one is running is rejected.
    pub async fn export(
        &self,
        id: Uuid,
        capabilities: &PlatformCapabilities,
        context: &DeliveryContext,
    ) -> Result<Delivered, CardError> {
        let session = self.session(id)?;
        let _guard = self.exports.acquire(id)?;
        let bound = session.bound().ok_or(CardError::NotGenerated)?;
        let strategy = select_strategy(capabilities);

        let result = self.run_export(&session, &bound, strategy, context).await;

        let outcome = match &result {
            Ok(delivered) if delivered.fell_back => "fallback",
            Ok(_) => "ok",
            Err(err) => {
                warn!(
                    target = "ritual_cards::cards",
                    card_id = %id,
                    strategy = strategy.kind().as_str(),
                    error = %err,
                    "card export failed"
                );
                if let Err(state_err) = session.advance(bound.cycle, ExportState::Failed) {
                    warn!(
                        target = "ritual_cards::cards",
                        card_id = %id,
                        error = %state_err,
                        "could not record failed export"
                    );
                }
                "error"
            }
        };
        counter!(
            METRIC_EXPORT_TOTAL,
            "outcome" => outcome,
            "strategy" => strategy.kind().as_str()
        )
        .increment(1);

        result
    }

    async fn run_export(
        &self,
        session: &CardSession,
        bound: &BoundCard,
        strategy: &'static dyn DeliveryStrategy,
        context: &DeliveryContext,
    ) -> Result<Delivered, CardError> {
        let advance = |next| step(session, bound.cycle, next);

        advance(ExportState::Rendering)?;
        let card = self.renderer.prepare(&bound.profile, bound.role).await?;

        advance(ExportState::Rasterizing)?;
        let name = ArtifactName::for_handle(Some(&bound.profile.handle));
        let image = self.exporter.export(&card, name).await?;

        advance(ExportState::PreparingDelivery)?;
        advance(ExportState::DeliveryInProgress)?;
        let delivered = deliver_with_fallback(strategy, image, context)?;

        advance(ExportState::Succeeded)?;
        info!(
            target = "ritual_cards::cards",
            card_id = %session.id(),
            strategy = delivered.kind.as_str(),
            fell_back = delivered.fell_back,
            "card exported"
        );
        Ok(delivered)
    }

    /// Run the whole pipeline once without a session, for offline rendering.
    pub async fn render_artifact(
        &self,
        raw_handle: &str,
        role: RoleTier,
    ) -> Result<GeneratedImage, CardError> {
        let handle = Handle::parse(raw_handle)?;
        let name = ArtifactName::for_handle(Some(&handle));
        let profile = self.resolver.resolve_handle(handle).await;
        let card = self.renderer.prepare(&profile, role).await?;
        Ok(self.exporter.export(&card, name).await?)
    }

    /// Drop idle sessions, sparing any with an export in flight.
    pub fn sweep_idle(&self) -> usize {
        let removed = self
            .sessions
            .sweep(self.idle_ttl, |id| self.exports.is_running(id));
        if removed > 0 {
            info!(
                target = "ritual_cards::cards",
                removed,
                remaining = self.sessions.len(),
                "idle card sessions swept"
            );
        }
        removed
    }
}

fn validate(form: &CardForm) -> Result<(Handle, RoleTier), DomainError> {
    let handle = Handle::parse(&form.handle)?;
    let role = RoleTier::from_selection(form.role.as_deref())?;
    Ok((handle, role))
}

fn step(session: &CardSession, cycle: u64, next: ExportState) -> Result<(), CardError> {
    if !session.advance(cycle, next)? {
        debug!(
            target = "ritual_cards::cards",
            card_id = %session.id(),
            cycle,
            state = next.as_str(),
            "card changed during export; dropping state update"
        );
    }
    Ok(())
}

//! Export progress, tracked per card for status text only.

use serde::Serialize;

use super::error::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportState {
    #[default]
    Idle,
    Rendering,
    Rasterizing,
    PreparingDelivery,
    DeliveryInProgress,
    Succeeded,
    Failed,
}

impl ExportState {
    pub fn as_str(self) -> &'static str {
        match self {
            ExportState::Idle => "idle",
            ExportState::Rendering => "rendering",
            ExportState::Rasterizing => "rasterizing",
            ExportState::PreparingDelivery => "preparing_delivery",
            ExportState::DeliveryInProgress => "delivery_in_progress",
            ExportState::Succeeded => "succeeded",
            ExportState::Failed => "failed",
        }
    }

    /// Text shown under the card.
    pub fn status_text(self) -> &'static str {
        match self {
            ExportState::Idle => "",
            ExportState::Rendering => "Preparing card...",
            ExportState::Rasterizing => "Generating image...",
            ExportState::PreparingDelivery => "Preparing download...",
            ExportState::DeliveryInProgress => "Saving...",
            ExportState::Succeeded => "Card saved.",
            ExportState::Failed => "Could not generate the image. Try again.",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ExportState::Succeeded | ExportState::Failed)
    }

    pub fn is_busy(self) -> bool {
        !matches!(
            self,
            ExportState::Idle | ExportState::Succeeded | ExportState::Failed
        )
    }

    pub fn can_transition_to(self, next: ExportState) -> bool {
        use ExportState::*;

        match (self, next) {
            (_, Idle) => true,
            (Idle | Succeeded | Failed, Rendering) => true,
            (Rendering, Rasterizing) => true,
            (Rasterizing, PreparingDelivery) => true,
            (PreparingDelivery, DeliveryInProgress) => true,
            (DeliveryInProgress, Succeeded) => true,
            (Rendering | Rasterizing | PreparingDelivery | DeliveryInProgress, Failed) => true,
            _ => false,
        }
    }

    pub fn transition(self, next: ExportState) -> Result<ExportState, DomainError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(DomainError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }
}

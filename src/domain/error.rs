use thiserror::Error;

use super::export::ExportState;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("handle must not be empty")]
    EmptyHandle,
    #[error("a role must be selected")]
    MissingRole,
    #[error("unknown role `{0}`")]
    UnknownRole(String),
    #[error("invalid colour `{0}`: expected #rrggbb")]
    InvalidColor(String),
    #[error("export cannot move from {from:?} to {to:?}")]
    InvalidTransition { from: ExportState, to: ExportState },
}

impl DomainError {
    pub fn unknown_role(value: impl Into<String>) -> Self {
        Self::UnknownRole(value.into())
    }

    pub fn invalid_color(value: impl Into<String>) -> Self {
        Self::InvalidColor(value.into())
    }

    /// Whether the error stems from user input rather than a broken invariant.
    pub fn is_user_facing(&self) -> bool {
        !matches!(self, Self::InvalidTransition { .. })
    }

    /// Inline message shown next to the generator form.
    pub fn public_message(&self) -> &'static str {
        match self {
            Self::EmptyHandle => "Enter a handle",
            Self::MissingRole => "Select a role",
            Self::UnknownRole(_) => "Unknown role",
            Self::InvalidColor(_) => "Invalid colour",
            Self::InvalidTransition { .. } => "Unexpected error occurred",
        }
    }
}

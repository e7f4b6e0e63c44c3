use thiserror::Error;

/// Failures callers need to tell apart (e.g. to pick an HTTP status).
///
/// Everything else travels as a plain `anyhow::Error`; these variants are
/// attached to it and recovered with `downcast_ref`.
#[derive(Debug, Error)]
pub enum PlannerError {
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Select at least one weather condition.")]
    NoConditions,

    #[error(
        "No API key configured for provider '{provider}'.\n\
         Hint: run `weatherwise configure {provider}` or set the matching *_API_KEY variable."
    )]
    MissingApiKey { provider: String },

    #[error("{service} request failed with status {status}: {body}")]
    Upstream {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("{provider} returned an empty completion")]
    EmptyCompletion { provider: String },

    #[error("Could not find location: {0}")]
    LocationNotFound(String),
}

impl PlannerError {
    /// Client-side mistake, as opposed to a failure of a collaborator.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::InvalidQuery(_) | Self::NoConditions)
    }

    pub fn upstream(service: &'static str, status: reqwest::StatusCode, body: &str) -> Self {
        Self::Upstream {
            service,
            status: status.as_u16(),
            body: truncate_body(body),
        }
    }
}

pub(crate) fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.len() > MAX {
        let mut end = MAX;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &body[..end])
    } else {
        body.to_string()
    }
}

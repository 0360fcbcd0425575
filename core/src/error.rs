use thiserror::Error;

/// The error taxonomy every repository call resolves to. Raw transport
/// failures are translated exactly once, at the `ApiClient` boundary;
/// repositories and callers only ever see these variants.
#[derive(Debug, Error)]
pub enum ApiError {
    /// No connection, DNS failure, or request timeout.
    #[error("network unavailable")]
    NetworkUnavailable,

    /// The session is gone and a token refresh did not rescue it.
    #[error("unauthenticated")]
    Unauthenticated,

    #[error("server error {status}: {message}")]
    Server { status: u16, message: String },

    #[error("malformed response: {0}")]
    Decode(String),

    #[error("not found")]
    NotFound,

    /// Rejected state transition, e.g. confirming an already-confirmed order.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Offline with no cached copy to fall back on.
    #[error("offline and no cached copy")]
    Unavailable,
}

impl ApiError {
    pub(crate) fn from_status(status: u16, message: String) -> Self {
        match status {
            401 => ApiError::Unauthenticated,
            404 => ApiError::NotFound,
            409 => ApiError::Conflict(message),
            _ => ApiError::Server { status, message },
        }
    }

    /// Whether a failed read may degrade to a stale cache entry. Client-side
    /// rejections (auth, not-found, conflict) must surface; infrastructure
    /// failures fall back.
    pub(crate) fn allows_stale_fallback(&self) -> bool {
        match self {
            ApiError::NetworkUnavailable | ApiError::Decode(_) => true,
            ApiError::Server { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiError::Decode(err.to_string())
        } else {
            // Timeouts, refused connections, and torn sockets all land on the
            // same offline fallback path.
            ApiError::NetworkUnavailable
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_map_to_the_taxonomy() {
        assert!(matches!(
            ApiError::from_status(404, String::new()),
            ApiError::NotFound
        ));
        assert!(matches!(
            ApiError::from_status(409, "dup".to_string()),
            ApiError::Conflict(_)
        ));
        assert!(matches!(
            ApiError::from_status(500, String::new()),
            ApiError::Server { status: 500, .. }
        ));
    }

    #[test]
    fn only_infrastructure_failures_fall_back_to_stale() {
        assert!(ApiError::NetworkUnavailable.allows_stale_fallback());
        assert!(
            ApiError::Server {
                status: 503,
                message: String::new()
            }
            .allows_stale_fallback()
        );
        assert!(!ApiError::NotFound.allows_stale_fallback());
        assert!(!ApiError::Unauthenticated.allows_stale_fallback());
        assert!(
            !ApiError::Server {
                status: 422,
                message: String::new()
            }
            .allows_stale_fallback()
        );
    }
}

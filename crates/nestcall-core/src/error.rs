use thiserror::Error;

#[derive(Debug, Error)]
pub enum NestError {
    #[error("{0} not supported")]
    UnsupportedBackend(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("failed to call service `{service}`: {reason}")]
    PeerCall { service: String, reason: String },

    #[error("unsupported action `{0}`")]
    UnknownAction(String),

    #[error("envelope nests calls {depth} levels deep (max {max})")]
    TooDeep { depth: usize, max: usize },

    #[error("envelope carries {count} actions (max {max})")]
    TooManyActions { count: usize, max: usize },

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl NestError {
    /// Per-action diagnostic recorded in the envelope's error list.
    ///
    /// Peer failures collapse to a short line naming the service; the
    /// transport detail goes to the log instead.
    pub fn diagnostic(&self) -> String {
        match self {
            NestError::PeerCall { service, .. } => format!("failed to call service `{service}`"),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, NestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_backend_message_is_bare() {
        let err = NestError::UnsupportedBackend("redis".into());
        assert_eq!(err.to_string(), "redis not supported");
        assert_eq!(err.diagnostic(), "redis not supported");
    }

    #[test]
    fn peer_call_diagnostic_drops_transport_detail() {
        let err = NestError::PeerCall {
            service: "ruby".into(),
            reason: "connection refused".into(),
        };
        assert_eq!(err.diagnostic(), "failed to call service `ruby`");
        assert!(err.to_string().contains("connection refused"));
    }
}

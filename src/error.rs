use thiserror::Error;

use crate::types::FailureKind;

/// Failure of one unit of work inside a client tick.
///
/// Every variant is caught where the unit ends, logged with the client
/// prefix, and recorded in the item outcome. None of them stop a loop.
#[derive(Debug, Error)]
pub enum LoopError {
    #[error("fetch failed: {0:#}")]
    Fetch(anyhow::Error),
    #[error("model failed: {0:#}")]
    Model(anyhow::Error),
    #[error("send failed: {0:#}")]
    Send(anyhow::Error),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("store failed: {0:#}")]
    Store(anyhow::Error),
}

impl LoopError {
    pub fn kind(&self) -> FailureKind {
        match self {
            LoopError::Fetch(_) => FailureKind::Fetch,
            LoopError::Model(_) => FailureKind::Model,
            LoopError::Send(_) => FailureKind::Send,
            LoopError::Malformed(_) => FailureKind::Malformed,
            LoopError::Store(_) => FailureKind::Store,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_keeps_context_chain() {
        let inner = anyhow::anyhow!("connection reset").context("GET /2/tweets/9");
        let err = LoopError::Fetch(inner);
        assert_eq!(err.kind(), FailureKind::Fetch);
        assert_eq!(err.to_string(), "fetch failed: GET /2/tweets/9: connection reset");
    }
}

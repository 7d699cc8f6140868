use delay_domain::id::MessageId;

/// Delay platform error variants.
///
/// None of these are fatal to a worker loop: transient failures and timeouts
/// are retried on the next tick, the rest are handled by drop-with-log or
/// retry-via-rescan.
#[derive(Debug, thiserror::Error)]
pub enum DelayError {
    #[error("duplicate dedup key {0}")]
    DuplicateKey(String),
    #[error("malformed delay request")]
    Decode(#[source] serde_json::Error),
    #[error("unknown topic {0}")]
    UnknownTopic(String),
    #[error("message {id} was published but could not be marked complete")]
    PartialCompletion {
        id: MessageId,
        #[source]
        source: Box<DelayError>,
    },
    #[error("invalid request: {0}")]
    InvalidRequest(&'static str),
    #[error("operation timed out")]
    Timeout,
    #[error("transient i/o error: {0:#}")]
    Transient(#[from] anyhow::Error),
}

impl DelayError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DuplicateKey(_) => "DUPLICATE_KEY",
            Self::Decode(_) => "DECODE",
            Self::UnknownTopic(_) => "UNKNOWN_TOPIC",
            Self::PartialCompletion { .. } => "PARTIAL_COMPLETION",
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::Timeout => "TIMEOUT",
            Self::Transient(_) => "TRANSIENT_IO",
        }
    }
}

/// Run `fut` with a deadline, mapping expiry to [`DelayError::Timeout`].
pub async fn with_timeout<T, F>(limit: std::time::Duration, fut: F) -> Result<T, DelayError>
where
    F: std::future::Future<Output = Result<T, DelayError>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| DelayError::Timeout)?
}

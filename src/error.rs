use std::fmt;

use thiserror::Error;

/// One of the three external networks the pipeline calls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Segmentation,
    Pose,
    Gesture,
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Network::Segmentation => "segmentation",
            Network::Pose => "pose",
            Network::Gesture => "gesture",
        })
    }
}

/// Failure of a single prediction. Every stage aborts the invocation on its first error.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed input, e.g. an image or canvas with a zero dimension.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The compute context could not be created or a dispatch failed.
    #[error("compute context unavailable: {0}")]
    ComputeUnavailable(String),

    /// The hand mask came out empty. This is a normal outcome, not a fault.
    #[error("no hand detected")]
    NoHandDetected,

    #[error("{network} network inference failed: {source}")]
    NetworkInferenceFailed {
        network: Network,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },
}

impl Error {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidInput(msg.into())
    }

    pub(crate) fn inference(network: Network, source: anyhow::Error) -> Self {
        Error::NetworkInferenceFailed {
            network,
            source: source.into(),
        }
    }

    /// Returns `true` for [`Error::NoHandDetected`].
    pub fn is_no_hand(&self) -> bool {
        matches!(self, Error::NoHandDetected)
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

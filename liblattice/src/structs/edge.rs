use serde::{Deserialize, Serialize};

use crate::util::LOGZERO;

/// The forward-backward state of an edge.
///
/// An edge starts out `Unscored`, gains an alpha in the forward pass,
/// a beta in the backward pass, and finally a normalized posterior.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum EdgePayload {
    #[default]
    Unscored,
    Forward {
        alpha: f64,
    },
    Scored {
        alpha: f64,
        beta: f64,
    },
    Posterior {
        alpha: f64,
        beta: f64,
        posterior: f64,
    },
}

impl EdgePayload {
    pub fn alpha(&self) -> Option<f64> {
        match *self {
            EdgePayload::Unscored => None,
            EdgePayload::Forward { alpha }
            | EdgePayload::Scored { alpha, .. }
            | EdgePayload::Posterior { alpha, .. } => Some(alpha),
        }
    }

    pub fn beta(&self) -> Option<f64> {
        match *self {
            EdgePayload::Unscored | EdgePayload::Forward { .. } => None,
            EdgePayload::Scored { beta, .. } | EdgePayload::Posterior { beta, .. } => Some(beta),
        }
    }

    pub fn posterior(&self) -> Option<f64> {
        match *self {
            EdgePayload::Posterior { posterior, .. } => Some(posterior),
            _ => None,
        }
    }

    /// Returns the same payload with its beta replaced, promoting
    /// the payload to `Scored` (any stale posterior is dropped).
    /// Unscored payloads stay unscored.
    pub(crate) fn with_beta(self, beta: f64) -> Self {
        match self {
            EdgePayload::Unscored => EdgePayload::Unscored,
            EdgePayload::Forward { alpha }
            | EdgePayload::Scored { alpha, .. }
            | EdgePayload::Posterior { alpha, .. } => EdgePayload::Scored { alpha, beta },
        }
    }
}

/// An arc from a node to every node that enters at `frame`.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    /// The frame of the successor nodes (one past the last frame of the word)
    pub frame: usize,
    /// The acoustic score of the arc, natural log domain
    pub acoustic_score: f64,
    pub payload: EdgePayload,
}

impl Edge {
    pub fn new(frame: usize, acoustic_score: f64) -> Self {
        Self {
            frame,
            acoustic_score,
            payload: EdgePayload::Unscored,
        }
    }

    pub fn alpha_or_logzero(&self) -> f64 {
        self.payload.alpha().unwrap_or(LOGZERO)
    }

    pub fn beta_or_logzero(&self) -> f64 {
        self.payload.beta().unwrap_or(LOGZERO)
    }
}

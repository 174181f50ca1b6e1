//! Typed errors for the parts of the clone pipeline that must branch on
//! failure kind (fatal vs. warn-and-skip). Everything else stays on
//! `anyhow::Error`, matching the rest of this crate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GitError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("corrupt object {id}: {reason}")]
    CorruptObject { id: String, reason: String },

    #[error("delta error: {0}")]
    Delta(String),

    #[error("missing base object {0} for REF_DELTA")]
    BaseMissing(String),

    #[error("unsupported object encoding: {0}")]
    UnsupportedObject(String),

    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("checkout could not read {kind} {id}: {reason}")]
    CheckoutMissing {
        kind: String,
        id: String,
        reason: String,
    },
}

use std::fmt::Display;

use pf_common::Money;
use thiserror::Error;

use crate::db_types::OrderId;

/// Business outcome of a payment attempt. `Failed` is a declined charge, not an error; it moves
/// the order to its `Failed` terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentStatus {
    Success,
    Failed,
}

impl Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentStatus::Success => write!(f, "Success"),
            PaymentStatus::Failed => write!(f, "Failed"),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum PaymentError {
    /// The provider could not be reached or gave no definitive answer. The caller may retry the
    /// whole handler; no charge was committed.
    #[error("Transient payment provider failure: {0}")]
    Transient(String),
}

/// External payment collaborator.
///
/// The call is synchronous from the handler's point of view and is the sole non-transactional
/// side effect of the pipeline. Implementations may or may not charge on `Transient`; the worker
/// assumes the call is not idempotent from the outside and only invokes it once per committed
/// state transition.
#[allow(async_fn_in_trait)]
pub trait PaymentService: Clone + Send + Sync {
    async fn process(&self, order_id: &OrderId, amount: Money) -> Result<PaymentStatus, PaymentError>;
}

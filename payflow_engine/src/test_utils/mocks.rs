use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
};

use pf_common::Money;

use crate::{
    db_types::OrderId,
    traits::{PaymentError, PaymentService, PaymentStatus},
};

/// A payment service that replays a script of responses, then keeps returning a fallback.
/// Counts its calls so tests can assert how often the worker reached the payment stage.
#[derive(Clone)]
pub struct ScriptedPaymentService {
    script: Arc<Mutex<VecDeque<Result<PaymentStatus, PaymentError>>>>,
    fallback: Result<PaymentStatus, PaymentError>,
    calls: Arc<AtomicU64>,
}

impl ScriptedPaymentService {
    pub fn always(status: PaymentStatus) -> Self {
        Self::scripted(Vec::new(), Ok(status))
    }

    /// Every call raises a transient provider failure.
    pub fn always_transient() -> Self {
        Self::scripted(Vec::new(), Err(PaymentError::Transient("provider unreachable".to_string())))
    }

    /// Responses consumed in order before falling back to `fallback`.
    pub fn scripted(
        responses: Vec<Result<PaymentStatus, PaymentError>>,
        fallback: Result<PaymentStatus, PaymentError>,
    ) -> Self {
        Self {
            script: Arc::new(Mutex::new(responses.into())),
            fallback,
            calls: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PaymentService for ScriptedPaymentService {
    async fn process(&self, _order_id: &OrderId, _amount: Money) -> Result<PaymentStatus, PaymentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| self.fallback.clone())
    }
}

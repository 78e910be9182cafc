use log::*;
use payflow_engine::{
    db_types::OrderId,
    traits::{PaymentError, PaymentService, PaymentStatus},
};
use pf_common::Money;

/// The built-in payment executor wired into the default deployment. Declines a configurable
/// share of charges; in always-transient mode every call raises, which drives the worker's
/// retry and dead-letter paths for drills.
#[derive(Debug, Clone)]
pub struct AutoPaymentService {
    failure_rate: f64,
    always_transient: bool,
}

impl AutoPaymentService {
    pub fn new(failure_rate: f64, always_transient: bool) -> Self {
        Self { failure_rate: failure_rate.clamp(0.0, 1.0), always_transient }
    }
}

impl PaymentService for AutoPaymentService {
    async fn process(&self, order_id: &OrderId, amount: Money) -> Result<PaymentStatus, PaymentError> {
        if self.always_transient {
            warn!("💳️ Payment provider unreachable for order {order_id}");
            return Err(PaymentError::Transient("payment provider unreachable".to_string()));
        }
        let declined = rand::random::<f64>() < self.failure_rate;
        let status = if declined { PaymentStatus::Failed } else { PaymentStatus::Success };
        debug!("💳️ Charged {amount} for order {order_id}: {status}");
        Ok(status)
    }
}

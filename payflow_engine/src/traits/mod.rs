//! Behaviour contracts for pipeline backends and external collaborators.
mod payment_service;
mod pipeline_database;

pub use payment_service::{PaymentError, PaymentService, PaymentStatus};
pub use pipeline_database::{PipelineDatabase, PipelineError};

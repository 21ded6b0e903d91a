pub mod api;
pub mod models;
pub mod provider;
pub mod reconciliation;
pub mod service;

pub use models::{plan_unlocks, PaymentTransaction, Subscription, PAYMENT_PROVIDER};
pub use provider::{ProviderOrder, RazorpayClient};
pub use reconciliation::{process_tick as run_reconciliation_tick, spawn as spawn_reconciliation};
pub use service::{CreatedOrder, PaymentService, VerificationOutcome, RECEIPT_NAMESPACE};

mod gateway;
mod service;
mod waiver;

pub use gateway::{GatewayClient, GatewayClientRef, HttpGatewayClient, InitiationRequest};
pub use service::{
    format_amount, AttendeeRegistration, CallbackKind, CallbackPayload, CallbackResult,
    InitiationOutcome, IntegrityFailure, PaymentService, PaymentSession, PaymentSettings,
    PaymentStatusView,
};
pub use waiver::{AffiliationWaiver, WaiverPolicy, WaiverPolicyRef};

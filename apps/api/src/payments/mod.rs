// Payments: gateway orders, signature verification and the subscription
// state machine (pending -> successful | failed).

pub mod gateway;
pub mod handlers;
pub mod subscription;

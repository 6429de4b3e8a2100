pub mod analysis;
pub mod payment;
pub mod user;

pub use analysis::{Analysis, TargetTier};
pub use payment::{Payment, PaymentStatus, SubscriptionType};
pub use user::User;

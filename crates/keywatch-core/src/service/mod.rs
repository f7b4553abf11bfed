//! Pipeline services, one module per component.
//!
//! Each service is generic over the ports it needs and exposes the single
//! operation the pipeline calls plus a `run` batch sweep where the component
//! is sweep-shaped. Sweeps classify failures with
//! [`crate::domain::errors::PipelineError::is_data_state`]: transport and
//! validation problems skip the current item, integrity problems halt the
//! sweep for operator intervention.

pub mod change;
pub mod expiry;
pub mod lookup;
pub mod notify;
pub mod scheduler;
pub mod signup;
pub mod unsubscribe;

pub use change::ChangeDetector;
pub use expiry::ExpirySweep;
pub use lookup::LookupExecutor;
pub use notify::Notifier;
pub use scheduler::{InvalidFrequency, Scheduler};
pub use signup::{RegistrationOutcome, SignupProcessor};
pub use unsubscribe::{process_unsubscribe, UnsubscribeResult};

//! # Keywatch Gateway
//!
//! The standalone unsubscribe web service. One meaningful route:
//!
//! ```text
//! GET /?t=<token>  →  200 confirmation     (token found, account deactivated)
//!                     400 generic error    (missing or unknown token)
//!                     500 generic error    (storage failure)
//! ```
//!
//! Each request is handled independently with no cross-request state; the
//! store is shared behind a mutex with the runtime's sweep loop.

pub mod router;
pub mod server;

pub use router::{router, AppState};
pub use server::{serve, GatewayError};

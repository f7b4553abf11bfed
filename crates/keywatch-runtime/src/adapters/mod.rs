//! Production adapters for the outbound ports.
//!
//! The in-memory store and the mocks live in the core crate; everything here
//! talks to the real world: the mail provider's HTTP API, the network's key
//! directory, and the signal-cli subprocess that delivers registrations.

pub mod directory;
pub mod mailgun;
pub mod signal_cli;

pub use directory::DirectoryFetcher;
pub use mailgun::MailgunMailer;
pub use signal_cli::SignalCliSource;

//! Client side of the live research-session protocol.
//!
//! A [`SessionController`] opens one [`transport::Transport`] per research run,
//! sends the start request, and folds every inbound frame through the
//! [`decoder`] and the [`reducer`] into a [`Session`] that observers read as
//! snapshots.

pub mod config;
pub mod controller;
pub mod decoder;
pub mod error;
pub mod identity;
pub mod reducer;
pub mod session;
pub mod transport;

pub use config::{load_settings, ClientSettings};
pub use controller::{SessionController, SessionSubscription, StartedSession};
pub use decoder::{decode, Progress, SessionEvent};
pub use error::{DecodeError, StartError, TransportError};
pub use identity::{AnonymousIdentity, Identity, IdentityProvider, StaticIdentity};
pub use session::Session;
pub use transport::{Transport, TransportHandle, TransportSignal, WebSocketTransport};

//! Wire protocol and storage contract shared by the parley relay crates.

pub mod api;
pub mod command;
pub mod envelope;
pub mod models;
pub mod store;

pub use api::{Credentials, ErrorCode};
pub use command::{Command, ProtocolError};
pub use envelope::{Envelope, Kind, SYSTEM_SENDER};
pub use models::{PresenceEntry, Profile};
pub use store::{LoginVerdict, Registration, Store, StoreError, StoreResult};

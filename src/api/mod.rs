//! Entity convenience wrappers: thin request builders over the dispatch core.
//!
//! Every wrapper builds [`crate::RequestEnvelope`]s against one shared
//! [`crate::OrbitHttpClient`] and routes them through the background
//! dispatcher (`submit` + `wait`), so application traffic obeys one priority
//! order. Identity flows (`login`, `signup`, `logout`) run inline: nothing
//! else can proceed without them anyway.

mod documents;
mod files;
mod links;
mod push;
mod users;

pub use documents::{Document, Documents};
pub use files::{FileDetails, Files};
pub use links::{Link, Links};
pub use push::Push;
pub use users::{UserProfile, Users};

//! Authentication material: the credential record, the sequence-stamped
//! store, and the durable persistence boundary behind it.

mod credentials;
mod store;
mod vault;

pub use credentials::Credentials;
pub use store::CredentialStore;
pub use vault::{FileVault, MemoryVault, Vault};

pub(crate) use store::LoginResponse;

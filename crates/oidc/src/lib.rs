pub mod discovery;
pub mod error;
pub mod flow;
pub mod identity;
pub mod pkce;
pub mod store;
pub mod types;

pub use discovery::DiscoveryCache;
pub use error::AuthError;
pub use flow::{AuthFlow, LoginStart, LoginSession};
pub use store::PendingLoginStore;
pub use types::{DiscoveryMetadata, ProviderConfig, TokenSet, UserIdentity};

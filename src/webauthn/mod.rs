pub mod engine;
pub mod error;
pub mod models;
pub mod passkeys;
pub mod relying_party;
pub mod service;
pub mod sessions;
pub mod store;

pub use engine::*;
pub use error::*;
pub use models::*;
pub use passkeys::*;
pub use relying_party::*;
pub use service::*;
pub use sessions::*;
pub use store::*;

//! Auth adapters: the hosted GoTrue backend and local session storage.

pub mod gotrue;
pub mod storage;

pub use gotrue::GoTrueAuthBackend;
pub use storage::LocalAuthStorage;

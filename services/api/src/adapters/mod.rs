pub mod db;
pub mod google;
pub mod memory;
pub mod openrouter;
pub mod retry;

pub use db::DbAdapter;
pub use google::GoogleIdentityAdapter;
pub use memory::MemoryAdapter;
pub use openrouter::OpenRouterAdapter;
pub use retry::{RetryPolicy, RetryingGenerator};

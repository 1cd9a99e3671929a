//! Specific background job implementations.
//!
//! Each job wraps a [`RecurringJob`](super::RecurringJob) and supplies its
//! own action.

pub mod cache_health;
pub mod cache_warmer;

pub use cache_health::CacheHealthJob;
pub use cache_warmer::CacheWarmerJob;

//! # Reservoir Pool
//!
//! A bounded pool for expensive, reusable resources such as network
//! connections. The pool creates instances through a caller-supplied
//! [`Resource`], validates idle instances before lending them out, replaces
//! the ones that went stale, and makes callers wait (for a bounded time) when
//! every instance is checked out.
//!
//! ```rust,ignore
//! let pool = Pool::new(RedisResource, redis_url, PoolConfig::default()).await?;
//!
//! let conn = pool.acquire().await?;
//! conn.ping().await?;
//! pool.release(conn)?;
//!
//! pool.shutdown().await?;
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod managed;
pub mod pool;
pub mod resource;

pub use config::{PoolConfig, PoolStrategy};
pub use error::{Error, Result};
pub use events::{CleanupReason, EventBus, PoolEvent};
pub use managed::{InstanceId, Managed};
pub use pool::{Pool, PoolStats};
pub use resource::Resource;

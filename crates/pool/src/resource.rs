//! The capability contract a pooled resource type implements (bb8-style)
//!
//! The pool never inspects instances; it only calls `create`, `is_valid` and
//! `cleanup` on the [`Resource`] it was built with.

use async_trait::async_trait;

use crate::error::Result;

/// Creates, health-checks and tears down instances of one resource type.
///
/// Only `create` is required. The defaults treat every instance as healthy
/// and drop it on cleanup.
#[async_trait]
pub trait Resource: Send + Sync + 'static {
    /// Arguments handed to every `create` call (connection settings, etc.).
    type Args: Send + Sync + 'static;

    /// The instance type produced by this resource.
    type Instance: Send + Sync + 'static;

    /// Identifier for this resource type (e.g. "postgres", "sftp"), used in
    /// errors and logs.
    fn id(&self) -> &str;

    /// Create a new instance.
    async fn create(&self, args: &Self::Args) -> Result<Self::Instance>;

    /// Check whether an idle instance is still usable before it is lent out.
    async fn is_valid(&self, _instance: &Self::Instance) -> Result<bool> {
        Ok(true)
    }

    /// Tear down an instance that leaves the pool for good.
    async fn cleanup(&self, _instance: &Self::Instance) -> Result<()> {
        Ok(())
    }
}

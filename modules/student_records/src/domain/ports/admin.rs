use async_trait::async_trait;

/// Read-only view of the administrative account registry.
///
/// The registry belongs to another subsystem; this core only asks whether an
/// email identifies an administrator.
#[async_trait]
pub trait AdminDirectory: Send + Sync {
    async fn is_administrative_account(&self, email: &str) -> anyhow::Result<bool>;
}

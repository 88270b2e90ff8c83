//! Deletion protection for records tied to administrative identities.
//!
//! Every delete-class transition in [`LifecycleEngine`](crate::domain::service::LifecycleEngine)
//! goes through [`ProtectionGuard::is_protected`]; a positive answer blocks
//! the transition before any write happens.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::contract::model::Student;
use crate::domain::ports::AdminDirectory;

/// Decides whether a record may be soft-deleted or purged.
///
/// Implementations must be side-effect free.
#[async_trait]
pub trait ProtectionGuard: Send + Sync {
    async fn is_protected(&self, student: &Student) -> anyhow::Result<bool>;
}

/// Protects records whose email belongs to an administrative account.
#[derive(Clone)]
pub struct AdminAccountGuard {
    directory: Arc<dyn AdminDirectory>,
}

impl AdminAccountGuard {
    pub fn new(directory: Arc<dyn AdminDirectory>) -> Self {
        Self { directory }
    }
}

#[async_trait]
impl ProtectionGuard for AdminAccountGuard {
    #[instrument(
        name = "student_records.protection.is_protected",
        skip(self, student),
        fields(student_id = %student.id)
    )]
    async fn is_protected(&self, student: &Student) -> anyhow::Result<bool> {
        let Some(email) = normalized_email(student.email.as_deref()) else {
            return Ok(false);
        };

        let protected = self.directory.is_administrative_account(&email).await?;
        if protected {
            debug!("record is linked to an administrative account");
        }
        Ok(protected)
    }
}

/// Lower-cased, trimmed email; `None` for missing or blank values.
pub(crate) fn normalized_email(email: Option<&str>) -> Option<String> {
    email
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .map(str::to_ascii_lowercase)
}

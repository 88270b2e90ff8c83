use anyhow::Context;
use async_trait::async_trait;
use sea_orm::sea_query::{Expr, Func};
use sea_orm::{ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter};

use crate::domain::ports::AdminDirectory;
use crate::infra::storage::admin_entity::{Column, Entity as AdminEntity};

/// Reads the `admins` table. Emails are compared case-insensitively.
pub struct SeaOrmAdminDirectory<C>
where
    C: ConnectionTrait + Send + Sync,
{
    conn: C,
}

impl<C> SeaOrmAdminDirectory<C>
where
    C: ConnectionTrait + Send + Sync,
{
    pub fn new(conn: C) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl<C> AdminDirectory for SeaOrmAdminDirectory<C>
where
    C: ConnectionTrait + Send + Sync + 'static,
{
    async fn is_administrative_account(&self, email: &str) -> anyhow::Result<bool> {
        let count = AdminEntity::find()
            .filter(Expr::expr(Func::lower(Expr::col(Column::Email))).eq(email.trim().to_lowercase()))
            .count(&self.conn)
            .await
            .context("admin lookup failed")?;
        Ok(count > 0)
    }
}

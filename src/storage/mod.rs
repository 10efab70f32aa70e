pub mod faces;
pub mod sheet;
pub mod user;

pub use faces::{GitHubContents, LocalFaceDir, ReferenceImageSource};
pub use sheet::SheetClient;
pub use user::{Role, SheetUserRow, UserPatch, UserRecord};

use crate::common::Result;
use async_trait::async_trait;

/// Where user accounts live.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// All users, in store-insertion order. Face matching depends on this order for ties.
    async fn list(&self) -> Result<Vec<UserRecord>>;

    async fn update(&self, email: &str, patch: &UserPatch) -> Result<()>;
}

#[async_trait]
impl<T: UserStore + ?Sized> UserStore for std::sync::Arc<T> {
    async fn list(&self) -> Result<Vec<UserRecord>> {
        (**self).list().await
    }

    async fn update(&self, email: &str, patch: &UserPatch) -> Result<()> {
        (**self).update(email, patch).await
    }
}

pub use super::files::Entity as Files;
pub use super::folders::Entity as Folders;
pub use super::pending_deletions::Entity as PendingDeletions;
pub use super::recycle_items::Entity as RecycleItems;
pub use super::refresh_tokens::Entity as RefreshTokens;
pub use super::shares::Entity as Shares;
pub use super::users::Entity as Users;

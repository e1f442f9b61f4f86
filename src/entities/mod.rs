pub mod prelude;

pub mod files;
pub mod folders;
pub mod pending_deletions;
pub mod recycle_items;
pub mod refresh_tokens;
pub mod shares;
pub mod users;

pub mod auth_service;
pub mod deletions;
pub mod file_service;
pub mod folder_service;
pub mod jobs;
pub mod monitoring;
pub mod names;
pub mod quota;
pub mod recycle_service;
pub mod share_service;
pub mod storage;
pub mod worker;

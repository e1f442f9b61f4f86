//! Name uniqueness inside a folder. Only live rows take part: soft-deleted
//! items and uploads that never completed do not reserve a name.

use crate::api::error::AppError;
use crate::entities::{prelude::*, *};
use crate::utils::validation::numbered_name;
use sea_orm::{ColumnTrait, Condition, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter};

pub fn in_folder(column: impl ColumnTrait, folder_id: Option<&str>) -> Condition {
    match folder_id {
        Some(id) => Condition::all().add(column.eq(id)),
        None => Condition::all().add(column.is_null()),
    }
}

pub async fn file_name_taken<C: ConnectionTrait>(
    conn: &C,
    owner_id: &str,
    folder_id: Option<&str>,
    name: &str,
    exclude_id: Option<&str>,
) -> Result<bool, AppError> {
    let mut query = Files::find()
        .filter(files::Column::OwnerId.eq(owner_id))
        .filter(in_folder(files::Column::FolderId, folder_id))
        .filter(files::Column::Name.eq(name))
        .filter(files::Column::Status.eq(files::STATUS_AVAILABLE))
        .filter(files::Column::DeletedAt.is_null());
    if let Some(id) = exclude_id {
        query = query.filter(files::Column::Id.ne(id));
    }
    Ok(query.count(conn).await? > 0)
}

pub async fn folder_name_taken<C: ConnectionTrait>(
    conn: &C,
    owner_id: &str,
    parent_id: Option<&str>,
    name: &str,
    exclude_id: Option<&str>,
) -> Result<bool, AppError> {
    let mut query = Folders::find()
        .filter(folders::Column::OwnerId.eq(owner_id))
        .filter(in_folder(folders::Column::ParentId, parent_id))
        .filter(folders::Column::Name.eq(name))
        .filter(folders::Column::DeletedAt.is_null());
    if let Some(id) = exclude_id {
        query = query.filter(folders::Column::Id.ne(id));
    }
    Ok(query.count(conn).await? > 0)
}

pub async fn ensure_file_name_free<C: ConnectionTrait>(
    conn: &C,
    owner_id: &str,
    folder_id: Option<&str>,
    name: &str,
    exclude_id: Option<&str>,
) -> Result<(), AppError> {
    if file_name_taken(conn, owner_id, folder_id, name, exclude_id).await? {
        return Err(AppError::Conflict(format!(
            "A file named '{}' already exists in this folder",
            name
        )));
    }
    Ok(())
}

pub async fn ensure_folder_name_free<C: ConnectionTrait>(
    conn: &C,
    owner_id: &str,
    parent_id: Option<&str>,
    name: &str,
    exclude_id: Option<&str>,
) -> Result<(), AppError> {
    if folder_name_taken(conn, owner_id, parent_id, name, exclude_id).await? {
        return Err(AppError::Conflict(format!(
            "A folder named '{}' already exists here",
            name
        )));
    }
    Ok(())
}

/// First of `name`, `name (1)`, `name (2)`, ... not used in the folder.
pub async fn free_name<C: ConnectionTrait>(
    conn: &C,
    owner_id: &str,
    parent_id: Option<&str>,
    name: &str,
    exclude_id: &str,
    is_file: bool,
) -> Result<String, AppError> {
    let mut candidate = name.to_string();
    let mut n = 0;
    loop {
        let taken = if is_file {
            file_name_taken(conn, owner_id, parent_id, &candidate, Some(exclude_id)).await?
        } else {
            folder_name_taken(conn, owner_id, parent_id, &candidate, Some(exclude_id)).await?
        };
        if !taken {
            return Ok(candidate);
        }
        n += 1;
        candidate = numbered_name(name, n, is_file);
    }
}

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sea_orm::DbErr),
    #[error("Record not found: {0}")]
    NotFound(String),
    #[error("Concurrent update: {0}")]
    Conflict(String),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

use std::str::FromStr;

use sqlx::{PgPool, Row, postgres::PgRow};

use crate::app_error::{AppError, AppResult};

pub mod directory;
pub mod dunning_record;
pub mod provider_mapping;
pub mod subscription;
pub mod tenant;
pub mod webhook_event;

#[derive(Clone)]
pub struct PostgresPersistence {
    pool: PgPool,
}

impl PostgresPersistence {
    pub fn new(pool: PgPool) -> Self {
        PostgresPersistence { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Read a text column holding an enum value.
///
/// A value the enum does not know means the row was written by something
/// else; it surfaces as a database error rather than a silent default.
pub(crate) fn parse_column<T: FromStr>(row: &PgRow, column: &str) -> AppResult<T> {
    let raw: String = row.get(column);
    raw.parse().map_err(|_| {
        tracing::error!(column, value = %raw, "Unrecognized enum value in database row");
        AppError::Database(format!("unrecognized value in column {column}"))
    })
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => AppError::NotFound("record".into()),
            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();
                // PostgreSQL unique violation
                if msg.contains("duplicate key") || msg.contains("unique constraint") {
                    AppError::Conflict("A record with this value already exists".into())
                }
                // PostgreSQL foreign key violation
                else if msg.contains("foreign key") || msg.contains("violates foreign key") {
                    AppError::InvalidInput("Referenced record not found".into())
                }
                // PostgreSQL not-null violation
                else if msg.contains("null value") && msg.contains("violates not-null") {
                    AppError::InvalidInput("Required field is missing".into())
                } else {
                    // Log the actual error for debugging, but don't expose details
                    tracing::error!(error = ?err, "Database error");
                    AppError::Database("Database operation failed".into())
                }
            }
            _ => {
                tracing::error!(error = ?err, "Database error");
                AppError::Database("Database operation failed".into())
            }
        }
    }
}

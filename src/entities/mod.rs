/// Entity stores for the portal's persistent collections
///
/// Plain sqlx-backed stores. Mutations of existing rows are only reached
/// through the moderation workflow, which applies approved payloads via
/// the partial-update helpers here on its own transaction connection.

pub mod degrees;
pub mod ideas;
pub mod papers;
pub mod users;

use crate::error::{PortalError, PortalResult};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use uuid::Uuid;

pub use degrees::{Degree, DegreeStore};
pub use ideas::{Idea, IdeaStore};
pub use papers::{Paper, PaperStore};
pub use users::{User, UserStore};

/// Merge a partial field set into one row.
///
/// Only whitelisted columns may appear in the payload; anything else is a
/// validation error so arbitrary columns can never be smuggled through an
/// approved change.
pub(crate) async fn apply_partial_update(
    conn: &mut SqliteConnection,
    table: &str,
    allowed: &[&str],
    id: Uuid,
    payload: &serde_json::Value,
) -> PortalResult<()> {
    let fields = payload.as_object().ok_or_else(|| {
        PortalError::Validation("Update payload must be a JSON object".to_string())
    })?;

    if fields.is_empty() {
        return Err(PortalError::Validation("Update payload is empty".to_string()));
    }

    for key in fields.keys() {
        if !allowed.contains(&key.as_str()) {
            return Err(PortalError::Validation(format!(
                "Field '{}' cannot be changed on {}",
                key, table
            )));
        }
    }

    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(format!("UPDATE {} SET ", table));
    let mut first = true;
    for (key, value) in fields {
        if !first {
            builder.push(", ");
        }
        first = false;
        builder.push(format!("{} = ", key));
        push_json_bind(&mut builder, value)?;
    }
    builder.push(" WHERE id = ").push_bind(id.to_string());

    let result = builder.build().execute(&mut *conn).await?;
    if result.rows_affected() == 0 {
        return Err(PortalError::NotFound(format!(
            "{} record {} not found",
            table, id
        )));
    }

    Ok(())
}

/// Delete one row by id
pub(crate) async fn apply_delete(
    conn: &mut SqliteConnection,
    table: &str,
    id: Uuid,
) -> PortalResult<()> {
    let query = format!("DELETE FROM {} WHERE id = ?", table);
    let result = sqlx::query(&query)
        .bind(id.to_string())
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(PortalError::NotFound(format!(
            "{} record {} not found",
            table, id
        )));
    }

    Ok(())
}

fn push_json_bind(
    builder: &mut QueryBuilder<Sqlite>,
    value: &serde_json::Value,
) -> PortalResult<()> {
    match value {
        serde_json::Value::String(s) => {
            builder.push_bind(s.clone());
        }
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                builder.push_bind(i);
            } else if let Some(f) = n.as_f64() {
                builder.push_bind(f);
            } else {
                return Err(PortalError::Validation(format!("Unsupported number: {}", n)));
            }
        }
        serde_json::Value::Bool(b) => {
            builder.push_bind(*b);
        }
        serde_json::Value::Null => {
            builder.push("NULL");
        }
        other => {
            return Err(PortalError::Validation(format!(
                "Unsupported field value: {}",
                other
            )));
        }
    }
    Ok(())
}

use actix_web::error::ErrorBadRequest;
use chrono::NaiveDate;
use serde_json::Value;
use sqlx::MySqlPool;

/// Bindable value for dynamically built statements
#[derive(Debug)]
pub enum SqlValue {
    String(String),
    I64(i64),
    F64(f64),
    Bool(bool),
    Date(NaiveDate),
    Null,
}

#[derive(Debug)]
pub struct SqlUpdate {
    pub sql: String,
    pub values: Vec<SqlValue>,
}

/// Build a partial UPDATE from a JSON payload.
///
/// Only keys in `allowed_columns` are accepted; anything else is a client
/// error, keeping payload keys from reaching the SQL text unchecked.
pub fn build_update_sql(
    table: &str,
    payload: &Value,
    allowed_columns: &[&str],
    id_column: &str,
    id_value: i64,
) -> Result<SqlUpdate, actix_web::Error> {
    let obj = payload
        .as_object()
        .ok_or_else(|| ErrorBadRequest("Payload must be a JSON object"))?;

    if obj.is_empty() {
        return Err(ErrorBadRequest("No fields provided for update"));
    }

    for key in obj.keys() {
        if !allowed_columns.contains(&key.as_str()) {
            return Err(ErrorBadRequest(format!("Unknown field: {}", key)));
        }
    }

    let set_clause = obj
        .keys()
        .map(|k| format!("{} = ?", k))
        .collect::<Vec<_>>()
        .join(", ");

    let sql = format!("UPDATE {} SET {} WHERE {} = ?", table, set_clause, id_column);

    let mut values = Vec::with_capacity(obj.len() + 1);

    for value in obj.values() {
        match value {
            Value::String(s) => {
                if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
                    values.push(SqlValue::Date(d));
                } else {
                    values.push(SqlValue::String(s.clone()));
                }
            }
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    values.push(SqlValue::I64(i));
                } else if let Some(f) = n.as_f64() {
                    values.push(SqlValue::F64(f));
                }
            }
            Value::Bool(b) => values.push(SqlValue::Bool(*b)),
            Value::Null => values.push(SqlValue::Null),
            _ => return Err(ErrorBadRequest("Unsupported JSON value type")),
        }
    }

    values.push(SqlValue::I64(id_value));

    Ok(SqlUpdate { sql, values })
}

pub async fn execute_update(pool: &MySqlPool, update: SqlUpdate) -> Result<u64, sqlx::Error> {
    let mut query = sqlx::query(&update.sql);

    for value in update.values {
        query = match value {
            SqlValue::String(v) => query.bind(v),
            SqlValue::I64(v) => query.bind(v),
            SqlValue::F64(v) => query.bind(v),
            SqlValue::Bool(v) => query.bind(v),
            SqlValue::Date(v) => query.bind(v),
            SqlValue::Null => query.bind(None::<String>),
        };
    }

    let result = query.execute(pool).await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const COLUMNS: &[&str] = &["name", "latitude", "is_active"];

    #[test]
    fn builds_update_for_allowed_fields() {
        let payload = json!({ "name": "Branch Office", "is_active": false });
        let update =
            build_update_sql("attendance_locations", &payload, COLUMNS, "id", 3).unwrap();

        assert!(update.sql.starts_with("UPDATE attendance_locations SET "));
        assert!(update.sql.ends_with("WHERE id = ?"));
        assert!(update.sql.contains("name = ?"));
        assert!(update.sql.contains("is_active = ?"));
        // two fields + the id
        assert_eq!(update.values.len(), 3);
    }

    #[test]
    fn rejects_unknown_fields() {
        let payload = json!({ "name": "x", "radius_meters; DROP TABLE users": 1 });
        assert!(build_update_sql("attendance_locations", &payload, COLUMNS, "id", 3).is_err());
    }

    #[test]
    fn rejects_empty_payload() {
        assert!(build_update_sql("attendance_locations", &json!({}), COLUMNS, "id", 3).is_err());
        assert!(build_update_sql("attendance_locations", &json!([1]), COLUMNS, "id", 3).is_err());
    }
}

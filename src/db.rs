use sqlx::MySqlPool;

/// Connection pools for the two databases the service talks to: its own
/// attendance schema and the read-only c3ais personnel directory.
#[derive(Clone)]
pub struct AppDatabases {
    pub local: MySqlPool,
    pub c3ais: MySqlPool,
}

pub async fn init_db(database_url: &str) -> MySqlPool {
    MySqlPool::connect(database_url)
        .await
        .expect("Failed to connect to database")
}

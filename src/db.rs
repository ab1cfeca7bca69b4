use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgSslMode};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use crate::config::DatabaseConfig;
use crate::error::QueryError;
use crate::models::DbCoordinates;

/// Process-wide PostgreSQL pools, one per set of database coordinates.
///
/// Pools are created lazily; no connection is opened until the first query,
/// and connections are acquired per query and released after it.
pub struct PoolCache {
    pools: Mutex<HashMap<DbCoordinates, PgPool>>,
    options: DatabaseConfig,
}

impl PoolCache {
    pub fn new(options: &DatabaseConfig) -> Self {
        Self {
            pools: Mutex::new(HashMap::new()),
            options: options.clone(),
        }
    }

    pub fn pool(&self, db: &DbCoordinates) -> Result<PgPool, QueryError> {
        let mut pools = self
            .pools
            .lock()
            .map_err(|_| QueryError::Connect("pool cache poisoned".to_string()))?;
        if let Some(pool) = pools.get(db) {
            return Ok(pool.clone());
        }

        let connect = PgConnectOptions::new()
            .host(&db.host)
            .port(db.port)
            .username(&db.user)
            .password(&db.password)
            .database(&db.database)
            .ssl_mode(if db.ssl {
                PgSslMode::Require
            } else {
                PgSslMode::Prefer
            });

        let pool = PgPoolOptions::new()
            .max_connections(self.options.max_connections)
            .acquire_timeout(Duration::from_secs(self.options.connect_timeout_secs))
            .connect_lazy_with(connect);

        pools.insert(db.clone(), pool.clone());
        Ok(pool)
    }

    pub async fn close_all(&self) {
        let pools: Vec<PgPool> = match self.pools.lock() {
            Ok(mut guard) => guard.drain().map(|(_, pool)| pool).collect(),
            Err(_) => return,
        };
        for pool in pools {
            pool.close().await;
        }
    }
}

/// Map a driver error onto the changelog query taxonomy.
pub fn classify_sqlx_error(err: sqlx::Error) -> QueryError {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => QueryError::Connect(err.to_string()),
        sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::TypeNotFound { .. } => QueryError::Decode(err.to_string()),
        other => QueryError::Query(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coords(db: &str) -> DbCoordinates {
        DbCoordinates {
            host: "localhost".into(),
            port: 5432,
            user: "u".into(),
            password: "p".into(),
            database: db.into(),
            ssl: false,
        }
    }

    #[tokio::test]
    async fn pools_are_shared_per_coordinates() {
        let cache = PoolCache::new(&DatabaseConfig::default());
        cache.pool(&coords("a")).unwrap();
        cache.pool(&coords("a")).unwrap();
        cache.pool(&coords("b")).unwrap();
        assert_eq!(cache.pools.lock().unwrap().len(), 2);
        cache.close_all().await;
        assert!(cache.pools.lock().unwrap().is_empty());
    }

    #[test]
    fn connection_errors_are_transient() {
        assert!(matches!(
            classify_sqlx_error(sqlx::Error::PoolTimedOut),
            QueryError::Connect(_)
        ));
        assert!(matches!(
            classify_sqlx_error(sqlx::Error::ColumnNotFound("x".into())),
            QueryError::Decode(_)
        ));
        assert!(matches!(
            classify_sqlx_error(sqlx::Error::RowNotFound),
            QueryError::Query(_)
        ));
    }
}

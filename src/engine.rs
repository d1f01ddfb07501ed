//! Database execution engine for pgread.
//!
//! [`Client`] owns one lazily created pool per target database. Every read
//! runs inside its own transaction that is rolled back when the read is done,
//! whether it succeeded or not.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::TryStreamExt;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgRow, PgTypeInfo, PgTypeKind};
use sqlx::{Column, Either, Executor, PgConnection, Postgres, Row, Statement, Transaction, TypeInfo};
use tokio::sync::Mutex;

use crate::config::ClientConfig;
use crate::error::{PgReadError, PgReadResult};
use crate::materialize::{materialize, CellValue, ColumnDescriptor, ResultCursor, ResultSet};
use crate::pgtypes::ArgValue;

/// Process-wide handle: connection settings plus a pool per database.
#[derive(Clone)]
pub struct Client {
    config: ClientConfig,
    pools: Arc<Mutex<HashMap<String, PgPool>>>,
}

impl Client {
    /// Create a client. No connection is made until the first read.
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            pools: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The pool for `database`, created on first use.
    pub async fn pool(&self, database: &str) -> PgReadResult<PgPool> {
        let mut pools = self.pools.lock().await;
        if let Some(pool) = pools.get(database) {
            return Ok(pool.clone());
        }

        let options: PgConnectOptions = self.config.connect_options(database)?;
        tracing::info!("Creating connection pool for database '{}'", database);
        let pool = PgPoolOptions::new()
            .max_connections(self.config.max_connections)
            .acquire_timeout(self.config.connect_timeout())
            .connect_lazy_with(options);
        pools.insert(database.to_string(), pool.clone());
        Ok(pool)
    }

    /// Begin a transaction on `database`.
    ///
    /// Dropping the returned transaction rolls it back.
    pub async fn begin(&self, database: &str) -> PgReadResult<Transaction<'static, Postgres>> {
        let pool = self.pool(database).await?;
        let mut txn = pool
            .begin()
            .await
            .map_err(|e| PgReadError::transaction(database, e))?;

        if self.config.read_only {
            (&mut *txn)
                .execute("SET TRANSACTION READ ONLY")
                .await
                .map_err(|e| PgReadError::transaction(database, e))?;
        }
        Ok(txn)
    }

    /// Run `sql` with positional `args` on `database` and materialize the result.
    pub async fn fetch(&self, database: &str, sql: &str, args: &[String]) -> PgReadResult<ResultSet> {
        tracing::debug!(database, sql, args = args.len(), "Executing query");
        let mut txn = self.begin(database).await?;

        let result = {
            let mut cursor = PgCursor::open(&mut txn, sql, args).await?;
            materialize(&mut cursor).await
        };

        release(txn).await;
        result
    }

    /// Close every pool.
    pub async fn close(&self) {
        let mut pools = self.pools.lock().await;
        for (_, pool) in pools.drain() {
            pool.close().await;
        }
    }
}

/// Roll back a read transaction. Failures are logged, never returned.
async fn release(txn: Transaction<'static, Postgres>) {
    if let Err(e) = txn.rollback().await {
        tracing::warn!("could not rollback transaction: {}", e);
    }
}

/// Live cursor over a statement executed on a borrowed connection.
pub struct PgCursor<'c> {
    columns: Vec<ColumnDescriptor>,
    stream: BoxStream<'c, Result<PgRow, sqlx::Error>>,
    current: Option<PgRow>,
}

impl<'c> PgCursor<'c> {
    /// Prepare `sql` to learn its columns and parameter types, then start executing it.
    ///
    /// Each argument is converted to the type the server inferred for its
    /// placeholder. Execution reuses the statement prepared here.
    pub async fn open(conn: &'c mut PgConnection, sql: &'c str, args: &'c [String]) -> PgReadResult<Self> {
        let statement = (&mut *conn).prepare(sql).await.map_err(PgReadError::execution)?;
        let columns = statement
            .columns()
            .iter()
            .map(|col| ColumnDescriptor::new(col.name(), col.type_info().name()))
            .collect();

        let parameters: &[PgTypeInfo] = match statement.parameters() {
            Some(Either::Left(types)) => types,
            _ => &[],
        };
        if parameters.len() != args.len() {
            return Err(PgReadError::argument(
                parameters.len().min(args.len()) + 1,
                format!("statement takes {} argument(s), got {}", parameters.len(), args.len()),
            ));
        }

        let mut query = sqlx::query(sql);
        for (position, (arg, type_info)) in args.iter().zip(parameters).enumerate() {
            let is_enum = matches!(type_info.kind(), PgTypeKind::Enum(_));
            let value = ArgValue::parse(arg, type_info.name(), is_enum)
                .map_err(|message| PgReadError::argument(position + 1, message))?;
            query = value.bind(query);
        }

        Ok(Self {
            columns,
            stream: query.fetch(conn),
            current: None,
        })
    }
}

#[async_trait]
impl<'c> ResultCursor for PgCursor<'c> {
    fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    fn column_type_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.type_name.clone()).collect()
    }

    async fn advance(&mut self) -> PgReadResult<bool> {
        self.current = self.stream.try_next().await.map_err(PgReadError::execution)?;
        Ok(self.current.is_some())
    }

    fn scan(&self) -> PgReadResult<Vec<CellValue>> {
        let row = self
            .current
            .as_ref()
            .ok_or_else(|| PgReadError::scan("*", "no current row"))?;
        (0..row.len())
            .map(|i| {
                row.try_get::<CellValue, _>(i)
                    .map_err(|e| PgReadError::scan(row.column(i).name(), e))
            })
            .collect()
    }
}

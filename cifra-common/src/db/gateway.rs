//! Data-access gateway
//!
//! Executes a named stored procedure with bound parameters and shapes the
//! result as the caller asks:
//! - [`ExpectedReturn::None`]: discard all rows
//! - [`ExpectedReturn::Single`]: first row of the first result set
//! - [`ExpectedReturn::Multi`]: every result set (or, through
//!   [`Gateway::request_named`], result sets keyed by caller-supplied names)
//!
//! Procedure failures are classified once, here: error number
//! [`BUSINESS_RULE_ERROR_NUMBER`] becomes [`DbError::BusinessRuleViolation`],
//! everything else is [`DbError::Unexpected`]. The gateway never retries and
//! never rolls back on its own; transactions are begun, committed and rolled
//! back explicitly by the caller.

use super::pool::LazyPool;
use super::procedures::{self, ParamMap, ProcedureError, Record, ResultSet};
use super::BUSINESS_RULE_ERROR_NUMBER;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::{Sqlite, SqliteConnection, SqlitePool};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Result shape requested from a procedure call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedReturn {
    None,
    Single,
    Multi,
}

/// Shaped procedure result
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    None,
    Single(Option<Record>),
    Multi(Vec<ResultSet>),
}

impl Outcome {
    /// Decode the single row, if any
    pub fn into_single<T: DeserializeOwned>(self) -> DbResult<Option<T>> {
        let record = match self {
            Outcome::None => None,
            Outcome::Single(record) => record,
            Outcome::Multi(sets) => sets.into_iter().next().and_then(|set| set.into_iter().next()),
        };
        record.map(decode).transpose()
    }

    /// Decode every row of the first result set (empty when there is none)
    pub fn into_first_set<T: DeserializeOwned>(self) -> DbResult<Vec<T>> {
        let set = match self {
            Outcome::None => Vec::new(),
            Outcome::Single(record) => record.into_iter().collect(),
            Outcome::Multi(sets) => sets.into_iter().next().unwrap_or_default(),
        };
        set.into_iter().map(decode).collect()
    }

    /// Raw result sets
    pub fn into_result_sets(self) -> Vec<ResultSet> {
        match self {
            Outcome::None => Vec::new(),
            Outcome::Single(record) => vec![record.into_iter().collect()],
            Outcome::Multi(sets) => sets,
        }
    }
}

fn decode<T: DeserializeOwned>(record: Record) -> DbResult<T> {
    Ok(serde_json::from_value(serde_json::Value::Object(record))?)
}

/// Errors surfaced by the gateway
#[derive(Debug, Error)]
pub enum DbError {
    /// The procedure rejected the request on business grounds
    #[error("{message}")]
    BusinessRuleViolation { message: String },

    /// Driver, connection or procedure failure with no meaning to the caller
    #[error("Unexpected database failure: {0}")]
    Unexpected(#[source] ProcedureError),

    /// The procedure returned no row where one was required
    #[error("Procedure '{procedure}' returned no row")]
    MissingRow { procedure: String },

    /// A result row did not match the typed record it was decoded into
    #[error("Unexpected result shape: {0}")]
    Decode(#[from] serde_json::Error),
}

impl From<ProcedureError> for DbError {
    fn from(err: ProcedureError) -> Self {
        match err {
            ProcedureError::Raised { number, message } if number == BUSINESS_RULE_ERROR_NUMBER => {
                DbError::BusinessRuleViolation { message }
            }
            other => DbError::Unexpected(other),
        }
    }
}

/// Result type for gateway operations
pub type DbResult<T> = std::result::Result<T, DbError>;

/// An explicit database transaction
pub struct DbTransaction {
    inner: sqlx::Transaction<'static, Sqlite>,
}

impl DbTransaction {
    pub fn new(inner: sqlx::Transaction<'static, Sqlite>) -> Self {
        Self { inner }
    }

    pub fn connection(&mut self) -> &mut SqliteConnection {
        &mut self.inner
    }

    pub async fn commit(self) -> Result<(), ProcedureError> {
        Ok(self.inner.commit().await?)
    }

    pub async fn rollback(self) -> Result<(), ProcedureError> {
        Ok(self.inner.rollback().await?)
    }
}

/// Runs procedures on behalf of the gateway
///
/// Implemented by [`SqliteExecutor`]; tests substitute their own executors.
#[async_trait]
pub trait ProcedureExecutor: Send + Sync {
    async fn execute(
        &self,
        procedure: &str,
        params: &ParamMap,
    ) -> Result<Vec<ResultSet>, ProcedureError>;

    async fn execute_in(
        &self,
        tx: &mut DbTransaction,
        procedure: &str,
        params: &ParamMap,
    ) -> Result<Vec<ResultSet>, ProcedureError> {
        let _ = (tx, procedure, params);
        Err(ProcedureError::TransactionsUnsupported)
    }

    async fn begin(&self) -> Result<DbTransaction, ProcedureError> {
        Err(ProcedureError::TransactionsUnsupported)
    }
}

/// Executor backed by the SQLite procedure catalog
pub struct SqliteExecutor {
    pool: Arc<LazyPool<SqlitePool>>,
}

impl SqliteExecutor {
    pub fn new(pool: Arc<LazyPool<SqlitePool>>) -> Self {
        Self { pool }
    }

    async fn pool(&self) -> Result<&SqlitePool, ProcedureError> {
        self.pool.get().await.map_err(ProcedureError::Connection)
    }
}

#[async_trait]
impl ProcedureExecutor for SqliteExecutor {
    async fn execute(
        &self,
        procedure: &str,
        params: &ParamMap,
    ) -> Result<Vec<ResultSet>, ProcedureError> {
        let mut conn = self.pool().await?.acquire().await?;
        procedures::call(&mut conn, procedure, params).await
    }

    async fn execute_in(
        &self,
        tx: &mut DbTransaction,
        procedure: &str,
        params: &ParamMap,
    ) -> Result<Vec<ResultSet>, ProcedureError> {
        procedures::call(tx.connection(), procedure, params).await
    }

    async fn begin(&self) -> Result<DbTransaction, ProcedureError> {
        let tx = self.pool().await?.begin().await?;
        Ok(DbTransaction::new(tx))
    }
}

/// Shape raw result sets according to `expected`
pub fn shape(sets: Vec<ResultSet>, expected: ExpectedReturn) -> Outcome {
    match expected {
        ExpectedReturn::None => Outcome::None,
        ExpectedReturn::Single => {
            Outcome::Single(sets.into_iter().next().and_then(|set| set.into_iter().next()))
        }
        ExpectedReturn::Multi => Outcome::Multi(sets),
    }
}

/// Key result sets by position: `names[i]` gets set `i`, or an empty set if
/// the procedure returned fewer sets
pub fn name_result_sets(sets: Vec<ResultSet>, names: &[&str]) -> BTreeMap<String, ResultSet> {
    let mut sets = sets.into_iter();
    names
        .iter()
        .map(|name| (name.to_string(), sets.next().unwrap_or_default()))
        .collect()
}

/// Entry point for every stored-procedure call
#[derive(Clone)]
pub struct Gateway {
    executor: Arc<dyn ProcedureExecutor>,
}

impl Gateway {
    pub fn new(executor: Arc<dyn ProcedureExecutor>) -> Self {
        Self { executor }
    }

    /// Gateway over the SQLite procedure catalog
    pub fn sqlite(pool: Arc<LazyPool<SqlitePool>>) -> Self {
        Self::new(Arc::new(SqliteExecutor::new(pool)))
    }

    /// Execute `procedure` with the fields of `params` bound by name
    pub async fn request<P: Serialize + ?Sized>(
        &self,
        procedure: &str,
        params: &P,
        expected: ExpectedReturn,
        tx: Option<&mut DbTransaction>,
    ) -> DbResult<Outcome> {
        let params = ParamMap::from_record(params)?;
        let sets = self.run(procedure, &params, tx).await?;
        Ok(shape(sets, expected))
    }

    /// Execute `procedure` and key its result sets by `names`
    pub async fn request_named<P: Serialize + ?Sized>(
        &self,
        procedure: &str,
        params: &P,
        names: &[&str],
        tx: Option<&mut DbTransaction>,
    ) -> DbResult<BTreeMap<String, ResultSet>> {
        let params = ParamMap::from_record(params)?;
        let sets = self.run(procedure, &params, tx).await?;
        Ok(name_result_sets(sets, names))
    }

    async fn run(
        &self,
        procedure: &str,
        params: &ParamMap,
        tx: Option<&mut DbTransaction>,
    ) -> DbResult<Vec<ResultSet>> {
        debug!(procedure, params = params.len(), in_transaction = tx.is_some(), "Executing procedure");
        let result = match tx {
            Some(tx) => self.executor.execute_in(tx, procedure, params).await,
            None => self.executor.execute(procedure, params).await,
        };
        result.map_err(|err| {
            debug!(procedure, error = %err, "Procedure failed");
            DbError::from(err)
        })
    }

    pub async fn begin(&self) -> DbResult<DbTransaction> {
        Ok(self.executor.begin().await?)
    }

    pub async fn commit(&self, tx: DbTransaction) -> DbResult<()> {
        Ok(tx.commit().await?)
    }

    pub async fn rollback(&self, tx: DbTransaction) -> DbResult<()> {
        Ok(tx.rollback().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: serde_json::Value) -> Record {
        match value {
            serde_json::Value::Object(map) => map,
            _ => panic!("record must be an object"),
        }
    }

    fn two_sets() -> Vec<ResultSet> {
        vec![
            vec![record(json!({ "id": 1 })), record(json!({ "id": 2 }))],
            vec![record(json!({ "total": 2 }))],
        ]
    }

    #[test]
    fn test_shape_none_discards_rows() {
        assert_eq!(shape(two_sets(), ExpectedReturn::None), Outcome::None);
    }

    #[test]
    fn test_shape_single_takes_first_row_of_first_set() {
        let outcome = shape(two_sets(), ExpectedReturn::Single);
        assert_eq!(outcome, Outcome::Single(Some(record(json!({ "id": 1 })))));
        assert_eq!(shape(Vec::new(), ExpectedReturn::Single), Outcome::Single(None));
        assert_eq!(shape(vec![Vec::new()], ExpectedReturn::Single), Outcome::Single(None));
    }

    #[test]
    fn test_shape_multi_keeps_all_sets() {
        let outcome = shape(two_sets(), ExpectedReturn::Multi);
        assert_eq!(outcome.into_result_sets().len(), 2);
    }

    #[test]
    fn test_named_sets_fall_back_to_empty() {
        let named = name_result_sets(two_sets(), &["songs", "totals", "extra"]);
        assert_eq!(named["songs"].len(), 2);
        assert_eq!(named["totals"][0]["total"], json!(2));
        assert!(named["extra"].is_empty());
    }

    #[test]
    fn test_outcome_decoding() {
        #[derive(serde::Deserialize, Debug, PartialEq)]
        struct Id {
            id: i64,
        }

        let ids: Vec<Id> = shape(two_sets(), ExpectedReturn::Multi).into_first_set().unwrap();
        assert_eq!(ids, vec![Id { id: 1 }, Id { id: 2 }]);

        let one: Option<Id> = shape(two_sets(), ExpectedReturn::Single).into_single().unwrap();
        assert_eq!(one, Some(Id { id: 1 }));

        let bad = Outcome::Single(Some(record(json!({ "id": "x" })))).into_single::<Id>();
        assert!(matches!(bad, Err(DbError::Decode(_))));
    }

    #[test]
    fn test_error_classification() {
        let business = DbError::from(ProcedureError::business_rule("SongDoesntExist"));
        assert!(
            matches!(business, DbError::BusinessRuleViolation { ref message } if message == "SongDoesntExist")
        );

        let other_number = DbError::from(ProcedureError::Raised {
            number: 50001,
            message: "deadlock".to_string(),
        });
        assert!(matches!(other_number, DbError::Unexpected(_)));

        let unknown = DbError::from(ProcedureError::UnknownProcedure("spNope".to_string()));
        assert!(matches!(unknown, DbError::Unexpected(_)));
    }
}

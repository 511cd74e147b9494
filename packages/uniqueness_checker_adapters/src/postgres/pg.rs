use ahash::AHashMap;
use async_trait::async_trait;
use deadpool_postgres::{Config, ManagerConfig, Object, Pool, PoolConfig, RecyclingMethod, Runtime, Transaction};
use serde_json::Value;
use time::OffsetDateTime;
use tokio_postgres::{IsolationLevel, NoTls};
use tracing::{debug, info, warn};
use uniqueness_checker::{
    model::{HoldingIdentity, SecureHash, StateDetails, StateRef, TransactionDetails, UniquenessCheckError, UniquenessCheckResult},
    ports::{
        common::SharedPortTraits,
        errors::{BackingStoreError, BackingStoreErrorKind, StorageErrorCategory},
        BackingStore, BackingStoreSession, BackingStoreTransaction, TransactionOutcome,
    },
};

use crate::{PgConfig, PgError};

use super::utils::{lookup_state_ref_columns, parse_hash_column, parse_index_column, parse_json_column, state_ref_columns, RESULT_TYPE_ACCEPTED, RESULT_TYPE_REJECTED};

const SELECT_TRANSACTION_DETAILS: &str = "SELECT t.tx_id, t.originator_x500_name, t.expiry_datetime, t.commit_timestamp, t.result_type, r.error_details
    FROM uniqueness_tx_details t
    LEFT JOIN uniqueness_rejected_txs r ON r.holding_identity = t.holding_identity AND r.tx_id = t.tx_id
    WHERE t.holding_identity = $1 AND t.tx_id = ANY($2)";

const SELECT_STATE_DETAILS: &str = "SELECT s.issue_tx_id, s.issue_tx_output_idx, s.consuming_tx_id
    FROM uniqueness_state_details s
    JOIN UNNEST($2::text[], $3::int4[]) AS r(tx_id, idx) ON s.issue_tx_id = r.tx_id AND s.issue_tx_output_idx = r.idx
    WHERE s.holding_identity = $1";

const INSERT_UNCONSUMED_STATES: &str = "INSERT INTO uniqueness_state_details (holding_identity, issue_tx_id, issue_tx_output_idx, consuming_tx_id)
    SELECT $1, r.tx_id, r.idx, NULL FROM UNNEST($2::text[], $3::int4[]) AS r(tx_id, idx)";

const CONSUME_STATE: &str = "UPDATE uniqueness_state_details SET consuming_tx_id = $1
    WHERE holding_identity = $2 AND issue_tx_id = $3 AND issue_tx_output_idx = $4 AND consuming_tx_id IS NULL";

const INSERT_TRANSACTION_DETAILS: &str =
    "INSERT INTO uniqueness_tx_details (holding_identity, tx_id, originator_x500_name, expiry_datetime, commit_timestamp, result_type)
    VALUES ($1, $2, $3, $4, $5, $6)";

const INSERT_REJECTED_TRANSACTION: &str = "INSERT INTO uniqueness_rejected_txs (holding_identity, tx_id, error_details) VALUES ($1, $2, $3)";

/// Partition key as stored in every table.
fn holding_identity_key(holding_identity: &HoldingIdentity) -> String {
    holding_identity.to_string()
}

#[derive(Clone)]
pub struct PgBackingStore {
    pub pool: Pool,
}

// create postgres client
impl PgBackingStore {
    pub async fn new(pg_config: PgConfig) -> Result<Self, PgError> {
        let port = pg_config.port.parse::<u16>().map_err(|_| PgError::InvalidPort(pg_config.port.clone()))?;
        info!("Connecting to {}", pg_config.get_public_connection_string());

        let mut config = Config::new();
        config.dbname = Some(pg_config.database);
        config.user = Some(pg_config.user);
        config.password = Some(pg_config.password);
        config.host = Some(pg_config.host);
        config.port = Some(port);
        config.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        if let Some(pool_max_size) = pg_config.pool_size {
            let pool_config = PoolConfig {
                max_size: pool_max_size as usize,
                ..PoolConfig::default()
            };

            config.pool = Some(pool_config);
        }

        let pool = config.create_pool(Some(Runtime::Tokio1), NoTls).map_err(PgError::CreatePool)?;

        //test connection
        let _ = pool.get().await.map_err(PgError::GetClientFromPool)?;

        Ok(PgBackingStore { pool })
    }

    pub async fn get_client(&self) -> Result<Object, PgError> {
        let client = self.pool.get().await.map_err(PgError::GetClientFromPool)?;

        Ok(client)
    }
}

#[async_trait]
impl BackingStore for PgBackingStore {
    async fn session(&self, holding_identity: &HoldingIdentity) -> Result<Box<dyn BackingStoreSession>, BackingStoreError> {
        let client = self
            .get_client()
            .await
            .map_err(|e| e.into_backing_store_error(BackingStoreErrorKind::Session))?;

        Ok(Box::new(PgSession {
            pool: self.pool.clone(),
            client,
            holding_identity: holding_identity.clone(),
        }))
    }
}

#[async_trait]
impl SharedPortTraits for PgBackingStore {
    async fn is_healthy(&self) -> bool {
        match self.get_client().await {
            Ok(client) => client.simple_query("SELECT 1").await.is_ok(),
            Err(e) => {
                warn!("Health check could not borrow a client: {e}");
                false
            }
        }
    }

    async fn shutdown(&self) -> bool {
        self.pool.close();

        self.pool.is_closed()
    }
}

/// One pooled client, scoped to a holding identity.
pub struct PgSession {
    pool: Pool,
    client: Object,
    holding_identity: HoldingIdentity,
}

#[async_trait]
impl BackingStoreSession for PgSession {
    fn holding_identity(&self) -> &HoldingIdentity {
        &self.holding_identity
    }

    async fn begin<'a>(&'a mut self) -> Result<Box<dyn BackingStoreTransaction + 'a>, BackingStoreError> {
        if self.client.is_closed() {
            debug!("Pooled client for {} is closed, borrowing a new one", self.holding_identity);
            self.client = self
                .pool
                .get()
                .await
                .map_err(|e| PgError::GetClientFromPool(e).into_backing_store_error(BackingStoreErrorKind::Begin))?;
        }

        let transaction = self
            .client
            .build_transaction()
            .isolation_level(IsolationLevel::ReadCommitted)
            .start()
            .await
            .map_err(|e| PgError::Query(e, "starting transaction".to_owned()).into_backing_store_error(BackingStoreErrorKind::Begin))?;

        Ok(Box::new(PgTransaction {
            transaction: Some(transaction),
            holding_identity: holding_identity_key(&self.holding_identity),
        }))
    }
}

pub struct PgTransaction<'a> {
    /// `None` once committed or rolled back.
    transaction: Option<Transaction<'a>>,
    holding_identity: String,
}

impl<'a> PgTransaction<'a> {
    fn active(&self, kind: BackingStoreErrorKind) -> Result<&Transaction<'a>, BackingStoreError> {
        self.transaction
            .as_ref()
            .ok_or_else(|| BackingStoreError::new(kind, StorageErrorCategory::Fatal, "transaction is no longer active"))
    }

    fn take(&mut self, kind: BackingStoreErrorKind) -> Result<Transaction<'a>, BackingStoreError> {
        self.transaction
            .take()
            .ok_or_else(|| BackingStoreError::new(kind, StorageErrorCategory::Fatal, "transaction is no longer active"))
    }
}

fn query_error(kind: BackingStoreErrorKind, context: &'static str) -> impl FnOnce(tokio_postgres::Error) -> BackingStoreError {
    move |e| PgError::query(context)(e).into_backing_store_error(kind)
}

#[async_trait]
impl BackingStoreTransaction for PgTransaction<'_> {
    async fn get_transaction_details(&mut self, transaction_ids: &[SecureHash]) -> Result<AHashMap<SecureHash, TransactionDetails>, BackingStoreError> {
        let kind = BackingStoreErrorKind::GetTransactionDetails;
        let transaction = self.active(kind)?;
        let ids: Vec<String> = transaction_ids.iter().map(SecureHash::to_string).collect();

        let stmt = transaction
            .prepare_cached(SELECT_TRANSACTION_DETAILS)
            .await
            .map_err(query_error(kind, "preparing transaction details query"))?;
        let rows = transaction
            .query(&stmt, &[&self.holding_identity, &ids])
            .await
            .map_err(query_error(kind, "reading transaction details"))?;

        let mut found = AHashMap::with_capacity(rows.len());
        for row in rows {
            let tx_id: String = row.get("tx_id");
            let originator_x500_name: String = row.get("originator_x500_name");
            let expiry: Option<OffsetDateTime> = row.get("expiry_datetime");
            let commit_timestamp: OffsetDateTime = row.get("commit_timestamp");
            let result_type: String = row.get("result_type");
            let error_details: Option<Value> = row.get("error_details");

            let transaction_id = parse_hash_column(&tx_id)?;
            let result = match (result_type.as_str(), error_details) {
                (RESULT_TYPE_ACCEPTED, _) => UniquenessCheckResult::success(commit_timestamp),
                (RESULT_TYPE_REJECTED, Some(value)) => {
                    UniquenessCheckResult::failure(commit_timestamp, parse_json_column::<UniquenessCheckError>(&tx_id, value)?)
                }
                (RESULT_TYPE_REJECTED, None) => return Err(BackingStoreError::missing_rejection_details(&tx_id)),
                (other, _) => {
                    return Err(
                        BackingStoreError::new(BackingStoreErrorKind::ParseError, StorageErrorCategory::Uncategorized, format!("Unknown result type {other}"))
                            .with_data(tx_id),
                    )
                }
            };

            found.insert(
                transaction_id.clone(),
                TransactionDetails {
                    transaction_id,
                    originator_x500_name,
                    expiry,
                    result,
                },
            );
        }

        Ok(found)
    }

    async fn get_state_details(&mut self, state_refs: &[StateRef]) -> Result<AHashMap<StateRef, StateDetails>, BackingStoreError> {
        let kind = BackingStoreErrorKind::GetStateDetails;
        let transaction = self.active(kind)?;
        let (tx_ids, indices) = lookup_state_ref_columns(state_refs);

        let stmt = transaction
            .prepare_cached(SELECT_STATE_DETAILS)
            .await
            .map_err(query_error(kind, "preparing state details query"))?;
        let rows = transaction
            .query(&stmt, &[&self.holding_identity, &tx_ids, &indices])
            .await
            .map_err(query_error(kind, "reading state details"))?;

        let mut found = AHashMap::with_capacity(rows.len());
        for row in rows {
            let issue_tx_id: String = row.get("issue_tx_id");
            let issue_tx_output_idx: i32 = row.get("issue_tx_output_idx");
            let consuming_tx_id: Option<String> = row.get("consuming_tx_id");

            let state_ref = StateRef::new(parse_hash_column(&issue_tx_id)?, parse_index_column(&issue_tx_id, issue_tx_output_idx)?);
            let consuming_transaction_id = consuming_tx_id.as_deref().map(parse_hash_column).transpose()?;

            found.insert(
                state_ref.clone(),
                StateDetails {
                    state_ref,
                    consuming_transaction_id,
                },
            );
        }

        Ok(found)
    }

    async fn create_unconsumed_states(&mut self, state_refs: &[StateRef]) -> Result<(), BackingStoreError> {
        let kind = BackingStoreErrorKind::CreateStates;
        let transaction = self.active(kind)?;
        let (tx_ids, indices) = state_ref_columns(state_refs)?;

        let stmt = transaction
            .prepare_cached(INSERT_UNCONSUMED_STATES)
            .await
            .map_err(query_error(kind, "preparing state insert"))?;
        transaction
            .execute(&stmt, &[&self.holding_identity, &tx_ids, &indices])
            .await
            .map_err(query_error(kind, "inserting unconsumed states"))?;

        Ok(())
    }

    async fn consume_states(&mut self, consuming_transaction_id: &SecureHash, state_refs: &[StateRef]) -> Result<(), BackingStoreError> {
        let kind = BackingStoreErrorKind::ConsumeStates;
        let transaction = self.active(kind)?;
        let (tx_ids, indices) = state_ref_columns(state_refs)?;
        let consumer = consuming_transaction_id.to_string();

        let stmt = transaction
            .prepare_cached(CONSUME_STATE)
            .await
            .map_err(query_error(kind, "preparing state consume"))?;

        for (position, (tx_id, index)) in tx_ids.iter().zip(&indices).enumerate() {
            let updated = transaction
                .execute(&stmt, &[&consumer, &self.holding_identity, tx_id, index])
                .await
                .map_err(query_error(kind, "consuming state"))?;

            if updated == 0 {
                return Err(BackingStoreError::in_flight_conflict(&consumer, &state_refs[position]));
            }
        }

        Ok(())
    }

    async fn commit_transactions<'o>(&mut self, outcomes: &[TransactionOutcome<'o>]) -> Result<(), BackingStoreError> {
        let kind = BackingStoreErrorKind::CommitTransactions;
        let transaction = self.active(kind)?;

        let insert_details = transaction
            .prepare_cached(INSERT_TRANSACTION_DETAILS)
            .await
            .map_err(query_error(kind, "preparing transaction details insert"))?;
        let insert_rejected = transaction
            .prepare_cached(INSERT_REJECTED_TRANSACTION)
            .await
            .map_err(query_error(kind, "preparing rejected transaction insert"))?;

        for (request, result) in outcomes {
            let tx_id = request.transaction_id.to_string();
            let result_type = if result.is_success() { RESULT_TYPE_ACCEPTED } else { RESULT_TYPE_REJECTED };

            transaction
                .execute(
                    &insert_details,
                    &[
                        &self.holding_identity,
                        &tx_id,
                        &request.originator_x500_name,
                        &request.time_window_upper_bound,
                        &result.commit_timestamp(),
                        &result_type,
                    ],
                )
                .await
                .map_err(query_error(kind, "inserting transaction details"))?;

            if let Some(error) = result.error() {
                let error_details = serde_json::to_value(error).map_err(|e| {
                    BackingStoreError::new(BackingStoreErrorKind::ParseError, StorageErrorCategory::Uncategorized, e.to_string()).with_data(tx_id.clone())
                })?;
                transaction
                    .execute(&insert_rejected, &[&self.holding_identity, &tx_id, &error_details])
                    .await
                    .map_err(query_error(kind, "inserting rejection details"))?;
            }
        }

        Ok(())
    }

    fn is_active(&self) -> bool {
        self.transaction.is_some()
    }

    async fn commit(&mut self) -> Result<(), BackingStoreError> {
        let kind = BackingStoreErrorKind::Commit;
        self.take(kind)?.commit().await.map_err(query_error(kind, "committing"))
    }

    async fn rollback(&mut self) -> Result<(), BackingStoreError> {
        let kind = BackingStoreErrorKind::Rollback;
        self.take(kind)?.rollback().await.map_err(query_error(kind, "rolling back"))
    }
}

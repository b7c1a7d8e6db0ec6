//! Balance and usage-history handlers.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use metering_core::{Account, AccountId};
use metering_store::Store;

use crate::auth::AuthAccount;
use crate::error::ApiError;
use crate::state::AppState;

/// Balance response.
#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    /// Credits left this period.
    pub remaining: i64,
    /// Full allotment for the plan.
    pub total: i64,
    /// Plan name.
    pub plan: String,
    /// Subscription status.
    pub subscription_status: String,
}

/// Load an account, lazily creating the free-tier row on first contact.
///
/// A valid identity without a ledger row is not an error: the identity
/// webhook may not have landed yet, or was never delivered.
pub(crate) fn load_or_create_account(
    state: &AppState,
    account_id: &AccountId,
) -> Result<Account, ApiError> {
    if let Some(account) = state.store.get_account(account_id)? {
        return Ok(account);
    }

    let account = Account::new(account_id.clone());
    if state.store.create_account_if_absent(&account)? {
        tracing::info!(account_id = %account_id, "lazily created free-tier account");
        return Ok(account);
    }

    // Lost the race to a concurrent creator; read theirs.
    state
        .store
        .get_account(account_id)?
        .ok_or_else(|| ApiError::Internal("account vanished after creation".into()))
}

/// `GET /v1/credits/balance`
pub async fn get_balance(
    State(state): State<Arc<AppState>>,
    auth: AuthAccount,
) -> Result<Json<BalanceResponse>, ApiError> {
    let account = load_or_create_account(&state, &auth.account_id)?;

    Ok(Json(BalanceResponse {
        remaining: account.credits_remaining,
        total: account.credits_total,
        plan: account.plan.as_str().to_string(),
        subscription_status: account.subscription_status.as_str().to_string(),
    }))
}

/// Usage-history query parameters.
#[derive(Debug, Deserialize)]
pub struct UsageQuery {
    /// Maximum records to return (default 50, capped at 200).
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Records to skip.
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    50
}

/// One usage-history entry.
#[derive(Debug, Serialize)]
pub struct UsageEntry {
    /// Record id.
    pub id: String,
    /// Operation kind.
    pub operation_kind: String,
    /// Credits charged.
    pub cost_credits: i64,
    /// "committed" or "refunded".
    pub outcome: String,
    /// When the attempt started.
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Usage-history response.
#[derive(Debug, Serialize)]
pub struct UsageHistoryResponse {
    /// Records, newest first.
    pub records: Vec<UsageEntry>,
}

/// `GET /v1/usage`
pub async fn list_usage(
    State(state): State<Arc<AppState>>,
    auth: AuthAccount,
    Query(query): Query<UsageQuery>,
) -> Result<Json<UsageHistoryResponse>, ApiError> {
    let limit = query.limit.min(200);
    let records = state
        .store
        .list_usage(&auth.account_id, limit, query.offset)?;

    let records = records
        .into_iter()
        .map(|r| UsageEntry {
            id: r.id.to_string(),
            operation_kind: r.operation_kind.as_str().to_string(),
            cost_credits: r.cost_credits,
            outcome: match r.outcome {
                metering_core::UsageOutcome::Committed => "committed".to_string(),
                metering_core::UsageOutcome::Refunded => "refunded".to_string(),
            },
            created_at: r.created_at,
        })
        .collect();

    Ok(Json(UsageHistoryResponse { records }))
}

use std::sync::Arc;

use async_trait::async_trait;
use diesel::prelude::*;

use margin_accounts_core::errors::Result;
use margin_accounts_core::ledger::{AccountBalanceChange, BalanceChangeFilter, LedgerRepositoryTrait};

use super::model::{AccountBalanceChangeDB, NewAccountBalanceChangeDB};
use crate::db::{get_connection, DbPool, WriteHandle};
use crate::errors::IntoCore;
use crate::schema::account_balance_changes;
use crate::schema::account_balance_changes::dsl;
use crate::utils::format_timestamp;

/// Ledger rows in `account_balance_changes`, ordered by timestamp then insertion.
pub struct LedgerRepository {
    pool: Arc<DbPool>,
    writer: WriteHandle,
}

impl LedgerRepository {
    pub fn new(pool: Arc<DbPool>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }

    fn load(
        &self,
        query: account_balance_changes::BoxedQuery<'_, diesel::sqlite::Sqlite>,
    ) -> Result<Vec<AccountBalanceChange>> {
        let mut conn = get_connection(&self.pool)?;
        let rows = query
            .select(AccountBalanceChangeDB::as_select())
            .order((dsl::change_timestamp.asc(), dsl::seq.asc()))
            .load::<AccountBalanceChangeDB>(&mut conn)
            .into_core()?;
        rows.into_iter()
            .map(|r| AccountBalanceChange::try_from(r).map_err(Into::into))
            .collect()
    }
}

#[async_trait]
impl LedgerRepositoryTrait for LedgerRepository {
    async fn append(&self, change: AccountBalanceChange) -> Result<()> {
        let row = NewAccountBalanceChangeDB::from(&change);
        self.writer
            .exec(move |conn| {
                diesel::insert_into(account_balance_changes::table)
                    .values(&row)
                    .on_conflict(dsl::id)
                    .do_update()
                    .set(&row)
                    .execute(conn)
                    .into_core()?;
                Ok(())
            })
            .await
    }

    fn get(&self, change_id: &str) -> Result<Option<AccountBalanceChange>> {
        let mut conn = get_connection(&self.pool)?;
        let row = dsl::account_balance_changes
            .select(AccountBalanceChangeDB::as_select())
            .filter(dsl::id.eq(change_id))
            .first::<AccountBalanceChangeDB>(&mut conn)
            .optional()
            .into_core()?;
        row.map(|r| AccountBalanceChange::try_from(r).map_err(Into::into))
            .transpose()
    }

    fn latest(&self, account: &str) -> Result<Option<AccountBalanceChange>> {
        let mut conn = get_connection(&self.pool)?;
        let row = dsl::account_balance_changes
            .select(AccountBalanceChangeDB::as_select())
            .filter(dsl::account_id.eq(account))
            .order((dsl::change_timestamp.desc(), dsl::seq.desc()))
            .first::<AccountBalanceChangeDB>(&mut conn)
            .optional()
            .into_core()?;
        row.map(|r| AccountBalanceChange::try_from(r).map_err(Into::into))
            .transpose()
    }

    fn query(&self, filter: &BalanceChangeFilter) -> Result<Vec<AccountBalanceChange>> {
        let mut query = account_balance_changes::table.into_boxed();

        if let Some(account) = &filter.account_id {
            query = query.filter(dsl::account_id.eq(account.clone()));
        }
        if let Some(since) = filter.since {
            query = query.filter(dsl::change_timestamp.ge(format_timestamp(since)));
        }
        if let Some(until) = filter.until {
            query = query.filter(dsl::change_timestamp.lt(format_timestamp(until)));
        }
        if let Some(reason) = filter.reason_type {
            query = query.filter(dsl::reason_type.eq(reason.as_str()));
        }

        self.load(query)
    }

    fn query_by_event_source(
        &self,
        account: &str,
        event_source: Option<&str>,
    ) -> Result<Vec<AccountBalanceChange>> {
        let mut query = account_balance_changes::table
            .into_boxed()
            .filter(dsl::account_id.eq(account.to_string()));

        query = match event_source {
            Some(source) => query.filter(dsl::event_source_id.eq(source.to_string())),
            None => query.filter(dsl::event_source_id.is_null()),
        };

        self.load(query)
    }
}

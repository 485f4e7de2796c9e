use crate::error::{map_diesel_error, ConversionError, IntoDomainModel, IntoDomainModels};
use crate::schema::accounts;
use chrono::{DateTime, NaiveDateTime, Utc};
use diesel::prelude::*;
use model::database::{AccountRepository, TxError};
use model::{Account, AccountId, AccountMode};
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

/// Diesel-backed `Account` repository (spec §3, §4.8).
pub struct AccountDB {
    pub(crate) connection: Arc<Mutex<SqliteConnection>>,
}

impl AccountDB {
    pub fn new(connection: Arc<Mutex<SqliteConnection>>) -> Self {
        AccountDB { connection }
    }
}

#[derive(Queryable, Identifiable, AsChangeset, Insertable)]
#[diesel(table_name = accounts)]
#[diesel(treat_none_as_null = true)]
struct AccountRow {
    id: i64,
    balance: String,
    cash: String,
    currency: String,
    mode: String,
    balance_refreshed_at: NaiveDateTime,
    created_at: NaiveDateTime,
}

impl TryFrom<AccountRow> for Account {
    type Error = ConversionError;

    fn try_from(row: AccountRow) -> Result<Self, Self::Error> {
        Ok(Account {
            id: AccountId(row.id),
            balance: Decimal::from_str(&row.balance)
                .map_err(|_| ConversionError::new("balance", "invalid decimal"))?,
            cash: Decimal::from_str(&row.cash)
                .map_err(|_| ConversionError::new("cash", "invalid decimal"))?,
            currency: row.currency,
            mode: parse_mode(&row.mode)?,
            balance_refreshed_at: DateTime::from_naive_utc_and_offset(row.balance_refreshed_at, Utc),
            created_at: DateTime::from_naive_utc_and_offset(row.created_at, Utc),
        })
    }
}

impl IntoDomainModel<Account> for AccountRow {
    fn into_domain_model(self) -> Result<Account, TxError> {
        Account::try_from(self).map_err(TxError::from)
    }
}

fn parse_mode(s: &str) -> Result<AccountMode, ConversionError> {
    match s {
        "cash" => Ok(AccountMode::Cash),
        "margin" => Ok(AccountMode::Margin),
        other => Err(ConversionError::new("mode", format!("unknown account mode '{other}'"))),
    }
}

fn mode_str(mode: AccountMode) -> &'static str {
    match mode {
        AccountMode::Cash => "cash",
        AccountMode::Margin => "margin",
    }
}

#[derive(Insertable)]
#[diesel(table_name = accounts)]
struct NewAccountRow {
    balance: String,
    cash: String,
    currency: String,
    mode: String,
    balance_refreshed_at: NaiveDateTime,
    created_at: NaiveDateTime,
}

impl From<&Account> for NewAccountRow {
    fn from(account: &Account) -> Self {
        NewAccountRow {
            balance: account.balance.to_string(),
            cash: account.cash.to_string(),
            currency: account.currency.clone(),
            mode: mode_str(account.mode).to_string(),
            balance_refreshed_at: account.balance_refreshed_at.naive_utc(),
            created_at: account.created_at.naive_utc(),
        }
    }
}

impl AccountRepository for AccountDB {
    fn get(&mut self, id: AccountId) -> Result<Account, TxError> {
        let conn = &mut self.connection.lock().map_err(|e| TxError::Db(e.to_string()))?;
        accounts::table
            .find(id.0)
            .first::<AccountRow>(conn)
            .map_err(map_diesel_error)?
            .into_domain_model()
    }

    fn list(&mut self) -> Result<Vec<Account>, TxError> {
        let conn = &mut self.connection.lock().map_err(|e| TxError::Db(e.to_string()))?;
        accounts::table
            .load::<AccountRow>(conn)
            .map_err(map_diesel_error)?
            .into_domain_models()
    }

    fn insert(&mut self, account: &Account) -> Result<Account, TxError> {
        let conn = &mut self.connection.lock().map_err(|e| TxError::Db(e.to_string()))?;
        diesel::insert_into(accounts::table)
            .values(NewAccountRow::from(account))
            .get_result::<AccountRow>(conn)
            .map_err(map_diesel_error)?
            .into_domain_model()
    }

    fn update(&mut self, account: &Account) -> Result<(), TxError> {
        let conn = &mut self.connection.lock().map_err(|e| TxError::Db(e.to_string()))?;
        diesel::update(accounts::table.find(account.id.0))
            .set((
                accounts::balance.eq(account.balance.to_string()),
                accounts::cash.eq(account.cash.to_string()),
                accounts::mode.eq(mode_str(account.mode)),
                accounts::balance_refreshed_at.eq(account.balance_refreshed_at.naive_utc()),
            ))
            .execute(conn)
            .map_err(map_diesel_error)?;
        Ok(())
    }
}

use crate::error::{map_diesel_error, ConversionError, IntoDomainModel, IntoDomainModels};
use crate::schema::settlement_rows;
use chrono::NaiveDate;
use diesel::prelude::*;
use model::database::{SettlementRepository, TxError};
use model::{AccountId, SettlementRow, SettlementRowId, TradeId};
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

/// Diesel-backed `SettlementRow` repository (spec §3, §4.4 gate 3).
pub struct SettlementDB {
    pub(crate) connection: Arc<Mutex<SqliteConnection>>,
}

impl SettlementDB {
    pub fn new(connection: Arc<Mutex<SqliteConnection>>) -> Self {
        SettlementDB { connection }
    }
}

#[derive(Queryable, Identifiable, AsChangeset, Insertable)]
#[diesel(table_name = settlement_rows)]
struct SettlementRowRecord {
    id: i64,
    account_id: i64,
    trade_id: i64,
    amount: String,
    settlement_date: NaiveDate,
    settled: bool,
}

impl TryFrom<SettlementRowRecord> for SettlementRow {
    type Error = ConversionError;

    fn try_from(row: SettlementRowRecord) -> Result<Self, Self::Error> {
        Ok(SettlementRow {
            id: SettlementRowId(row.id),
            account_id: AccountId(row.account_id),
            trade_id: TradeId(row.trade_id),
            amount: Decimal::from_str(&row.amount).map_err(|_| ConversionError::new("amount", "invalid decimal"))?,
            settlement_date: row.settlement_date,
            settled: row.settled,
        })
    }
}

impl IntoDomainModel<SettlementRow> for SettlementRowRecord {
    fn into_domain_model(self) -> Result<SettlementRow, TxError> {
        SettlementRow::try_from(self).map_err(TxError::from)
    }
}

#[derive(Insertable)]
#[diesel(table_name = settlement_rows)]
struct NewSettlementRow {
    account_id: i64,
    trade_id: i64,
    amount: String,
    settlement_date: NaiveDate,
    settled: bool,
}

impl From<&SettlementRow> for NewSettlementRow {
    fn from(row: &SettlementRow) -> Self {
        NewSettlementRow {
            account_id: row.account_id.0,
            trade_id: row.trade_id.0,
            amount: row.amount.to_string(),
            settlement_date: row.settlement_date,
            settled: row.settled,
        }
    }
}

impl SettlementRepository for SettlementDB {
    fn insert(&mut self, row: &SettlementRow) -> Result<SettlementRow, TxError> {
        let conn = &mut self.connection.lock().map_err(|e| TxError::Db(e.to_string()))?;
        diesel::insert_into(settlement_rows::table)
            .values(NewSettlementRow::from(row))
            .get_result::<SettlementRowRecord>(conn)
            .map_err(map_diesel_error)?
            .into_domain_model()
    }

    fn list_unsettled(&mut self, account_id: AccountId, as_of: NaiveDate) -> Result<Vec<SettlementRow>, TxError> {
        let conn = &mut self.connection.lock().map_err(|e| TxError::Db(e.to_string()))?;
        settlement_rows::table
            .filter(settlement_rows::account_id.eq(account_id.0))
            .filter(settlement_rows::settlement_date.gt(as_of))
            .filter(settlement_rows::settled.eq(false))
            .load::<SettlementRowRecord>(conn)
            .map_err(map_diesel_error)?
            .into_domain_models()
    }

    fn sum_unsettled_absolute(&mut self, account_id: AccountId, as_of: NaiveDate) -> Result<Decimal, TxError> {
        let rows = self.list_unsettled(account_id, as_of)?;
        Ok(rows.iter().fold(Decimal::ZERO, |acc, row| acc + row.amount.abs()))
    }

    fn settle_due(&mut self, account_id: AccountId, as_of: NaiveDate) -> Result<u32, TxError> {
        let conn = &mut self.connection.lock().map_err(|e| TxError::Db(e.to_string()))?;
        let updated = diesel::update(
            settlement_rows::table
                .filter(settlement_rows::account_id.eq(account_id.0))
                .filter(settlement_rows::settlement_date.le(as_of))
                .filter(settlement_rows::settled.eq(false)),
        )
        .set(settlement_rows::settled.eq(true))
        .execute(conn)
        .map_err(map_diesel_error)?;
        Ok(u32::try_from(updated).unwrap_or(u32::MAX))
    }

    fn get(&mut self, id: SettlementRowId) -> Result<SettlementRow, TxError> {
        let conn = &mut self.connection.lock().map_err(|e| TxError::Db(e.to_string()))?;
        settlement_rows::table
            .find(id.0)
            .first::<SettlementRowRecord>(conn)
            .map_err(map_diesel_error)?
            .into_domain_model()
    }
}

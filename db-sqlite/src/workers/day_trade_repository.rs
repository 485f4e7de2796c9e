use crate::error::{map_diesel_error, IntoDomainModel, IntoDomainModels};
use crate::schema::day_trades;
use chrono::NaiveDate;
use diesel::dsl::count_star;
use diesel::prelude::*;
use model::database::{DayTradeRepository, TxError};
use model::{AccountId, DayTrade, DayTradeId, TradeId};
use std::sync::{Arc, Mutex};

/// Diesel-backed `DayTrade` repository (spec §3, §4.4 gate 2 / PDT).
pub struct DayTradeDB {
    pub(crate) connection: Arc<Mutex<SqliteConnection>>,
}

impl DayTradeDB {
    pub fn new(connection: Arc<Mutex<SqliteConnection>>) -> Self {
        DayTradeDB { connection }
    }
}

#[derive(Queryable, Identifiable, Insertable)]
#[diesel(table_name = day_trades)]
struct DayTradeRow {
    id: i64,
    account_id: i64,
    symbol: String,
    opened_trade_id: i64,
    closed_trade_id: i64,
    executed_date: NaiveDate,
}

impl From<DayTradeRow> for DayTrade {
    fn from(row: DayTradeRow) -> Self {
        DayTrade {
            id: DayTradeId(row.id),
            account_id: AccountId(row.account_id),
            symbol: row.symbol,
            opened_trade_id: TradeId(row.opened_trade_id),
            closed_trade_id: TradeId(row.closed_trade_id),
            executed_date: row.executed_date,
        }
    }
}

impl IntoDomainModel<DayTrade> for DayTradeRow {
    fn into_domain_model(self) -> Result<DayTrade, TxError> {
        Ok(DayTrade::from(self))
    }
}

#[derive(Insertable)]
#[diesel(table_name = day_trades)]
struct NewDayTradeRow {
    account_id: i64,
    symbol: String,
    opened_trade_id: i64,
    closed_trade_id: i64,
    executed_date: NaiveDate,
}

impl From<&DayTrade> for NewDayTradeRow {
    fn from(day_trade: &DayTrade) -> Self {
        NewDayTradeRow {
            account_id: day_trade.account_id.0,
            symbol: day_trade.symbol.clone(),
            opened_trade_id: day_trade.opened_trade_id.0,
            closed_trade_id: day_trade.closed_trade_id.0,
            executed_date: day_trade.executed_date,
        }
    }
}

impl DayTradeRepository for DayTradeDB {
    fn insert(&mut self, day_trade: &DayTrade) -> Result<DayTrade, TxError> {
        let conn = &mut self.connection.lock().map_err(|e| TxError::Db(e.to_string()))?;
        diesel::insert_into(day_trades::table)
            .values(NewDayTradeRow::from(day_trade))
            .get_result::<DayTradeRow>(conn)
            .map_err(map_diesel_error)?
            .into_domain_model()
    }

    fn count_in_window(&mut self, account_id: AccountId, start: NaiveDate, end: NaiveDate) -> Result<u32, TxError> {
        let conn = &mut self.connection.lock().map_err(|e| TxError::Db(e.to_string()))?;
        let count: i64 = day_trades::table
            .filter(day_trades::account_id.eq(account_id.0))
            .filter(day_trades::executed_date.ge(start))
            .filter(day_trades::executed_date.le(end))
            .select(count_star())
            .first(conn)
            .map_err(map_diesel_error)?;
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    fn list_in_window(&mut self, account_id: AccountId, start: NaiveDate, end: NaiveDate) -> Result<Vec<DayTrade>, TxError> {
        let conn = &mut self.connection.lock().map_err(|e| TxError::Db(e.to_string()))?;
        day_trades::table
            .filter(day_trades::account_id.eq(account_id.0))
            .filter(day_trades::executed_date.ge(start))
            .filter(day_trades::executed_date.le(end))
            .order(day_trades::executed_date.asc())
            .load::<DayTradeRow>(conn)
            .map_err(map_diesel_error)?
            .into_domain_models()
    }
}

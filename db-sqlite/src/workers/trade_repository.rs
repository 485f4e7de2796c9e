use crate::error::{map_diesel_error, ConversionError, IntoDomainModel, IntoDomainModels};
use crate::schema::trades;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use diesel::prelude::*;
use model::database::{TradeRepository, TxError};
use model::{AccountId, BrokerOrderId, Trade, TradeId, TradeSide};
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

/// Diesel-backed `Trade` repository (spec §3, §4.8). Trades are
/// write-once: there is no `update`.
pub struct TradeDB {
    pub(crate) connection: Arc<Mutex<SqliteConnection>>,
}

impl TradeDB {
    pub fn new(connection: Arc<Mutex<SqliteConnection>>) -> Self {
        TradeDB { connection }
    }
}

#[derive(Queryable, Identifiable, Insertable)]
#[diesel(table_name = trades)]
#[diesel(treat_none_as_null = true)]
struct TradeRow {
    id: i64,
    account_id: i64,
    symbol: String,
    side: String,
    quantity: i64,
    price: String,
    executed_at: NaiveDateTime,
    broker_order_id: String,
    strategy_id: Option<String>,
    realized_pnl: Option<String>,
}

fn parse_side(s: &str) -> Result<TradeSide, ConversionError> {
    match s {
        "buy" => Ok(TradeSide::Buy),
        "sell" => Ok(TradeSide::Sell),
        other => Err(ConversionError::new("side", format!("unknown trade side '{other}'"))),
    }
}

fn side_str(side: TradeSide) -> &'static str {
    match side {
        TradeSide::Buy => "buy",
        TradeSide::Sell => "sell",
    }
}

impl TryFrom<TradeRow> for Trade {
    type Error = ConversionError;

    fn try_from(row: TradeRow) -> Result<Self, Self::Error> {
        Ok(Trade {
            id: TradeId(row.id),
            account_id: AccountId(row.account_id),
            symbol: row.symbol,
            side: parse_side(&row.side)?,
            quantity: row.quantity,
            price: Decimal::from_str(&row.price).map_err(|_| ConversionError::new("price", "invalid decimal"))?,
            executed_at: DateTime::from_naive_utc_and_offset(row.executed_at, Utc),
            broker_order_id: BrokerOrderId(row.broker_order_id),
            strategy_id: row.strategy_id,
            realized_pnl: row
                .realized_pnl
                .as_deref()
                .map(|s| Decimal::from_str(s).map_err(|_| ConversionError::new("realized_pnl", "invalid decimal")))
                .transpose()?,
        })
    }
}

impl IntoDomainModel<Trade> for TradeRow {
    fn into_domain_model(self) -> Result<Trade, TxError> {
        Trade::try_from(self).map_err(TxError::from)
    }
}

#[derive(Insertable)]
#[diesel(table_name = trades)]
struct NewTradeRow {
    account_id: i64,
    symbol: String,
    side: String,
    quantity: i64,
    price: String,
    executed_at: NaiveDateTime,
    broker_order_id: String,
    strategy_id: Option<String>,
    realized_pnl: Option<String>,
}

impl From<&Trade> for NewTradeRow {
    fn from(trade: &Trade) -> Self {
        NewTradeRow {
            account_id: trade.account_id.0,
            symbol: trade.symbol.clone(),
            side: side_str(trade.side).to_string(),
            quantity: trade.quantity,
            price: trade.price.to_string(),
            executed_at: trade.executed_at.naive_utc(),
            broker_order_id: trade.broker_order_id.0.clone(),
            strategy_id: trade.strategy_id.clone(),
            realized_pnl: trade.realized_pnl.map(|d| d.to_string()),
        }
    }
}

impl TradeRepository for TradeDB {
    fn get(&mut self, id: TradeId) -> Result<Trade, TxError> {
        let conn = &mut self.connection.lock().map_err(|e| TxError::Db(e.to_string()))?;
        trades::table
            .find(id.0)
            .first::<TradeRow>(conn)
            .map_err(map_diesel_error)?
            .into_domain_model()
    }

    fn list_since(&mut self, account_id: AccountId, since: NaiveDate) -> Result<Vec<Trade>, TxError> {
        let conn = &mut self.connection.lock().map_err(|e| TxError::Db(e.to_string()))?;
        let since_ts = since.and_hms_opt(0, 0, 0).unwrap_or_default();
        trades::table
            .filter(trades::account_id.eq(account_id.0))
            .filter(trades::executed_at.ge(since_ts))
            .order(trades::executed_at.desc())
            .load::<TradeRow>(conn)
            .map_err(map_diesel_error)?
            .into_domain_models()
    }

    fn insert(&mut self, trade: &Trade) -> Result<Trade, TxError> {
        let conn = &mut self.connection.lock().map_err(|e| TxError::Db(e.to_string()))?;
        diesel::insert_into(trades::table)
            .values(NewTradeRow::from(trade))
            .get_result::<TradeRow>(conn)
            .map_err(map_diesel_error)?
            .into_domain_model()
    }
}

use crate::error::{map_diesel_error, ConversionError, IntoDomainModel, IntoDomainModels};
use crate::schema::positions;
use chrono::{DateTime, NaiveDateTime, Utc};
use diesel::prelude::*;
use model::database::{PositionRepository, TxError};
use model::{AccountId, Position, PositionId, PositionStatus};
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

/// Diesel-backed `Position` repository (spec §3, §4.8).
pub struct PositionDB {
    pub(crate) connection: Arc<Mutex<SqliteConnection>>,
}

impl PositionDB {
    pub fn new(connection: Arc<Mutex<SqliteConnection>>) -> Self {
        PositionDB { connection }
    }
}

#[derive(Queryable, Identifiable, AsChangeset, Insertable)]
#[diesel(table_name = positions)]
#[diesel(treat_none_as_null = true)]
struct PositionRow {
    id: i64,
    account_id: i64,
    symbol: String,
    quantity: i64,
    average_price: String,
    current_price: String,
    unrealized_pnl: String,
    unrealized_pnl_pct: String,
    status: String,
    opened_at: NaiveDateTime,
    closed_at: Option<NaiveDateTime>,
    last_synced_at: NaiveDateTime,
    realized_pnl: Option<String>,
}

fn parse_status(s: &str) -> Result<PositionStatus, ConversionError> {
    match s {
        "open" => Ok(PositionStatus::Open),
        "closed" => Ok(PositionStatus::Closed),
        other => Err(ConversionError::new("status", format!("unknown position status '{other}'"))),
    }
}

fn status_str(status: PositionStatus) -> &'static str {
    match status {
        PositionStatus::Open => "open",
        PositionStatus::Closed => "closed",
    }
}

fn parse_decimal(field: &'static str, value: &str) -> Result<Decimal, ConversionError> {
    Decimal::from_str(value).map_err(|_| ConversionError::new(field, "invalid decimal"))
}

impl TryFrom<PositionRow> for Position {
    type Error = ConversionError;

    fn try_from(row: PositionRow) -> Result<Self, Self::Error> {
        Ok(Position {
            id: PositionId(row.id),
            account_id: AccountId(row.account_id),
            symbol: row.symbol,
            quantity: row.quantity,
            average_price: parse_decimal("average_price", &row.average_price)?,
            current_price: parse_decimal("current_price", &row.current_price)?,
            unrealized_pnl: parse_decimal("unrealized_pnl", &row.unrealized_pnl)?,
            unrealized_pnl_pct: parse_decimal("unrealized_pnl_pct", &row.unrealized_pnl_pct)?,
            status: parse_status(&row.status)?,
            opened_at: DateTime::from_naive_utc_and_offset(row.opened_at, Utc),
            closed_at: row.closed_at.map(|t| DateTime::from_naive_utc_and_offset(t, Utc)),
            last_synced_at: DateTime::from_naive_utc_and_offset(row.last_synced_at, Utc),
            realized_pnl: row.realized_pnl.as_deref().map(|s| parse_decimal("realized_pnl", s)).transpose()?,
        })
    }
}

impl IntoDomainModel<Position> for PositionRow {
    fn into_domain_model(self) -> Result<Position, TxError> {
        Position::try_from(self).map_err(TxError::from)
    }
}

#[derive(Insertable)]
#[diesel(table_name = positions)]
struct NewPositionRow {
    account_id: i64,
    symbol: String,
    quantity: i64,
    average_price: String,
    current_price: String,
    unrealized_pnl: String,
    unrealized_pnl_pct: String,
    status: String,
    opened_at: NaiveDateTime,
    closed_at: Option<NaiveDateTime>,
    last_synced_at: NaiveDateTime,
    realized_pnl: Option<String>,
}

impl From<&Position> for NewPositionRow {
    fn from(position: &Position) -> Self {
        NewPositionRow {
            account_id: position.account_id.0,
            symbol: position.symbol.clone(),
            quantity: position.quantity,
            average_price: position.average_price.to_string(),
            current_price: position.current_price.to_string(),
            unrealized_pnl: position.unrealized_pnl.to_string(),
            unrealized_pnl_pct: position.unrealized_pnl_pct.to_string(),
            status: status_str(position.status).to_string(),
            opened_at: position.opened_at.naive_utc(),
            closed_at: position.closed_at.map(|t| t.naive_utc()),
            last_synced_at: position.last_synced_at.naive_utc(),
            realized_pnl: position.realized_pnl.map(|d| d.to_string()),
        }
    }
}

impl PositionRepository for PositionDB {
    fn get(&mut self, id: PositionId) -> Result<Position, TxError> {
        let conn = &mut self.connection.lock().map_err(|e| TxError::Db(e.to_string()))?;
        positions::table
            .find(id.0)
            .first::<PositionRow>(conn)
            .map_err(map_diesel_error)?
            .into_domain_model()
    }

    fn get_open_by_symbol(&mut self, account_id: AccountId, symbol: &str) -> Result<Option<Position>, TxError> {
        let conn = &mut self.connection.lock().map_err(|e| TxError::Db(e.to_string()))?;
        positions::table
            .filter(positions::account_id.eq(account_id.0))
            .filter(positions::symbol.eq(symbol))
            .filter(positions::status.eq("open"))
            .first::<PositionRow>(conn)
            .optional()
            .map_err(map_diesel_error)?
            .map(IntoDomainModel::into_domain_model)
            .transpose()
    }

    fn list_open(&mut self, account_id: AccountId) -> Result<Vec<Position>, TxError> {
        let conn = &mut self.connection.lock().map_err(|e| TxError::Db(e.to_string()))?;
        positions::table
            .filter(positions::account_id.eq(account_id.0))
            .filter(positions::status.eq("open"))
            .load::<PositionRow>(conn)
            .map_err(map_diesel_error)?
            .into_domain_models()
    }

    fn insert(&mut self, position: &Position) -> Result<Position, TxError> {
        let conn = &mut self.connection.lock().map_err(|e| TxError::Db(e.to_string()))?;
        diesel::insert_into(positions::table)
            .values(NewPositionRow::from(position))
            .get_result::<PositionRow>(conn)
            .map_err(map_diesel_error)?
            .into_domain_model()
    }

    fn update(&mut self, position: &Position) -> Result<(), TxError> {
        let conn = &mut self.connection.lock().map_err(|e| TxError::Db(e.to_string()))?;
        diesel::update(positions::table.find(position.id.0))
            .set((
                positions::quantity.eq(position.quantity),
                positions::average_price.eq(position.average_price.to_string()),
                positions::current_price.eq(position.current_price.to_string()),
                positions::unrealized_pnl.eq(position.unrealized_pnl.to_string()),
                positions::unrealized_pnl_pct.eq(position.unrealized_pnl_pct.to_string()),
                positions::status.eq(status_str(position.status)),
                positions::closed_at.eq(position.closed_at.map(|t| t.naive_utc())),
                positions::last_synced_at.eq(position.last_synced_at.naive_utc()),
                positions::realized_pnl.eq(position.realized_pnl.map(|d| d.to_string())),
            ))
            .execute(conn)
            .map_err(map_diesel_error)?;
        Ok(())
    }
}

//! One worker per durable entity (spec §4.8), each a thin Diesel mapping
//! over a shared `Arc<Mutex<SqliteConnection>>`.

mod account_repository;
mod day_trade_repository;
mod position_repository;
mod settlement_repository;
mod trade_repository;

pub use account_repository::AccountDB;
pub use day_trade_repository::DayTradeDB;
pub use position_repository::PositionDB;
pub use settlement_repository::SettlementDB;
pub use trade_repository::TradeDB;

//! Inventory Repositories

mod ledger;
mod products;

pub(crate) use ledger::PgStockLedgerRepository;
pub(crate) use products::PgProductsRepository;

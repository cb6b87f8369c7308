//! Order Repositories

mod addresses;
mod carts;
mod items;
mod orders;
mod purchases;

pub(crate) use addresses::PgAddressesRepository;
pub(crate) use carts::PgCartLinesRepository;
pub(crate) use items::PgOrderItemsRepository;
pub(crate) use orders::PgOrdersRepository;
pub(crate) use purchases::PgPurchaseRecordsRepository;

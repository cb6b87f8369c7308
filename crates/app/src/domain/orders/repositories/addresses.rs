//! Addresses Repository

use sqlx::{FromRow, Postgres, Row, Transaction, postgres::PgRow, query_as};

use crate::{
    domain::orders::models::{AddressId, AddressSnapshot},
    ids::UserId,
};

const GET_ADDRESS_SQL: &str = include_str!("../sql/get_address.sql");

#[derive(Debug, Clone, Default)]
pub(crate) struct PgAddressesRepository;

impl PgAddressesRepository {
    #[must_use]
    pub(crate) fn new() -> Self {
        Self
    }

    /// The address, if it exists and belongs to `user`.
    pub(crate) async fn get_address(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        address: AddressId,
        user: UserId,
    ) -> Result<Option<AddressSnapshot>, sqlx::Error> {
        query_as::<Postgres, AddressSnapshot>(GET_ADDRESS_SQL)
            .bind(address)
            .bind(user)
            .fetch_optional(&mut **tx)
            .await
    }
}

impl<'r> FromRow<'r, PgRow> for AddressSnapshot {
    fn from_row(row: &'r PgRow) -> sqlx::Result<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            user: row.try_get("user_id")?,
            receiver_name: row.try_get("receiver_name")?,
            receiver_phone: row.try_get("receiver_phone")?,
            province: row.try_get("province")?,
            city: row.try_get("city")?,
            district: row.try_get("district")?,
            detail_address: row.try_get("detail_address")?,
        })
    }
}

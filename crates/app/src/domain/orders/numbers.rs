//! Order and payment reference numbers.

use jiff::Timestamp;
use rand::Rng;

/// `EM` + UTC `YYYYMMDDhhmmss` + milliseconds + four random digits.
pub(crate) fn order_number<R: Rng + ?Sized>(now: Timestamp, rng: &mut R) -> String {
    let suffix: u16 = rng.gen_range(0..10_000);

    format!(
        "EM{}{:03}{suffix:04}",
        now.strftime("%Y%m%d%H%M%S"),
        now.subsec_millisecond()
    )
}

/// `TXN` + epoch milliseconds + four random digits.
pub(crate) fn transaction_id<R: Rng + ?Sized>(now: Timestamp, rng: &mut R) -> String {
    let suffix: u16 = rng.gen_range(0..10_000);

    format!("TXN{}{suffix:04}", now.as_millisecond())
}

pub(crate) fn next_order_number() -> String {
    order_number(Timestamp::now(), &mut rand::thread_rng())
}

pub(crate) fn next_transaction_id() -> String {
    transaction_id(Timestamp::now(), &mut rand::thread_rng())
}

use clap::Args;
use storefront_app::domain::orders::models::{OrderId, PaymentRequest};

use crate::cli::{ConnectionArgs, respond};

#[derive(Debug, Args)]
pub(crate) struct PayOrderArgs {
    #[command(flatten)]
    connection: ConnectionArgs,

    #[arg(long)]
    order_id: i64,

    /// Payment method recorded on the order
    #[arg(long, default_value = "online")]
    method: String,
}

pub(crate) async fn run(args: PayOrderArgs) -> Result<(), String> {
    let order = OrderId::new(args.order_id);
    let payment = PaymentRequest {
        method: args.method,
    };

    respond(&args.connection, "payment recorded", |context| async move {
        context.orders.pay_order(order, payment).await
    })
    .await
}

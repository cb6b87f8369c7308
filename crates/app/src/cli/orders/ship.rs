use clap::Args;
use storefront_app::domain::orders::models::{OrderId, ShipmentRequest};

use crate::cli::{ConnectionArgs, respond};

#[derive(Debug, Args)]
pub(crate) struct ShipOrderArgs {
    #[command(flatten)]
    connection: ConnectionArgs,

    #[arg(long)]
    order_id: i64,

    /// Carrier tracking number
    #[arg(long)]
    tracking_number: String,

    #[arg(long, default_value = "standard")]
    shipping_method: String,
}

pub(crate) async fn run(args: ShipOrderArgs) -> Result<(), String> {
    let order = OrderId::new(args.order_id);
    let shipment = ShipmentRequest {
        tracking_number: args.tracking_number,
        shipping_method: args.shipping_method,
    };

    respond(&args.connection, "order shipped", |context| async move {
        context.orders.ship_order(order, shipment).await
    })
    .await
}

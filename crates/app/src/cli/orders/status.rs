use clap::Args;
use storefront_app::{
    domain::orders::{lifecycle::OrderStatus, models::OrderId},
    ids::AdminId,
};

use crate::cli::{ConnectionArgs, respond};

#[derive(Debug, Args)]
pub(crate) struct UpdateStatusArgs {
    #[command(flatten)]
    connection: ConnectionArgs,

    #[arg(long)]
    order_id: i64,

    /// Target status, e.g. `confirmed`, `paid` or `cancelled`
    #[arg(long)]
    status: OrderStatus,

    /// Operator making the change
    #[arg(long, env = "STOREFRONT_ADMIN_ID")]
    admin_id: i64,
}

pub(crate) async fn run(args: UpdateStatusArgs) -> Result<(), String> {
    let order = OrderId::new(args.order_id);
    let admin = AdminId::new(args.admin_id);
    let target = args.status;

    respond(&args.connection, "order status updated", |context| async move {
        context.orders.update_order_status(order, target, admin).await
    })
    .await
}

use clap::Args;
use storefront_app::domain::orders::models::OrderId;

use crate::cli::{ConnectionArgs, respond};

#[derive(Debug, Args)]
pub(crate) struct ShowOrderArgs {
    #[command(flatten)]
    connection: ConnectionArgs,

    /// Order to print
    #[arg(long)]
    order_id: i64,
}

pub(crate) async fn run(args: ShowOrderArgs) -> Result<(), String> {
    let order = OrderId::new(args.order_id);

    respond(&args.connection, "order loaded", |context| async move {
        context.orders.get_order(order).await
    })
    .await
}

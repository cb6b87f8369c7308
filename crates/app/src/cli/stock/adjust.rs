use clap::Args;
use storefront_app::{
    domain::inventory::{ManualRestock, models::ProductId},
    ids::AdminId,
};

use crate::cli::{ConnectionArgs, respond};

#[derive(Debug, Args)]
pub(crate) struct AdjustStockArgs {
    #[command(flatten)]
    connection: ConnectionArgs,

    #[arg(long)]
    product_id: i64,

    /// Units to add; negative values remove stock
    #[arg(long, allow_negative_numbers = true)]
    delta: i32,

    #[arg(long)]
    note: Option<String>,

    /// Operator making the adjustment
    #[arg(long, env = "STOREFRONT_ADMIN_ID")]
    admin_id: i64,
}

pub(crate) async fn run(args: AdjustStockArgs) -> Result<(), String> {
    let admin = AdminId::new(args.admin_id);
    let restock = ManualRestock {
        product: ProductId::new(args.product_id),
        delta: args.delta,
        note: args.note,
    };

    respond(&args.connection, "stock adjusted", |context| async move {
        context.inventory.restock_manually(admin, restock).await
    })
    .await
}

use clap::Args;
use storefront_app::domain::inventory::models::ProductId;

use crate::cli::{ConnectionArgs, respond};

#[derive(Debug, Args)]
pub(crate) struct StockLedgerArgs {
    #[command(flatten)]
    connection: ConnectionArgs,

    #[arg(long)]
    product_id: i64,
}

pub(crate) async fn run(args: StockLedgerArgs) -> Result<(), String> {
    let product = ProductId::new(args.product_id);

    respond(&args.connection, "stock ledger loaded", |context| async move {
        context.inventory.stock_ledger(product).await
    })
    .await
}

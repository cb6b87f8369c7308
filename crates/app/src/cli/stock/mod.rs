use clap::{Args, Subcommand};

mod adjust;
mod ledger;

#[derive(Debug, Args)]
pub(crate) struct StockCommand {
    #[command(subcommand)]
    command: StockSubcommand,
}

#[derive(Debug, Subcommand)]
enum StockSubcommand {
    /// Add or remove units by hand and record it in the ledger
    Adjust(adjust::AdjustStockArgs),
    /// Print a product's stock ledger, oldest first
    Ledger(ledger::StockLedgerArgs),
}

pub(crate) async fn run(command: StockCommand) -> Result<(), String> {
    match command.command {
        StockSubcommand::Adjust(args) => adjust::run(args).await,
        StockSubcommand::Ledger(args) => ledger::run(args).await,
    }
}

use clap::{Args, Subcommand};

mod pay;
mod ship;
mod show;
mod status;

#[derive(Debug, Args)]
pub(crate) struct OrdersCommand {
    #[command(subcommand)]
    command: OrdersSubcommand,
}

#[derive(Debug, Subcommand)]
enum OrdersSubcommand {
    /// Print an order with its items
    Show(show::ShowOrderArgs),
    /// Move an order along the status table as an operator
    Status(status::UpdateStatusArgs),
    /// Record a shipment for a paid order
    Ship(ship::ShipOrderArgs),
    /// Record a payment for a pending or confirmed order
    Pay(pay::PayOrderArgs),
}

pub(crate) async fn run(command: OrdersCommand) -> Result<(), String> {
    match command.command {
        OrdersSubcommand::Show(args) => show::run(args).await,
        OrdersSubcommand::Status(args) => status::run(args).await,
        OrdersSubcommand::Ship(args) => ship::run(args).await,
        OrdersSubcommand::Pay(args) => pay::run(args).await,
    }
}

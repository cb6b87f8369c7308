use clap::{Args, Subcommand};

mod review;

#[derive(Debug, Args)]
pub(crate) struct RefundsCommand {
    #[command(subcommand)]
    command: RefundsSubcommand,
}

#[derive(Debug, Subcommand)]
enum RefundsSubcommand {
    /// Approve or reject a pending refund request
    Review(review::ReviewRefundArgs),
}

pub(crate) async fn run(command: RefundsCommand) -> Result<(), String> {
    match command.command {
        RefundsSubcommand::Review(args) => review::run(args).await,
    }
}

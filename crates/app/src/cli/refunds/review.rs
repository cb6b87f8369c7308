use clap::{Args, ValueEnum};
use storefront_app::{
    domain::refunds::models::{RefundDecision, RefundId},
    ids::AdminId,
};

use crate::cli::{ConnectionArgs, respond};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Verdict {
    Approve,
    Reject,
}

#[derive(Debug, Args)]
pub(crate) struct ReviewRefundArgs {
    #[command(flatten)]
    connection: ConnectionArgs,

    #[arg(long)]
    refund_id: i64,

    #[arg(long, value_enum)]
    decision: Verdict,

    /// Reply shown to the customer
    #[arg(long)]
    reply: Option<String>,

    /// Operator reviewing the request
    #[arg(long, env = "STOREFRONT_ADMIN_ID")]
    admin_id: i64,
}

pub(crate) async fn run(args: ReviewRefundArgs) -> Result<(), String> {
    let refund = RefundId::new(args.refund_id);
    let admin = AdminId::new(args.admin_id);
    let decision = RefundDecision {
        approve: matches!(args.decision, Verdict::Approve),
        reply: args.reply,
    };

    respond(&args.connection, "refund processed", |context| async move {
        context.refunds.process_refund(refund, admin, decision).await
    })
    .await
}

use clap::{Args, ValueEnum};
use registrar_core::config::LoadOptions;
use registrar_core::domain::approval::ApproverRole;
use registrar_core::domain::request::RequestId;
use registrar_core::flows::DecisionInput;

use crate::commands::{to_json, with_services, CommandResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum DecisionArg {
    Approve,
    Reject,
}

#[derive(Debug, Clone, Args)]
pub struct DecideArgs {
    #[arg(help = "Request id")]
    pub request_id: String,
    #[arg(long, value_enum)]
    pub decision: DecisionArg,
    #[arg(long, help = "Role the actor is deciding as, e.g. DEPT_HEAD")]
    pub role: String,
    #[arg(long, help = "Identifier of the deciding staff member")]
    pub actor: String,
    #[arg(long, help = "Version the decision was made against")]
    pub expected_version: u64,
    #[arg(long, help = "Required when rejecting")]
    pub reason: Option<String>,
    #[arg(long)]
    pub notes: Option<String>,
}

pub fn run(options: &LoadOptions, args: DecideArgs) -> CommandResult {
    let Some(role) = ApproverRole::parse(&args.role) else {
        return CommandResult::bad_request("decide", format!("unknown approver role `{}`", args.role));
    };

    let mut input = match args.decision {
        DecisionArg::Approve => DecisionInput::approve(role, args.actor, args.expected_version),
        DecisionArg::Reject => DecisionInput::reject(
            role,
            args.actor,
            args.reason.unwrap_or_default(),
            args.expected_version,
        ),
    };
    if let Some(notes) = args.notes {
        input = input.with_notes(notes);
    }
    let request_id = RequestId(args.request_id);

    with_services("decide", options, |services| async move {
        let request = services.decisions.decide(&request_id, input).await?;
        Ok((format!("request {} is now {}", request.id, request.status), to_json(&request)))
    })
}

use clap::Args;
use registrar_core::config::LoadOptions;
use registrar_core::domain::request::RequestId;

use crate::commands::{to_json, with_services, CommandResult};

#[derive(Debug, Clone, Args)]
pub struct ExecuteArgs {
    #[arg(help = "Request id")]
    pub request_id: String,
    #[arg(long, help = "Identifier of the executing staff member")]
    pub actor: String,
    #[arg(long, help = "Execution notes; defaults to the handler summary")]
    pub notes: Option<String>,
}

pub fn run(options: &LoadOptions, args: ExecuteArgs) -> CommandResult {
    let request_id = RequestId(args.request_id);
    with_services("execute", options, |services| async move {
        let request = services.execution.execute(&request_id, &args.actor, args.notes).await?;
        Ok((format!("request {} completed", request.id), to_json(&request)))
    })
}

#[derive(Debug, Clone, Args)]
pub struct ReleaseClaimArgs {
    #[arg(help = "Request id")]
    pub request_id: String,
    #[arg(long, help = "Operator confirming the side effect was never applied")]
    pub operator: String,
}

pub fn release_claim(options: &LoadOptions, args: ReleaseClaimArgs) -> CommandResult {
    let request_id = RequestId(args.request_id);
    with_services("release-claim", options, |services| async move {
        let request =
            services.execution.release_abandoned_claim(&request_id, &args.operator).await?;
        Ok((format!("execution claim on {} released", request.id), to_json(&request)))
    })
}

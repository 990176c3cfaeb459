use clap::Args;
use registrar_core::config::LoadOptions;
use registrar_core::domain::request::{RequestId, RequesterId};

use crate::commands::{to_json, with_services, CommandResult};

#[derive(Debug, Clone, Args)]
pub struct CancelArgs {
    #[arg(help = "Request id")]
    pub request_id: String,
    #[arg(long, help = "Identifier of the requesting student")]
    pub requester: String,
}

pub fn run(options: &LoadOptions, args: CancelArgs) -> CommandResult {
    let request_id = RequestId(args.request_id);
    let requester_id = RequesterId(args.requester);
    with_services("cancel", options, |services| async move {
        let request = services.cancellation.cancel(&request_id, &requester_id).await?;
        Ok((format!("request {} cancelled", request.id), to_json(&request)))
    })
}

//! Read-only commands over the request store.

use registrar_core::config::LoadOptions;
use registrar_core::domain::approval::ApproverRole;
use registrar_core::domain::request::{RequestId, RequesterId};

use crate::commands::{to_json, with_services, CommandResult};

pub fn show(options: &LoadOptions, request_id: String) -> CommandResult {
    let request_id = RequestId(request_id);
    with_services("show", options, |services| async move {
        let request = services.queries.get(&request_id).await?;
        Ok((format!("{} is {}", request.request_number.0, request.status), to_json(&request)))
    })
}

pub fn pending(options: &LoadOptions, role: String) -> CommandResult {
    let Some(role) = ApproverRole::parse(&role) else {
        return CommandResult::bad_request("pending", format!("unknown approver role `{role}`"));
    };
    with_services("pending", options, |services| async move {
        let queue = services.queries.pending_for_role(role).await?;
        Ok((format!("{} request(s) waiting on {role}", queue.len()), to_json(&queue)))
    })
}

pub fn list(options: &LoadOptions, requester: String) -> CommandResult {
    let requester_id = RequesterId(requester);
    with_services("list", options, |services| async move {
        let requests = services.queries.for_requester(&requester_id).await?;
        Ok((format!("{} request(s) for {requester_id}", requests.len()), to_json(&requests)))
    })
}

pub fn stats(options: &LoadOptions) -> CommandResult {
    with_services("stats", options, |services| async move {
        let statistics = services.queries.statistics().await?;
        Ok((format!("{} request(s) on record", statistics.total), to_json(&statistics)))
    })
}

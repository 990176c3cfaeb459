use std::fs;
use std::path::PathBuf;

use anyhow::{anyhow, bail, Context};
use clap::Args;
use registrar_core::config::LoadOptions;
use registrar_core::domain::request::{
    AttachmentKind, AttachmentRef, FormFields, RequestType, RequesterId,
};
use registrar_core::errors::WorkflowError;
use registrar_core::services::SubmissionInput;

use crate::commands::{to_json, with_services, CommandResult};

#[derive(Debug, Clone, Args)]
pub struct SubmitArgs {
    #[arg(long = "type", value_name = "REQUEST_TYPE", help = "Request type, e.g. GRADE_REVIEW")]
    pub request_type: String,
    #[arg(long, help = "Identifier of the submitting student")]
    pub requester: String,
    #[arg(long, default_value = "{}", help = "Form fields as a JSON object")]
    pub fields: String,
    #[arg(long, conflicts_with = "fields", help = "Read form fields from a JSON file")]
    pub fields_file: Option<PathBuf>,
    #[arg(
        long = "attachment",
        value_name = "KIND:ID:FILENAME",
        help = "Attachment reference; repeat for several"
    )]
    pub attachments: Vec<String>,
}

pub fn run(options: &LoadOptions, args: SubmitArgs) -> CommandResult {
    let request_type = match RequestType::parse(&args.request_type) {
        Some(request_type) => request_type,
        None => {
            return CommandResult::workflow_failure(
                "submit",
                WorkflowError::UnknownRequestType(args.request_type),
            )
        }
    };
    let input = match build_input(request_type, &args) {
        Ok(input) => input,
        Err(error) => return CommandResult::bad_request("submit", format!("{error:#}")),
    };

    with_services("submit", options, |services| async move {
        let request = services.submission.submit(input).await?;
        Ok((
            format!("submitted {} ({})", request.request_number.0, request.id),
            to_json(&request),
        ))
    })
}

fn build_input(request_type: RequestType, args: &SubmitArgs) -> anyhow::Result<SubmissionInput> {
    let raw_fields = match &args.fields_file {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("could not read fields file `{}`", path.display()))?,
        None => args.fields.clone(),
    };
    let fields: FormFields =
        serde_json::from_str(&raw_fields).context("form fields must be a JSON object")?;

    let attachments = args
        .attachments
        .iter()
        .map(|raw| parse_attachment(raw))
        .collect::<anyhow::Result<Vec<_>>>()?;

    Ok(SubmissionInput {
        request_type,
        requester_id: RequesterId(args.requester.trim().to_string()),
        fields,
        attachments,
    })
}

pub fn parse_attachment(raw: &str) -> anyhow::Result<AttachmentRef> {
    let mut parts = raw.splitn(3, ':');
    let (Some(kind), Some(id), Some(filename)) = (parts.next(), parts.next(), parts.next()) else {
        bail!("attachment `{raw}` must look like KIND:ID:FILENAME");
    };
    let kind = AttachmentKind::parse(kind).ok_or_else(|| anyhow!("unknown attachment kind `{kind}`"))?;
    if id.trim().is_empty() || filename.trim().is_empty() {
        bail!("attachment `{raw}` needs both an id and a filename");
    }
    Ok(AttachmentRef { id: id.trim().to_string(), kind, filename: filename.trim().to_string() })
}

#[cfg(test)]
mod tests {
    use registrar_core::domain::request::AttachmentKind;

    use super::parse_attachment;

    #[test]
    fn attachment_spec_parses_kind_id_and_filename() {
        let attachment = parse_attachment("medical_report:att-9:scan: page 1.pdf").expect("valid");
        assert_eq!(attachment.kind, AttachmentKind::MedicalReport);
        assert_eq!(attachment.id, "att-9");
        assert_eq!(attachment.filename, "scan: page 1.pdf");
    }

    #[test]
    fn malformed_attachment_specs_are_rejected() {
        assert!(parse_attachment("TRANSCRIPT:att-1").is_err());
        assert!(parse_attachment("DIPLOMA:att-1:x.pdf").is_err());
        assert!(parse_attachment("TRANSCRIPT: :x.pdf").is_err());
    }
}

pub mod bootstrap;
pub mod commands;
pub mod logging;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use registrar_core::config::{AppConfig, ConfigOverrides, LoadOptions};

use commands::cancel::CancelArgs;
use commands::decide::DecideArgs;
use commands::execute::{ExecuteArgs, ReleaseClaimArgs};
use commands::submit::SubmitArgs;

#[derive(Debug, Parser)]
#[command(
    name = "registrar",
    about = "Academic request registrar CLI",
    long_about = "Submit academic requests, record approval decisions step by step, execute approved requests, and inspect the approval queues.",
    after_help = "Examples:\n  registrar migrate\n  registrar submit --type GRADE_REVIEW --requester s-1 --fields '{\"course_id\":12,\"exam_type\":\"FINAL\",\"objection_reason\":\"q4 ungraded\",\"phone\":\"0791234567\"}'\n  registrar pending --role COURSE_INSTRUCTOR\n  registrar decide <ID> --decision approve --role COURSE_INSTRUCTOR --actor inst-1 --expected-version 1"
)]
pub struct Cli {
    #[arg(long, global = true, value_name = "PATH", help = "Config file (default: registrar.toml or config/registrar.toml)")]
    config: Option<PathBuf>,
    #[arg(long, global = true, value_name = "URL", help = "Override database.url")]
    database_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Validate config, workflow table, DB connectivity and schema state")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "List the approver chain of every offered request type")]
    Workflows,
    #[command(about = "Validate and submit a new request")]
    Submit(SubmitArgs),
    #[command(about = "Approve or reject the current step of a request")]
    Decide(DecideArgs),
    #[command(about = "Apply the side effect of an approved request")]
    Execute(ExecuteArgs),
    #[command(
        name = "release-claim",
        about = "Clear an execution claim whose executor never recorded an outcome"
    )]
    ReleaseClaim(ReleaseClaimArgs),
    #[command(about = "Withdraw an in-flight request as its requester")]
    Cancel(CancelArgs),
    #[command(about = "Show one request with its approval steps")]
    Show {
        #[arg(help = "Request id")]
        request_id: String,
    },
    #[command(about = "List requests waiting on a role, oldest first")]
    Pending {
        #[arg(long, help = "Approver role, e.g. DEPT_HEAD")]
        role: String,
    },
    #[command(about = "List a requester's requests, newest first")]
    List {
        #[arg(long)]
        requester: String,
    },
    #[command(about = "Count requests by status and type")]
    Stats,
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let options = LoadOptions {
        require_file: cli.config.is_some(),
        config_path: cli.config,
        overrides: ConfigOverrides { database_url: cli.database_url, ..ConfigOverrides::default() },
    };

    if let Ok(config) = AppConfig::load(options.clone()) {
        logging::init(&config.logging);
    }

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(&options),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run(&options) }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(&options, json) }
        }
        Command::Workflows => commands::workflows::run(&options),
        Command::Submit(args) => commands::submit::run(&options, args),
        Command::Decide(args) => commands::decide::run(&options, args),
        Command::Execute(args) => commands::execute::run(&options, args),
        Command::ReleaseClaim(args) => commands::execute::release_claim(&options, args),
        Command::Cancel(args) => commands::cancel::run(&options, args),
        Command::Show { request_id } => commands::inspect::show(&options, request_id),
        Command::Pending { role } => commands::inspect::pending(&options, role),
        Command::List { requester } => commands::inspect::list(&options, requester),
        Command::Stats => commands::inspect::stats(&options),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

#[cfg(test)]
mod tests {
    use clap::{CommandFactory, Parser};

    use super::{Cli, Command};
    use crate::commands::decide::DecisionArg;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn decide_parses_flags() {
        let cli = Cli::try_parse_from([
            "registrar",
            "decide",
            "req-1",
            "--decision",
            "reject",
            "--role",
            "DEPT_HEAD",
            "--actor",
            "head-1",
            "--expected-version",
            "3",
            "--reason",
            "missing report",
        ])
        .expect("valid arguments");

        let Command::Decide(args) = cli.command else {
            panic!("expected decide");
        };
        assert_eq!(args.request_id, "req-1");
        assert_eq!(args.decision, DecisionArg::Reject);
        assert_eq!(args.expected_version, 3);
        assert_eq!(args.reason.as_deref(), Some("missing report"));
    }

    #[test]
    fn global_flags_are_accepted_after_the_subcommand() {
        let cli = Cli::try_parse_from(["registrar", "stats", "--database-url", "sqlite::memory:"])
            .expect("valid arguments");
        assert_eq!(cli.database_url.as_deref(), Some("sqlite::memory:"));
        assert!(matches!(cli.command, Command::Stats));
    }

    #[test]
    fn release_claim_requires_an_operator() {
        assert!(Cli::try_parse_from(["registrar", "release-claim", "req-1"]).is_err());

        let cli = Cli::try_parse_from(["registrar", "release-claim", "req-1", "--operator", "ops-1"])
            .expect("valid arguments");
        let Command::ReleaseClaim(args) = cli.command else {
            panic!("expected release-claim");
        };
        assert_eq!(args.operator, "ops-1");
    }
}

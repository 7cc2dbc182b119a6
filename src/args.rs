use crate::app;
use clap::{Arg, Command};
use strum::{EnumString, VariantNames};

pub const CALLER_FILE: &str = "caller-file";
pub const CALLER_FUNCTION: &str = "caller-function";
pub const CALLER_LINE: &str = "caller-line";
pub const CODE_VERSION: &str = "code-version";
pub const DRY_RUN: &str = "dry-run";
pub const ENVIRONMENT: &str = "environment";
pub const FORWARD_LOGS: &str = "forward-logs";
pub const LEVEL: &str = "level";
pub const LOG_LEVEL: &str = "log-level";
pub const LOG_NAME: &str = "log-name";
pub const MESSAGE: &str = "message";
pub const MIN_LEVEL: &str = "min-level";
pub const PROJECT_ID: &str = "project-id";
pub const RESOURCE_LABELS: &str = "resource-labels";
pub const RESOURCE_TYPE: &str = "resource-type";
pub const SERVER_ROOT: &str = "server-root";
pub const SERVICE: &str = "service";
pub const STDIN: &str = "stdin";
pub const VERBOSITY: &str = "verbosity";

#[derive(EnumString, VariantNames, Debug, PartialEq, Eq)]
#[strum(serialize_all = "lowercase")]
#[allow(non_camel_case_types)]
pub enum LogLevelType {
    error,
    warn,
    info,
    debug,
    trace,
}

pub(crate) fn clap_app() -> Command<'static> {
    Command::new(app::NAME)
        .version(app::VERSION)
        .long_version(app::long_version())
        .about("Sends log entries to Google Cloud Logging the way the gcplog hook does")
        .arg(
            Arg::new(VERBOSITY)
                .short('v')
                .multiple_occurrences(true)
                .help("verbosity level of the tool's own terminal output"),
        )
        .arg(
            Arg::new(LOG_LEVEL)
                .long("log-level")
                .value_name("LEVEL")
                .help("Sets the level of the tool's own terminal output, overrides -v")
                .possible_values(LogLevelType::VARIANTS.iter().copied())
                .env("GCPLOG_LOG_LEVEL")
                .takes_value(true),
        )
        .arg(
            Arg::new(PROJECT_ID)
                .long("project-id")
                .value_name("PROJECT")
                .help("Sets the Google Cloud project to log to")
                .env("GCPLOG_PROJECT_ID")
                .required(true)
                .takes_value(true),
        )
        .arg(
            Arg::new(LOG_NAME)
                .long("log-name")
                .value_name("LOG_ID")
                .help("Sets the log the entries are written to, also used as the logProject label")
                .default_value("gcplog")
                .env("GCPLOG_LOG_NAME")
                .takes_value(true),
        )
        .arg(
            Arg::new(ENVIRONMENT)
                .long("environment")
                .value_name("NAME")
                .help("Sets the environment label")
                .env("GCPLOG_ENVIRONMENT")
                .takes_value(true),
        )
        .arg(
            Arg::new(CODE_VERSION)
                .long("code-version")
                .value_name("VERSION")
                .help("Sets the codeVersion label")
                .env("GCPLOG_CODE_VERSION")
                .takes_value(true),
        )
        .arg(
            Arg::new(SERVICE)
                .long("service")
                .value_name("NAME")
                .help("Sets the service label")
                .env("GCPLOG_SERVICE")
                .takes_value(true),
        )
        .arg(
            Arg::new(SERVER_ROOT)
                .long("server-root")
                .value_name("PATH")
                .help("Sets the serverRoot label")
                .env("GCPLOG_SERVER_ROOT")
                .takes_value(true),
        )
        .arg(
            Arg::new(MIN_LEVEL)
                .long("min-level")
                .value_name("LEVEL")
                .help("Sets the minimum level the hook passes on")
                .possible_values(LogLevelType::VARIANTS.iter().copied())
                .default_value("info")
                .env("GCPLOG_MIN_LEVEL")
                .takes_value(true),
        )
        .arg(
            Arg::new(RESOURCE_TYPE)
                .long("resource-type")
                .value_name("TYPE")
                .help("Sets the monitored resource type")
                .default_value("global")
                .env("GCPLOG_RESOURCE_TYPE")
                .takes_value(true),
        )
        .arg(
            Arg::new(RESOURCE_LABELS)
                .long("resource-labels")
                .value_name("JSON")
                .help("Sets the monitored resource labels as a flat JSON object, e.g. '{\"zone\":\"europe-west4-a\"}'")
                .env("GCPLOG_RESOURCE_LABELS")
                .takes_value(true),
        )
        .arg(
            Arg::new(LEVEL)
                .long("level")
                .value_name("LEVEL")
                .help("Sets the level the messages are logged at")
                .possible_values(LogLevelType::VARIANTS.iter().copied())
                .default_value("info")
                .takes_value(true),
        )
        .arg(
            Arg::new(CALLER_FUNCTION)
                .long("caller-function")
                .value_name("NAME")
                .help("Reports the messages as logged from this function")
                .takes_value(true),
        )
        .arg(
            Arg::new(CALLER_FILE)
                .long("caller-file")
                .value_name("PATH")
                .help("Reports the messages as logged from this file")
                .takes_value(true),
        )
        .arg(
            Arg::new(CALLER_LINE)
                .long("caller-line")
                .value_name("LINE")
                .help("Reports the messages as logged from this line")
                .takes_value(true),
        )
        .arg(
            Arg::new(DRY_RUN)
                .long("dry-run")
                .help("Prints the WriteLogEntries requests as JSON instead of shipping them"),
        )
        .arg(
            Arg::new(STDIN)
                .long("stdin")
                .help("Reads messages from standard input, one per line"),
        )
        .arg(
            Arg::new(FORWARD_LOGS)
                .long("forward-logs")
                .help("Also sends the tool's own log records through the hook")
                .env("GCPLOG_FORWARD_LOGS"),
        )
        .arg(
            Arg::new(MESSAGE)
                .value_name("MESSAGE")
                .help("The message to log, parts are joined with spaces")
                .multiple_values(true),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_message_parts_and_labels() {
        let m = clap_app()
            .try_get_matches_from([
                "gcplog",
                "--project-id",
                "my-project",
                "--service",
                "billing",
                "--caller-line",
                "12",
                "{\"type\":",
                "\"db:Pool.get\"}",
            ])
            .unwrap();

        assert_eq!(m.value_of(PROJECT_ID), Some("my-project"));
        assert_eq!(m.value_of(SERVICE), Some("billing"));
        assert_eq!(m.value_of(CALLER_LINE), Some("12"));
        assert_eq!(
            m.values_of(MESSAGE).unwrap().collect::<Vec<_>>(),
            vec!["{\"type\":", "\"db:Pool.get\"}"]
        );
        assert_eq!(m.value_of(LEVEL), Some("info"));
        assert!(!m.is_present(DRY_RUN));
    }

    #[test]
    fn rejects_unknown_levels() {
        let result =
            clap_app().try_get_matches_from(["gcplog", "--project-id", "p", "--level", "fatal"]);
        assert!(result.is_err());
    }

    #[test]
    fn counts_verbosity() {
        let m = clap_app()
            .try_get_matches_from(["gcplog", "--project-id", "p", "-vvv"])
            .unwrap();
        assert_eq!(m.occurrences_of(VERBOSITY), 3);
    }

    #[test]
    fn log_level_names_parse() {
        for name in LogLevelType::VARIANTS {
            assert!(name.parse::<LogLevelType>().is_ok());
        }
        assert_eq!("warn".parse::<LogLevelType>(), Ok(LogLevelType::warn));
    }
}

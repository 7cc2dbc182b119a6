#[macro_use]
extern crate lazy_static;

extern crate clap;

mod app;
mod args;
mod logging;

use clap::ArgMatches;
use google_logging2::api::WriteLogEntriesRequest;
use slog::{debug, info, warn, Logger};
use slog_gcplog::{Arg, Builder, Caller, CallerLoggerHook, Hook, Level, LoggerHook};
use std::io::{self, BufRead};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::{process, thread};

fn hook_builder(m: &ArgMatches) -> Result<Builder, String> {
    // clap enforces it, an empty id would fail on connect anyway
    let project_id = m.value_of(args::PROJECT_ID).unwrap_or_default();
    let log_name = m.value_of(args::LOG_NAME).unwrap_or(app::NAME);

    let mut builder = Builder::new(project_id, log_name)
        .with_level(parse_level(m, args::MIN_LEVEL)?)
        .with_resource_type(m.value_of(args::RESOURCE_TYPE).unwrap_or("global"));

    if let Some(environment) = m.value_of(args::ENVIRONMENT) {
        builder = builder.with_environment(environment);
    }
    if let Some(code_version) = m.value_of(args::CODE_VERSION) {
        builder = builder.with_code_version(code_version);
    }
    if let Some(service) = m.value_of(args::SERVICE) {
        builder = builder.with_service(service);
    }
    if let Some(server_root) = m.value_of(args::SERVER_ROOT) {
        builder = builder.with_server_root(server_root);
    }
    if let Some(labels) = m.value_of(args::RESOURCE_LABELS) {
        let labels: serde_json::Value = serde_json::from_str(labels)
            .map_err(|e| format!("--{} is not valid JSON: {}", args::RESOURCE_LABELS, e))?;
        builder = builder
            .with_resource_labels(labels)
            .map_err(|e| format!("could not use the resource labels: {}", e))?;
    }
    Ok(builder)
}

fn parse_level(m: &ArgMatches, arg: &str) -> Result<Level, String> {
    m.value_of(arg)
        .unwrap_or("info")
        .parse::<Level>()
        .map_err(|e| format!("--{}: {}", arg, e))
}

fn caller(m: &ArgMatches) -> Result<Option<(String, String, u32)>, String> {
    let function = m.value_of(args::CALLER_FUNCTION);
    let file = m.value_of(args::CALLER_FILE);
    let line = match m.value_of(args::CALLER_LINE) {
        Some(line) => Some(
            line.parse::<u32>()
                .map_err(|e| format!("--{} must be a line number: {}", args::CALLER_LINE, e))?,
        ),
        None => None,
    };

    if function.is_none() && file.is_none() && line.is_none() {
        return Ok(None);
    }
    Ok(Some((
        function.unwrap_or_default().to_string(),
        file.unwrap_or_default().to_string(),
        line.unwrap_or_default(),
    )))
}

fn emit(hook: &Hook, level: Level, caller: Option<&Caller<'_>>, args: &[Arg]) {
    match (level, caller) {
        (Level::Error, Some(caller)) => hook.error_with_caller(caller, args),
        (Level::Warn, Some(caller)) => hook.warn_with_caller(caller, args),
        (Level::Info, Some(caller)) => hook.info_with_caller(caller, args),
        (Level::Debug, Some(caller)) => hook.debug_with_caller(caller, args),
        (Level::Trace, Some(caller)) => hook.trace_with_caller(caller, args),
        (Level::Error, None) => hook.error(args),
        (Level::Warn, None) => hook.warn(args),
        (Level::Info, None) => hook.info(args),
        (Level::Debug, None) => hook.debug(args),
        (Level::Trace, None) => hook.trace(args),
    }
}

fn print_requests(requests: Receiver<WriteLogEntriesRequest>) {
    for request in requests {
        match serde_json::to_string(&request) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("Could not serialize request: {}", e),
        }
    }
}

fn send_messages(m: &ArgMatches, log: &Logger, hook: &Hook) -> Result<usize, String> {
    let level = parse_level(m, args::LEVEL)?;
    let caller_parts = caller(m)?;
    let caller = caller_parts
        .as_ref()
        .map(|(function, file, line)| Caller::new(function, file, *line));

    let mut sent = 0;
    if m.is_present(args::STDIN) {
        for line in io::stdin().lock().lines() {
            let line = line.map_err(|e| format!("could not read standard input: {}", e))?;
            emit(hook, level, caller.as_ref(), &[Arg::from(line)]);
            sent += 1;
        }
    }
    if let Some(parts) = m.values_of(args::MESSAGE) {
        let message = parts.collect::<Vec<_>>().join(" ");
        emit(hook, level, caller.as_ref(), &[Arg::from(message)]);
        sent += 1;
    }
    if sent == 0 {
        warn!(log, "Nothing to send, pass a message or use --{}", args::STDIN);
    }
    Ok(sent)
}

fn run(arg_matches: ArgMatches) -> Result<(), String> {
    let builder = hook_builder(&arg_matches)?;

    let (hook, printer) = if arg_matches.is_present(args::DRY_RUN) {
        let (hook, requests) = builder.build_with_channel();
        let printer = thread::Builder::new()
            .name("gcplog-dry-run".to_string())
            .spawn(move || print_requests(requests))
            .map_err(|e| format!("could not start the dry-run printer: {}", e))?;
        (Arc::new(hook), Some(printer))
    } else {
        (Arc::new(builder.build()), None)
    };

    let forward = arg_matches
        .is_present(args::FORWARD_LOGS)
        .then(|| Arc::clone(&hook));
    let log = logging::create_logger(&arg_matches, forward)?;

    info!(log, "Starting {}", app::NAME;
        "version" => app::VERSION,
        "slog-gcplog" => app::hook_version(),
        "log" => &hook.config().log_name,
    );

    let sent = send_messages(&arg_matches, &log, &hook)?;
    debug!(log, "Sent {} message(s)", sent; "connected" => hook.is_connected());

    // Dropping the logger drains forwarded records into the hook before the final flush
    drop(log);
    hook.flush();
    drop(hook);

    if let Some(printer) = printer {
        printer
            .join()
            .map_err(|_| "the dry-run printer panicked".to_string())?;
    }
    Ok(())
}

fn main() {
    let arg_matches = args::clap_app().get_matches();
    if let Err(e) = run(arg_matches) {
        eprintln!("\nError: {}", e);
        process::exit(1);
    };
}

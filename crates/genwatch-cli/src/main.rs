mod simulate;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use genwatch_core::logging::init_tracing;
use genwatch_core::models::TaskStatus;
use genwatch_core::{GenwatchConfig, IntervalBucket, polling_interval};
use serde::Serialize;

use crate::simulate::SimulateOptions;

const USAGE: &str = "usage:
  genwatch interval <generating-count> [--config PATH]
  genwatch statuses [--json]
  genwatch config [--config PATH]
  genwatch simulate [--tasks N] [--time-scale F] [--fail-rate P] [--json] [--config PATH]";

#[derive(Debug, PartialEq)]
enum Command {
    Interval { count: i64 },
    Statuses,
    Config,
    Simulate(SimulateArgs),
}

#[derive(Debug, PartialEq)]
struct SimulateArgs {
    tasks: u64,
    time_scale: f64,
    fail_rate: f64,
}

#[derive(Debug, PartialEq)]
struct Cli {
    command: Command,
    config_path: Option<PathBuf>,
    json: bool,
}

#[derive(Serialize)]
struct StatusRow {
    name: &'static str,
    code: i32,
    terminal: bool,
}

fn parse_args(args: &[String]) -> Result<Cli, String> {
    let (name, rest) = args.split_first().ok_or_else(|| String::from("missing command"))?;

    let mut config_path = None;
    let mut json = false;
    let mut positional = Vec::new();
    let mut tasks = 3u64;
    let mut time_scale = 1.0f64;
    let mut fail_rate = 0.1f64;

    let mut iter = rest.iter();
    while let Some(arg) = iter.next() {
        let mut value_for = |flag: &str| {
            iter.next()
                .cloned()
                .ok_or_else(|| format!("{flag} requires a value"))
        };
        match arg.as_str() {
            "--json" => json = true,
            "--config" => config_path = Some(PathBuf::from(value_for("--config")?)),
            "--tasks" => {
                tasks = parse_number(&value_for("--tasks")?, "--tasks")?;
            }
            "--time-scale" => {
                time_scale = parse_number(&value_for("--time-scale")?, "--time-scale")?;
            }
            "--fail-rate" => {
                fail_rate = parse_number(&value_for("--fail-rate")?, "--fail-rate")?;
                if !(0.0..=1.0).contains(&fail_rate) {
                    return Err(format!("--fail-rate must be within [0, 1], got {fail_rate}"));
                }
            }
            flag if flag.starts_with("--") => return Err(format!("unknown flag '{flag}'")),
            value => positional.push(value.to_string()),
        }
    }

    let command = match name.as_str() {
        "interval" => {
            let [count] = positional.as_slice() else {
                return Err(String::from("interval takes exactly one count"));
            };
            Command::Interval {
                count: parse_number(count, "generating-count")?,
            }
        }
        "statuses" => Command::Statuses,
        "config" => Command::Config,
        "simulate" => {
            if tasks == 0 {
                return Err(String::from("--tasks must be at least 1"));
            }
            Command::Simulate(SimulateArgs {
                tasks,
                time_scale,
                fail_rate,
            })
        }
        other => return Err(format!("unknown command '{other}'")),
    };

    if !matches!(command, Command::Interval { .. }) && !positional.is_empty() {
        return Err(format!("unexpected argument '{}'", positional[0]));
    }

    Ok(Cli {
        command,
        config_path,
        json,
    })
}

fn parse_number<T: std::str::FromStr>(raw: &str, what: &str) -> Result<T, String> {
    raw.parse()
        .map_err(|_| format!("invalid value '{raw}' for {what}"))
}

fn load_config(path: Option<&PathBuf>) -> Result<GenwatchConfig, String> {
    let loaded = match path {
        Some(path) => GenwatchConfig::load_from_path(path),
        None => GenwatchConfig::load_default(),
    };
    loaded.map_err(|error| error.to_string())
}

fn print_json<T: Serialize>(value: &T) -> Result<(), String> {
    let json = serde_json::to_string_pretty(value).map_err(|error| error.to_string())?;
    println!("{json}");
    Ok(())
}

async fn execute(cli: Cli) -> Result<(), String> {
    match cli.command {
        Command::Statuses => {
            let rows: Vec<StatusRow> = TaskStatus::ALL
                .into_iter()
                .map(|status| StatusRow {
                    name: status.as_str(),
                    code: status.code(),
                    terminal: status.is_terminal(),
                })
                .collect();
            if cli.json {
                return print_json(&rows);
            }
            for row in rows {
                println!(
                    "{:<11} {:>5}  {}",
                    row.name,
                    row.code,
                    if row.terminal { "terminal" } else { "in flight" }
                );
            }
            Ok(())
        }
        Command::Interval { count } => {
            let config = load_config(cli.config_path.as_ref())?;
            let interval =
                polling_interval(&config.polling, count).map_err(|error| error.to_string())?;
            let bucket = usize::try_from(count)
                .ok()
                .and_then(IntervalBucket::for_count);
            match (interval, bucket) {
                (Some(interval), Some(bucket)) => {
                    println!("{} ms ({bucket:?} bucket)", interval.as_millis());
                }
                _ => println!("stop"),
            }
            Ok(())
        }
        Command::Config => {
            let config = load_config(cli.config_path.as_ref())?;
            print_json(&config)
        }
        Command::Simulate(args) => {
            let config = load_config(cli.config_path.as_ref())?
                .time_scaled(args.time_scale)
                .map_err(|error| error.to_string())?;
            let render_ms = (1_000.0 / args.time_scale).round().max(50.0) as u64;
            let options = SimulateOptions {
                tasks: args.tasks,
                fail_rate: args.fail_rate,
                json: cli.json,
                render_interval: Duration::from_millis(render_ms),
            };
            let report = simulate::run(options, config)
                .await
                .map_err(|error| error.to_string())?;
            tracing::info!(
                rounds = report.rounds,
                elapsed_ms = report.elapsed_ms,
                "simulated session finished"
            );
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let cli = match parse_args(&args) {
        Ok(cli) => cli,
        Err(message) => {
            eprintln!("genwatch: {message}\n{USAGE}");
            return ExitCode::from(2);
        }
    };

    match execute(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("genwatch: {message}");
            ExitCode::FAILURE
        }
    }
}

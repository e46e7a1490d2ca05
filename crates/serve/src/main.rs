// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! holond: the serve controller binary.
//!
//! Thin wiring only: it maps argv onto the enumerated [`ServeOptions`]
//! record and installs logging; everything else lives in the library.

use std::path::PathBuf;

use holon_serve::env::parse_duration;
use holon_serve::{run, RuntimeMode, ServeOptions};

const USAGE: &str = "usage: holond [serve] [options]

options:
  --agent-id <id>                  agent identity (default: default)
  --agent-home <path>              agent home root (default: ~/.holon/agents/<id>)
  --repo <owner/name>              repo hint recorded in diagnostics
  --input <path|->                 stdin/file mode: one JSON envelope per line
  --session <key>                  name of the default session
  --no-default-session             do not materialize a default session
  --lazy-runtime                   skip warmup; first event boots the runtime
  --runtime-warmup-timeout <dur>   warmup budget (default: 2m)
  --runtime-warmup-best-effort     tolerate warmup failure
  --max-events <n>                 stop after n events (stdin/file mode)
  --dry-run                        route and resolve without dispatching
  --tick-interval <dur>            emit synthetic timer.tick envelopes
  --log-level <filter>             tracing filter (default: info)
  --runtime-mode <prod|dev>        runtime flavor
  --runtime-dev-agent-source <p>   host path mounted as the dev agent source
  --webhook-port <port>            webhook listener port
  --no-subscriptions               webhook legacy mode (deprecated)
";

fn parse_args(args: &[String]) -> Result<ServeOptions, String> {
    let mut options = ServeOptions::default();
    let mut iter = args.iter().peekable();

    // Tolerate the `serve` mode word the outer CLI passes through.
    if iter.peek().map(|s| s.as_str()) == Some("serve") {
        iter.next();
    }

    while let Some(arg) = iter.next() {
        let mut value = |flag: &str| -> Result<String, String> {
            iter.next().cloned().ok_or_else(|| format!("{} requires a value", flag))
        };
        match arg.as_str() {
            "--agent-id" => options.agent_id = value(arg)?,
            "--agent-home" => options.agent_home = Some(PathBuf::from(value(arg)?)),
            "--repo" => options.repo = Some(value(arg)?),
            "--input" => options.input = Some(value(arg)?),
            "--session" => options.session = Some(value(arg)?),
            "--no-default-session" => options.no_default_session = true,
            "--lazy-runtime" => options.lazy_runtime = true,
            "--runtime-warmup-timeout" => {
                let raw = value(arg)?;
                options.runtime_warmup_timeout = parse_duration(&raw)
                    .ok_or_else(|| format!("invalid duration: {}", raw))?;
            }
            "--runtime-warmup-best-effort" => options.runtime_warmup_best_effort = true,
            "--max-events" => {
                let raw = value(arg)?;
                options.max_events =
                    Some(raw.parse().map_err(|_| format!("invalid count: {}", raw))?);
            }
            "--dry-run" => options.dry_run = true,
            "--tick-interval" => {
                let raw = value(arg)?;
                options.tick_interval =
                    Some(parse_duration(&raw).ok_or_else(|| format!("invalid duration: {}", raw))?);
            }
            "--log-level" => options.log_level = Some(value(arg)?),
            "--runtime-mode" => {
                let raw = value(arg)?;
                options.runtime_mode = RuntimeMode::parse(&raw)
                    .ok_or_else(|| format!("invalid runtime mode: {}", raw))?;
            }
            "--runtime-dev-agent-source" => {
                options.runtime_dev_agent_source = Some(PathBuf::from(value(arg)?));
            }
            "--webhook-port" => {
                let raw = value(arg)?;
                options.webhook_port =
                    Some(raw.parse().map_err(|_| format!("invalid port: {}", raw))?);
            }
            "--help" | "-h" => return Err(String::new()),
            "--no-subscriptions" => options.no_subscriptions = true,
            other => return Err(format!("unknown flag: {}", other)),
        }
    }
    Ok(options)
}

fn init_logging(options: &ServeOptions) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::EnvFilter;

    let directives = options
        .log_level
        .clone()
        .or_else(|| std::env::var("HOLON_LOG").ok())
        .unwrap_or_else(|| "info".into());
    let filter = EnvFilter::try_new(&directives).unwrap_or_else(|_| {
        eprintln!("holond: invalid log filter {:?}, using info", directives);
        EnvFilter::new("info")
    });

    let log_dir = options.home_root().join("state");
    match std::fs::create_dir_all(&log_dir) {
        Ok(()) => {
            let appender = tracing_appender::rolling::daily(&log_dir, "serve.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Some(guard)
        }
        Err(_) => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
            None
        }
    }
}

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let options = match parse_args(&args) {
        Ok(options) => options,
        Err(message) => {
            if !message.is_empty() {
                eprintln!("holond: {}", message);
            }
            eprintln!("{}", USAGE);
            std::process::exit(if message.is_empty() { 0 } else { 2 });
        }
    };

    let _guard = init_logging(&options);

    if let Err(e) = run(options).await {
        tracing::error!(error = %e, "serve failed");
        eprintln!("holond: {}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;

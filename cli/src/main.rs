//! chainsub CLI — watch Tendermint event subscriptions from the terminal.
//!
//! Usage:
//! ```bash
//! # Stream every transaction's events
//! chainsub watch --url wss://rpc.example.com/websocket
//!
//! # Only events whose action attribute is "send", stop after 10
//! chainsub watch --url wss://rpc.example.com/websocket --action send --count 10
//!
//! # Print the query string a set of flags subscribes to
//! chainsub query --event Tx --hash ABCD --height 100
//! ```

mod logging;

use std::collections::BTreeMap;
use std::env;
use std::process;

use anyhow::{bail, Context};
use tokio::sync::mpsc;

use chainsub_core::{EventType, Query, SubscriptionOptions};
use chainsub_ws::{EventListener, LifecycleEvent, LifecycleKind, ManagerConfig, SubscriptionManager};

use logging::{init_tracing, LogConfig};

#[tokio::main]
async fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    let result = match args[1].as_str() {
        "watch" => cmd_watch(&args[2..]).await,
        "query" => cmd_query(&args[2..]),
        "version" | "--version" | "-V" => {
            println!("chainsub {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            print_usage();
            process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn print_usage() {
    println!("chainsub {}", env!("CARGO_PKG_VERSION"));
    println!("Multiplexed Tendermint event subscriptions\n");
    println!("USAGE:");
    println!("    chainsub <COMMAND> [FLAGS]\n");
    println!("COMMANDS:");
    println!("    watch      Subscribe and print matching events");
    println!("    query      Print the canonical query for the given flags");
    println!("    version    Print version");
    println!("    help       Print this help\n");
    println!("QUERY FLAGS:");
    println!("    --event <TYPE>          Event type (Tx, NewBlock, ...)  [default: Tx]");
    println!("    --action <ACTION>       message.action to match");
    println!("    --hash <HASH>           tx.hash to match");
    println!("    --height <N>            block.height to match");
    println!("    --tx-height <N>         tx.height to match\n");
    println!("WATCH FLAGS:");
    println!("    --url <URL>             WebSocket endpoint  [default: ws://localhost:26657/websocket]");
    println!("    --config <FILE>         JSON manager config (flags override it)");
    println!("    --count <N>             Exit after N events");
    println!("    --frames                Print whole data frames instead of attribute maps");
    println!("    --log-level <LEVEL>     trace | debug | info | warn | error  [default: warn]");
    println!("    --log-component <C=L>   Per-crate level, e.g. chainsub-ws=debug (repeatable)");
    println!("    --json                  JSON log output");
}

async fn cmd_watch(args: &[String]) -> anyhow::Result<()> {
    init_tracing(&log_config(args));

    let config = manager_config(args)?;
    tracing::debug!(?config, "manager config");
    let event_type = event_type(args);
    let options = subscription_options(args)?;
    let limit = match parse_flag(args, "--count") {
        Some(n) => Some(n.parse::<usize>().context("--count must be a number")?),
        None => None,
    };

    eprintln!(
        "Watching {} for {}",
        config.url,
        Query::new(Some(&event_type), &options)
    );
    let manager = SubscriptionManager::new(config);
    manager.add_listener(LifecycleKind::Open, |_| eprintln!("  connected"))?;
    manager.add_listener(LifecycleKind::Error, |event| {
        match event {
            LifecycleEvent::Error(e) if e.is_rpc_error() => eprintln!("  rejected: {e}"),
            LifecycleEvent::Error(e) => eprintln!("  error: {e}"),
            _ => {}
        }
    })?;
    manager.add_listener(LifecycleKind::Close, |event| {
        if let LifecycleEvent::Close { clean: false } = event {
            eprintln!("  disconnected, reconnecting");
        }
    })?;

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    if has_flag(args, "--frames") {
        let listener = EventListener::new(move |frame| {
            let _ = tx.send(frame.raw.to_string());
        });
        manager.subscribe(listener, event_type, options)?;
    } else {
        let (_listener, mut attrs_rx) = manager.subscribe_channel(event_type, options)?;
        tokio::spawn(async move {
            while let Some(attrs) = attrs_rx.recv().await {
                let sorted: BTreeMap<_, _> = attrs.into_iter().collect();
                if let Ok(line) = serde_json::to_string(&sorted) {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
            }
        });
    }

    let mut printed = 0usize;
    loop {
        tokio::select! {
            line = rx.recv() => match line {
                Some(line) => {
                    println!("{line}");
                    printed += 1;
                    if limit.map_or(false, |n| printed >= n) {
                        break;
                    }
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    manager.close().await?;
    Ok(())
}

fn cmd_query(args: &[String]) -> anyhow::Result<()> {
    let event_type = event_type(args);
    let options = subscription_options(args)?;
    println!("{}", Query::new(Some(&event_type), &options));
    Ok(())
}

fn manager_config(args: &[String]) -> anyhow::Result<ManagerConfig> {
    let mut config = match parse_flag(args, "--config") {
        Some(path) => {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {path}"))?;
            serde_json::from_str(&text).with_context(|| format!("parsing {path}"))?
        }
        None => ManagerConfig::default(),
    };
    if let Some(url) = parse_flag(args, "--url") {
        config.url = url;
    }
    if !config.url.starts_with("ws://") && !config.url.starts_with("wss://") {
        bail!("--url must be a ws:// or wss:// endpoint, got {}", config.url);
    }
    Ok(config)
}

fn event_type(args: &[String]) -> EventType {
    parse_flag(args, "--event")
        .and_then(|e| e.parse().ok())
        .unwrap_or(EventType::Tx)
}

fn subscription_options(args: &[String]) -> anyhow::Result<SubscriptionOptions> {
    let mut options = SubscriptionOptions::new();
    if let Some(action) = parse_flag(args, "--action") {
        options = options.message_action(action);
    }
    if let Some(hash) = parse_flag(args, "--hash") {
        options = options.hash_key(hash);
    }
    if let Some(height) = parse_flag(args, "--height") {
        options = options.block_height(height.parse().context("--height must be a number")?);
    }
    if let Some(height) = parse_flag(args, "--tx-height") {
        options = options.indexing_height(height.parse().context("--tx-height must be a number")?);
    }
    Ok(options)
}

fn log_config(args: &[String]) -> LogConfig {
    let mut config = LogConfig::default();
    if let Some(level) = parse_flag(args, "--log-level") {
        config.level = level;
    }
    for directive in parse_flags(args, "--log-component") {
        if let Some((component, level)) = directive.split_once('=') {
            config.components.insert(component.to_string(), level.to_string());
        }
    }
    config.json = has_flag(args, "--json");
    config
}

fn parse_flag(args: &[String], flag: &str) -> Option<String> {
    let pos = args.iter().position(|a| a == flag)?;
    args.get(pos + 1).cloned()
}

/// Every value given for a repeatable flag.
fn parse_flags(args: &[String], flag: &str) -> Vec<String> {
    args.windows(2)
        .filter(|pair| pair[0] == flag)
        .map(|pair| pair[1].clone())
        .collect()
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

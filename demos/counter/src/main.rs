//! Hammer sharded counters from many concurrent writers.
//!
//! Every writer sends increments through the exported [tally_counter::Mailbox] while an optimistic
//! [tally_counter::Binding] watches the first counter. Once all writers finish, the demo prints
//! each counter's total, how many shard records back it, and the collected metrics.
//!
//! # Usage
//!
//! ```sh
//! cargo run --release --bin tally-demo -- --counters visits,signups --writers 32 --increments 100
//! ```
//!
//! ## Shard Configuration
//!
//! Shard counts are read from a YAML file:
//!
//! ```yaml
//! shards:
//!   visits: 16
//! default_shards: 2
//! ```
//!
//! ```sh
//! cargo run --release --bin tally-demo -- --config shards.yaml --counters visits,signups
//! ```

use clap::{builder::NonEmptyStringValueParser, value_parser, Arg, Command};
use commonware_runtime::{tokio, Metrics, Runner, Spawner};
use futures::future::try_join_all;
use std::{fs, time::Duration};
use tally_counter::{Binding, Client, Config, Engine, Operations};
use tally_store::memory::Memory;
use tracing::{error, info, Level};

fn main() {
    // Parse arguments
    let matches = Command::new("tally-demo")
        .about("increment sharded counters from concurrent writers")
        .arg(
            Arg::new("config")
                .long("config")
                .required(false)
                .help("YAML file with per-counter shard counts"),
        )
        .arg(
            Arg::new("counters")
                .long("counters")
                .required(false)
                .value_delimiter(',')
                .default_value("accomplishments")
                .value_parser(NonEmptyStringValueParser::new())
                .help("Comma-separated counter names (each non-empty)"),
        )
        .arg(
            Arg::new("writers")
                .long("writers")
                .required(false)
                .default_value("16")
                .value_parser(value_parser!(usize)),
        )
        .arg(
            Arg::new("increments")
                .long("increments")
                .required(false)
                .default_value("100")
                .value_parser(value_parser!(usize))
                .help("Increments per writer per counter"),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .required(false)
                .default_value("info")
                .value_parser(value_parser!(Level)),
        )
        .get_matches();

    // Create logger
    let level = *matches
        .get_one::<Level>("log-level")
        .expect("Please provide log level");
    tracing_subscriber::fmt().with_max_level(level).init();

    // Load shard configuration
    let config = match matches.get_one::<String>("config") {
        Some(path) => {
            let raw = fs::read_to_string(path).expect("Could not read config");
            serde_yaml::from_str::<Config>(&raw).expect("Config not well-formed")
        }
        None => Config::default(),
    };
    info!(?config, "loaded shard configuration");
    let counters: Vec<String> = matches
        .get_many::<String>("counters")
        .map(|names| names.cloned().collect())
        .unwrap_or_default();
    let Some(watched) = counters.first().cloned() else {
        error!("no counters provided");
        return;
    };
    let writers = *matches
        .get_one::<usize>("writers")
        .expect("Please provide writers");
    let increments = *matches
        .get_one::<usize>("increments")
        .expect("Please provide increments");

    // Start runtime
    let executor = tokio::Runner::default();
    executor.start(|context| async move {
        let store = Memory::new(context.with_label("store"));
        let engine = Engine::new(context.with_label("engine"), store);
        let client = Client::new(engine, config);
        let (actor, mailbox) = client.api(context.with_label("api"), 1024);
        actor.start();

        // Watch the first counter
        let binding = Binding::new(mailbox.clone(), watched);
        let _subscription =
            binding.subscribe(context.with_label("binding"), Duration::from_millis(250));

        // Spawn writers
        let mut handles = Vec::with_capacity(writers);
        for writer in 0..writers {
            let mut mailbox = mailbox.clone();
            let counters = counters.clone();
            handles.push(
                context
                    .with_label(&format!("writer_{writer}"))
                    .spawn(move |_| async move {
                        for _ in 0..increments {
                            for name in &counters {
                                mailbox.add(name.clone()).await?;
                            }
                        }
                        Ok::<_, tally_counter::Error>(())
                    }),
            );
        }
        for result in try_join_all(handles).await.expect("Writer task failed") {
            result.expect("Writer failed");
        }

        // Report
        for name in &counters {
            let total = client.count(name).await.expect("Count failed");
            let shards = client
                .engine()
                .shards(name)
                .await
                .expect("Shard scan failed");
            info!(
                name = %name,
                total,
                records = shards.len(),
                configured = client.config().shards_for(name),
                "counter"
            );
        }
        info!(
            name = binding.name(),
            value = ?binding.count(),
            "last observed by binding"
        );
        println!("{}", context.encode());
    });
}

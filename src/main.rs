//! `rendezvous` command-line interface.
//!
//! ```text
//! rendezvous [--config rendezvous.toml] [--network NAME] <command>
//!
//!   confirm <HASH>          wait for a transaction to reach the confirmation depth
//!   logs <CONTRACT>         print decoded logs over a block range
//!   watch                   stream decoded events as they are mined
//!   round                   run a generic request/fulfillment round
//!   raffle                  enter a VRF raffle and/or draw a winner
//!   mint                    mint a VRF-randomized NFT
//!   lend                    run the deposit/borrow/repay lending sequence
//!   serve                   run the log feed and the admin endpoint
//! ```
//!
//! With `--admin` (or `admin.enabled`), `round`, `raffle`, `mint` and `serve`
//! expose the admin endpoint for the interactions running in this process.
//!
//! Signing commands read the private key from `RENDEZVOUS_PRIVATE_KEY`.

use alloy::primitives::{Address, Bytes, TxHash, U256};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tokio::task::JoinHandle;

use tx_rendezvous::config::load_or_default;
use tx_rendezvous::flows::lending::LendingFlow;
use tx_rendezvous::flows::{randomness, transact};
use tx_rendezvous::interaction::RoundOutcome;
use tx_rendezvous::ledger::LogQuery;
use tx_rendezvous::lifecycle::{signals, AdminTasks};
use tx_rendezvous::observability::{logging, metrics};
use tx_rendezvous::rendezvous::EventFilter;
use tx_rendezvous::{ContractCall, CorrelationSpec, RendezvousResult, RoundSpec, Runtime};

#[derive(Parser)]
#[command(name = "rendezvous")]
#[command(about = "Submit ledger interactions and wait for their confirmations and fulfillments", long_about = None)]
struct Cli {
    /// Configuration file; defaults apply when it does not exist
    #[arg(short, long, default_value = "rendezvous.toml")]
    config: PathBuf,

    /// Named network from the configuration
    #[arg(short, long)]
    network: Option<String>,

    /// Serve the admin endpoint while the command runs
    #[arg(long, global = true)]
    admin: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Wait for a transaction to reach the confirmation depth
    Confirm {
        hash: TxHash,
        #[arg(long)]
        confirmations: Option<u32>,
    },
    /// Print decoded logs of a contract over a block range
    Logs {
        contract: String,
        #[arg(long)]
        from_block: Option<u64>,
        #[arg(long)]
        to_block: Option<u64>,
        #[arg(long)]
        event: Option<String>,
    },
    /// Stream decoded events as they are mined
    Watch {
        /// Contract names or addresses; all configured contracts when omitted
        #[arg(long)]
        contract: Vec<String>,
        #[arg(long)]
        event: Option<String>,
    },
    /// Run a request/fulfillment round against any contract
    Round {
        contract: String,
        /// Hex-encoded calldata
        #[arg(long)]
        data: Bytes,
        /// Value to send, in wei
        #[arg(long, default_value = "0")]
        value: U256,
        #[arg(long)]
        request_event: String,
        #[arg(long)]
        request_field: String,
        #[arg(long)]
        fulfillment_event: String,
        /// Defaults to the request field
        #[arg(long)]
        fulfillment_field: Option<String>,
        /// Contract emitting the fulfillment event
        #[arg(long)]
        fulfillment_emitter: Option<String>,
        #[arg(long)]
        confirmations: Option<u32>,
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
    /// Enter a VRF raffle and/or draw a winner
    Raffle {
        raffle: String,
        coordinator: String,
        /// Enter the raffle with the entrance fee first
        #[arg(long)]
        enter: bool,
        /// Answer the request through the mock coordinator (implied on development networks)
        #[arg(long)]
        mock_fulfill: bool,
    },
    /// Mint a VRF-randomized NFT
    Mint {
        nft: String,
        coordinator: String,
        #[arg(long)]
        mock_fulfill: bool,
    },
    /// Run the deposit/borrow/repay lending sequence
    Lend,
    /// Run the log feed and the admin endpoint until interrupted
    Serve,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let mut config = load_or_default(&cli.config, cli.network.as_deref())?;
    if cli.admin {
        config.admin.enabled = true;
    }

    logging::init_logging(&config.observability)?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        network = ?config.ledger.network,
        chain_id = config.ledger.chain_id,
        "rendezvous starting"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let runtime = Runtime::start(config).await?;
    signals::install(&runtime.shutdown);

    match cli.command {
        Commands::Confirm {
            hash,
            confirmations,
        } => confirm(&runtime, hash, confirmations).await?,
        Commands::Logs {
            contract,
            from_block,
            to_block,
            event,
        } => logs(&runtime, &contract, from_block, to_block, event).await?,
        Commands::Watch { contract, event } => watch(&runtime, contract, event).await?,
        Commands::Round {
            contract,
            data,
            value,
            request_event,
            request_field,
            fulfillment_event,
            fulfillment_field,
            fulfillment_emitter,
            confirmations,
            timeout_secs,
        } => {
            let to = runtime.contract(&contract)?;
            let mut fulfillment = CorrelationSpec::new(
                fulfillment_event,
                fulfillment_field.unwrap_or_else(|| request_field.clone()),
            );
            let mut watched = vec![to];
            if let Some(emitter) = fulfillment_emitter {
                let emitter = runtime.contract(&emitter)?;
                fulfillment = fulfillment.from_emitter(emitter);
                watched.push(emitter);
            }
            let spec = RoundSpec::new(
                "round",
                ContractCall::new(to, data).with_value(value),
                CorrelationSpec::new(request_event, request_field),
                fulfillment,
            )
            .with_confirmations(confirmations.unwrap_or(runtime.config.confirmations.required))
            .with_fulfillment_timeout(
                timeout_secs
                    .map(Duration::from_secs)
                    .unwrap_or(runtime.config.fulfillment.timeout()),
            );

            let runner = runtime.runner()?;
            let feed = start_feed(&runtime, watched).await?;
            let admin = runtime.start_admin().await?;
            let outcome = runner.run_until(spec, runtime.shutdown.cancelled()).await;
            stop_background(&runtime, feed, admin).await;
            print_json(&outcome_json(&outcome?))?;
        }
        Commands::Raffle {
            raffle,
            coordinator,
            enter,
            mock_fulfill,
        } => raffle_round(&runtime, &raffle, &coordinator, enter, mock_fulfill).await?,
        Commands::Mint {
            nft,
            coordinator,
            mock_fulfill,
        } => mint_round(&runtime, &nft, &coordinator, mock_fulfill).await?,
        Commands::Lend => {
            let lending = runtime.config.lending.clone().unwrap_or_default();
            let flow = LendingFlow::new(runtime.submitter()?, runtime.waiter(), &lending)?;
            let report = flow.run().await?;
            print_json(&serde_json::to_value(&report)?)?;
        }
        Commands::Serve => serve(&runtime).await?,
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

async fn confirm(runtime: &Runtime, hash: TxHash, confirmations: Option<u32>) -> RendezvousResult<()> {
    let waiter = runtime.waiter();
    let required = confirmations.unwrap_or(waiter.policy().required);
    let confirmed = waiter
        .wait_with(hash, required, runtime.shutdown.cancelled())
        .await?;

    print_json(&confirmed.to_json()?)
}

async fn logs(
    runtime: &Runtime,
    contract: &str,
    from_block: Option<u64>,
    to_block: Option<u64>,
    event: Option<String>,
) -> RendezvousResult<()> {
    let address = runtime.contract(contract)?;
    let range = runtime.config.feed.max_block_range.max(1);
    let to_block = match to_block {
        Some(block) => block,
        None => runtime.ledger.block_number().await?,
    };
    let from_block = from_block.unwrap_or(to_block.saturating_sub(range - 1));

    let filter = EventFilter {
        event,
        address: Some(address),
    };
    let mut start = from_block;
    while start <= to_block {
        let end = to_block.min(start + range - 1);
        let raw = runtime
            .ledger
            .logs(&LogQuery::new(vec![address], start, end))
            .await?;
        for record in runtime.registry.decode_all(&raw) {
            if filter.matches(&record) {
                print_json(&record.to_json())?;
            }
        }
        start = end + 1;
    }
    Ok(())
}

async fn watch(runtime: &Runtime, contracts: Vec<String>, event: Option<String>) -> RendezvousResult<()> {
    let addresses = contracts
        .iter()
        .map(|c| runtime.contract(c))
        .collect::<RendezvousResult<Vec<Address>>>()?;

    let mut subscription = runtime.hub.subscribe(EventFilter {
        event,
        address: None,
    });
    let feed = start_feed(runtime, addresses).await?;
    let cancelled = runtime.shutdown.cancelled();
    tokio::pin!(cancelled);

    loop {
        tokio::select! {
            observed = subscription.recv() => match observed {
                Some(observed) => print_json(&observed.record.to_json())?,
                None => break,
            },
            _ = &mut cancelled => break,
        }
    }

    subscription.release();
    stop_feed(runtime, feed).await;
    Ok(())
}

async fn raffle_round(
    runtime: &Runtime,
    raffle: &str,
    coordinator: &str,
    enter: bool,
    mock_fulfill: bool,
) -> RendezvousResult<()> {
    let raffle = runtime.contract(raffle)?;
    let coordinator = runtime.contract(coordinator)?;
    let runner = runtime.runner()?;
    let waiter = runtime.waiter();

    if enter {
        let fee = randomness::entrance_fee(runtime.ledger.as_ref(), raffle).await?;
        let entered = transact(runner.submitter(), &waiter, randomness::enter_raffle(raffle, fee)).await?;
        tracing::info!(tx_hash = %entered.hash, fee = %fee, "Entered raffle");
    }

    let spec = randomness::raffle_draw(raffle, coordinator)
        .with_confirmations(runtime.config.confirmations.required)
        .with_fulfillment_timeout(runtime.config.fulfillment.timeout());

    let feed = start_feed(runtime, vec![raffle, coordinator]).await?;
    let admin = runtime.start_admin().await?;
    let outcome = if mock_fulfill || runtime.config.ledger.development {
        let fulfiller =
            randomness::MockFulfiller::new(runner.submitter().clone(), waiter.clone(), coordinator, raffle);
        runner
            .run_with_actor_until(
                spec,
                move |request| async move { fulfiller.fulfill(request).await },
                runtime.shutdown.cancelled(),
            )
            .await
    } else {
        runner.run_until(spec, runtime.shutdown.cancelled()).await
    };
    stop_background(runtime, feed, admin).await;
    let outcome = outcome?;

    let winner = randomness::recent_winner(runtime.ledger.as_ref(), raffle).await?;
    let mut value = outcome_json(&outcome);
    value["winner"] = serde_json::Value::String(winner.to_string());
    print_json(&value)
}

async fn mint_round(runtime: &Runtime, nft: &str, coordinator: &str, mock_fulfill: bool) -> RendezvousResult<()> {
    let nft = runtime.contract(nft)?;
    let coordinator = runtime.contract(coordinator)?;
    let runner = runtime.runner()?;
    let waiter = runtime.waiter();

    let fee = randomness::mint_fee(runtime.ledger.as_ref(), nft).await?;
    let spec = randomness::nft_mint(nft, coordinator, fee)
        .with_confirmations(runtime.config.confirmations.required)
        .with_fulfillment_timeout(runtime.config.fulfillment.timeout());

    let feed = start_feed(runtime, vec![nft, coordinator]).await?;
    let admin = runtime.start_admin().await?;
    let outcome = if mock_fulfill || runtime.config.ledger.development {
        let fulfiller = randomness::MockFulfiller::new(runner.submitter().clone(), waiter.clone(), coordinator, nft);
        runner
            .run_with_actor_until(
                spec,
                move |request| async move { fulfiller.fulfill(request).await },
                runtime.shutdown.cancelled(),
            )
            .await
    } else {
        runner.run_until(spec, runtime.shutdown.cancelled()).await
    };
    stop_background(runtime, feed, admin).await;
    let outcome = outcome?;

    // NftMinted is emitted by the consumer inside the coordinator's fulfillment transaction
    let fulfillment_tx = randomness::fulfillment_records(&waiter, &outcome.fulfillment).await?;
    let mut value = outcome_json(&outcome);
    if let Ok(minted) = fulfillment_tx.find_event("NftMinted") {
        value["minted"] = minted.to_json();
    }
    print_json(&value)
}

async fn serve(runtime: &Runtime) -> RendezvousResult<()> {
    let cancelled = runtime.shutdown.cancelled();
    let feed = start_feed(runtime, Vec::new()).await?;
    let admin = runtime.start_admin().await?;
    if admin.is_none() {
        tracing::warn!("Admin endpoint disabled, running the log feed only");
    }

    cancelled.await;
    stop_background(runtime, feed, admin).await;
    runtime.hub.close();
    Ok(())
}

async fn start_feed(runtime: &Runtime, addresses: Vec<Address>) -> RendezvousResult<JoinHandle<()>> {
    let mut feed = runtime.feed(addresses);
    feed.prime().await?;
    Ok(feed.spawn(&runtime.shutdown))
}

async fn stop_feed(runtime: &Runtime, feed: JoinHandle<()>) {
    runtime.shutdown.trigger();
    if let Err(e) = feed.await {
        tracing::warn!(error = %e, "Log feed task failed");
    }
}

async fn stop_background(runtime: &Runtime, feed: JoinHandle<()>, admin: Option<AdminTasks>) {
    stop_feed(runtime, feed).await;
    if let Some(admin) = admin {
        admin.join().await;
    }
}

fn outcome_json(outcome: &RoundOutcome) -> serde_json::Value {
    serde_json::json!({
        "interaction": outcome.id.to_string(),
        "request_tx": outcome.pending.hash.to_string(),
        "request_block": outcome.confirmed.block_number,
        "confirmations": outcome.confirmed.confirmations,
        "token": outcome.token.to_string(),
        "fulfillment": outcome.fulfillment.to_json(),
    })
}

fn print_json(value: &serde_json::Value) -> RendezvousResult<()> {
    let text = serde_json::to_string_pretty(value)?;
    println!("{}", text);
    Ok(())
}

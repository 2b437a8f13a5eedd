use alloy::primitives::Address;
use clap::{
    ArgGroup,
    Parser,
    Subcommand,
    ValueEnum,
};
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use deployments::{
    DeploymentEnv,
    DeploymentStore,
};
use prediction_client::{
    AppController,
    AppEvent,
    bets::fetch_user_bets,
    chain::ChainClient,
    clock::SystemClock,
    config::{
        AppConfig,
        NetworkTarget,
        WalletConfig,
        resolve_contract,
    },
    types::{
        Position,
        Wei,
    },
    wallets::{
        find_keystore,
        resolve_keystore_dir,
        unlock_keystore,
    },
};
use std::{
    fs,
    path::{
        Path,
        PathBuf,
    },
    sync::{
        Arc,
        OnceLock,
    },
    time::Duration,
};
use tokio::{
    sync::mpsc,
    task::JoinHandle,
};
use tracing::{
    error,
    info,
    warn,
};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{
        RollingFileAppender,
        Rotation,
    },
};
use tracing_subscriber::EnvFilter;

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

#[derive(Parser, Debug)]
#[command(
    name = "prediction",
    about = "Watch price prediction rounds, place bets and read bet history",
    version
)]
struct Cli {
    /// Network to connect to
    #[arg(long, value_enum, default_value_t = Network::Polygon)]
    network: Network,

    /// Override the RPC URL of the selected network
    #[arg(long)]
    rpc_url: Option<String>,

    /// Prediction contract address (defaults to the recorded deployment)
    #[arg(long)]
    contract: Option<Address>,

    /// Keystore name used to sign bets
    #[arg(long, conflicts_with = "address")]
    wallet: Option<String>,

    /// Override the keystore directory (defaults to ~/.foundry/keystores)
    #[arg(long)]
    wallet_dir: Option<String>,

    /// Follow an account's bets without a wallet
    #[arg(long)]
    address: Option<Address>,

    /// Seconds between refresh cycles
    #[arg(long, default_value_t = 15)]
    poll_secs: u64,

    /// Directory for the daily log files
    #[arg(long, default_value = ".logs")]
    log_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Network {
    Polygon,
    Amoy,
    Local,
}

impl From<Network> for DeploymentEnv {
    fn from(network: Network) -> Self {
        match network {
            Network::Polygon => DeploymentEnv::Polygon,
            Network::Amoy => DeploymentEnv::Amoy,
            Network::Local => DeploymentEnv::Local,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Stream game state, rounds, countdown and bets until Ctrl-C
    Watch,
    /// Place a single bet on the current epoch
    #[command(group(ArgGroup::new("side").args(["bull", "bear"]).required(true)))]
    Bet {
        #[arg(long)]
        bull: bool,
        #[arg(long)]
        bear: bool,
        /// Amount in the native token, e.g. 0.01
        #[arg(long)]
        amount: String,
    },
    /// Print the account's bet history once
    History,
    /// Record the contract address for the selected network
    Register {
        #[arg(long)]
        contract: Address,
        #[arg(long)]
        chain_id: Option<u64>,
    },
}

impl Cli {
    fn app_config(&self) -> Result<AppConfig> {
        let network = NetworkTarget::new(self.network.into(), self.rpc_url.clone());
        let wallet = match (&self.wallet, self.address) {
            (Some(name), _) => WalletConfig::Keystore {
                name: name.clone(),
                dir: resolve_keystore_dir(self.wallet_dir.as_deref())
                    .wrap_err("resolving keystore directory")?,
            },
            (None, Some(address)) => WalletConfig::WatchOnly { address },
            (None, None) => WalletConfig::None,
        };
        if self.poll_secs == 0 {
            return Err(eyre!("--poll-secs must be at least 1"));
        }
        Ok(AppConfig {
            network,
            wallet,
            contract: self.contract,
            poll_interval: Duration::from_secs(self.poll_secs),
        })
    }
}

fn init_tracing(log_dir: &Path) -> Result<()> {
    fs::create_dir_all(log_dir)
        .wrap_err_with(|| format!("creating log directory {}", log_dir.display()))?;
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("prediction")
        .filename_suffix("log")
        .build(log_dir)
        .wrap_err("initializing log file")?;
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let _ = LOG_GUARD.set(guard);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
        .map_err(|err| eyre!("failed to install tracing subscriber: {err}"))
}

fn print_event(event: &AppEvent) {
    match serde_json::to_string(event) {
        Ok(line) => println!("{line}"),
        Err(err) => warn!(?err, "failed to serialize event"),
    }
}

fn spawn_printer(mut events: mpsc::UnboundedReceiver<AppEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            print_event(&event);
        }
    })
}

/// Resolves the contract and wallet and binds the chain client. Failures are
/// reported as a `connection_failed` event before being returned.
async fn connect_client(config: &AppConfig) -> Result<(ChainClient, Option<Address>)> {
    let outcome = async {
        let store = DeploymentStore::new(config.network.env())
            .map_err(|err| eyre!("{err:#}"))
            .wrap_err("opening deployment store")?;
        let target = resolve_contract(config, &store)?;

        let (signer, account) = match &config.wallet {
            WalletConfig::Keystore { name, dir } => {
                let descriptor =
                    find_keystore(dir, name).wrap_err("locating requested keystore")?;
                let signer = unlock_keystore(&descriptor).wrap_err("unlocking keystore")?;
                let account = signer.address();
                (Some(signer), Some(account))
            }
            WalletConfig::WatchOnly { address } => (None, Some(*address)),
            WalletConfig::None => (None, None),
        };

        let client = ChainClient::connect(
            config.network.url(),
            target.address,
            signer,
            target.expected_chain_id,
        )
        .await?;
        Ok::<_, color_eyre::Report>((client, account))
    }
    .await;

    if let Err(err) = &outcome {
        error!(?err, "setup failed");
        print_event(&AppEvent::ConnectionFailed {
            reason: format!("{err:#}"),
        });
    }
    outcome
}

async fn start_controller(
    config: &AppConfig,
) -> Result<(AppController<ChainClient>, JoinHandle<()>)> {
    let (client, account) = connect_client(config).await?;
    let (events, rx) = mpsc::unbounded_channel();
    let printer = spawn_printer(rx);
    let mut controller = AppController::new(Arc::new(client), events, Arc::new(SystemClock))
        .with_poll_interval(config.poll_interval);
    controller.connect(account).await?;
    Ok((controller, printer))
}

async fn finish(mut controller: AppController<ChainClient>, printer: JoinHandle<()>) -> Result<()> {
    controller.shutdown().await?;
    drop(controller);
    printer.await.wrap_err("event printer panicked")
}

async fn watch(config: AppConfig) -> Result<()> {
    let (controller, printer) = start_controller(&config).await?;
    info!(network = %config.network.env(), "watching rounds");
    tokio::signal::ctrl_c()
        .await
        .wrap_err("waiting for Ctrl-C failed")?;
    info!("Ctrl-C received; shutting down");
    finish(controller, printer).await
}

async fn bet(config: AppConfig, position: Position, amount: Wei) -> Result<()> {
    if !matches!(config.wallet, WalletConfig::Keystore { .. }) {
        return Err(eyre!("Placing a bet requires --wallet"));
    }
    let (controller, printer) = start_controller(&config).await?;
    if let Some(mut snapshots) = controller.subscribe() {
        snapshots
            .changed()
            .await
            .wrap_err("poller stopped before the first refresh")?;
    }
    let outcome = controller.place_bet(position, amount).await;
    finish(controller, printer).await?;
    outcome.map(|_| ())
}

async fn history(config: AppConfig) -> Result<()> {
    let (client, account) = connect_client(&config).await?;
    let account =
        account.ok_or_else(|| eyre!("Bet history requires --wallet or --address"))?;
    let bets = fetch_user_bets(&client, account).await?;
    print_event(&AppEvent::BetHistoryUpdated { bets });
    Ok(())
}

fn register(env: DeploymentEnv, rpc_url: &str, contract: Address, chain_id: Option<u64>) -> Result<()> {
    let record = deployments::record_deployment(env, contract.to_string(), rpc_url, chain_id)
        .map_err(|err| eyre!("{err:#}"))?;
    println!(
        "{}",
        serde_json::to_string(&record).wrap_err("serializing deployment record")?
    );
    info!(%env, %contract, "deployment recorded");
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_tracing(&cli.log_dir)?;
    deployments::ensure_structure()
        .map_err(|err| eyre!("{err:#}"))
        .wrap_err("initializing deployment directories")?;

    let config = cli.app_config()?;
    match cli.command {
        Command::Watch => watch(config).await,
        Command::Bet { bull, amount, .. } => {
            let position = if bull { Position::Bull } else { Position::Bear };
            let amount = Wei::parse_ether(&amount)?;
            bet(config, position, amount).await
        }
        Command::History => history(config).await,
        Command::Register { contract, chain_id } => {
            register(config.network.env(), config.network.url(), contract, chain_id)
        }
    }
}

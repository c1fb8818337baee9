use alloy::primitives::{
    Address,
    U256,
};
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use tracing_subscriber::EnvFilter;

mod client;
mod grid;
mod nft;
mod ui;
mod wallets;

fn print_usage_and_exit() -> ! {
    println!(
        "Usage: random-box [--testnet | --local] [--rpc-url <url>]\n\
         [--wallet <name>] [--wallet-dir <path>]\n\
         [--contract <address>] [--box <id>]\n\
         [--index-url <url>] [--app-id <id>] [--marketplace-url <url>] [--backup]\n\
         \n\
         Flags:\n\
           --testnet                 Connect to the Rinkeby test network (default RPC {})\n\
           --local                   Connect to a local Ethereum node (default RPC {})\n\
           --rpc-url <url>           Override the RPC URL for the selected network\n\
           --wallet <name>           Keystore wallet to unlock for the session\n\
           --wallet-dir <path>       Override the wallet directory (defaults to ~/.random-box/wallets)\n\
           --contract <address>      RandomBox contract address (or RANDOMBOX_ADDRESS)\n\
           --box <id>                Jump straight to one box's detail view\n\
           --index-url <url>         NFT index API base URL (or RANDOMBOX_INDEX_URL)\n\
           --app-id <id>             NFT index API application id (or RANDOMBOX_INDEX_APP_ID)\n\
           --marketplace-url <url>   Marketplace API base URL (default {})\n\
           --backup                  Serve account lookups from the marketplace API instead of the index",
        client::DEFAULT_TESTNET_RPC_URL,
        client::DEFAULT_LOCAL_RPC_URL,
        client::DEFAULT_MARKETPLACE_URL,
    );
    std::process::exit(0);
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn parse_cli_args() -> Result<client::AppConfig> {
    #[derive(Clone, Copy)]
    enum NetworkFlag {
        Testnet,
        Local,
    }

    let mut args = std::env::args().skip(1);
    let mut network_flag: Option<NetworkFlag> = None;
    let mut custom_url: Option<String> = None;
    let mut wallet_dir: Option<String> = None;
    let mut wallet_name: Option<String> = None;
    let mut contract: Option<String> = None;
    let mut initial_box: Option<String> = None;
    let mut index_url: Option<String> = None;
    let mut app_id: Option<String> = None;
    let mut marketplace_url: Option<String> = None;
    let mut backup = false;

    let take_value = |args: &mut dyn Iterator<Item = String>,
                          slot: &mut Option<String>,
                          flag: &str|
     -> Result<()> {
        let value = args
            .next()
            .ok_or_else(|| eyre!("{flag} requires an argument"))?;
        if slot.is_some() {
            return Err(eyre!("{flag} may only be specified once"));
        }
        *slot = Some(value);
        Ok(())
    };

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--testnet" => {
                if network_flag.is_some() {
                    return Err(eyre!(
                        "Multiple network flags provided; choose one of --testnet/--local"
                    ));
                }
                network_flag = Some(NetworkFlag::Testnet);
            }
            "--local" => {
                if network_flag.is_some() {
                    return Err(eyre!(
                        "Multiple network flags provided; choose one of --testnet/--local"
                    ));
                }
                network_flag = Some(NetworkFlag::Local);
            }
            "--rpc-url" => {
                take_value(&mut args, &mut custom_url, "--rpc-url")?;
                if network_flag.is_none() {
                    return Err(eyre!(
                        "--rpc-url must follow a network flag (--testnet/--local)"
                    ));
                }
            }
            "--wallet-dir" => take_value(&mut args, &mut wallet_dir, "--wallet-dir")?,
            "--wallet" => take_value(&mut args, &mut wallet_name, "--wallet")?,
            "--contract" => take_value(&mut args, &mut contract, "--contract")?,
            "--box" => take_value(&mut args, &mut initial_box, "--box")?,
            "--index-url" => take_value(&mut args, &mut index_url, "--index-url")?,
            "--app-id" => take_value(&mut args, &mut app_id, "--app-id")?,
            "--marketplace-url" => {
                take_value(&mut args, &mut marketplace_url, "--marketplace-url")?
            }
            "--backup" => backup = true,
            "--help" | "-h" => print_usage_and_exit(),
            other => return Err(eyre!("Unknown argument: {other}")),
        }
    }

    let network = match network_flag {
        None => {
            return Err(eyre!("Select a network with --testnet or --local"));
        }
        Some(NetworkFlag::Testnet) => client::NetworkTarget::Testnet {
            url: custom_url
                .unwrap_or_else(|| client::DEFAULT_TESTNET_RPC_URL.to_string()),
        },
        Some(NetworkFlag::Local) => client::NetworkTarget::LocalNode {
            url: custom_url.unwrap_or_else(|| client::DEFAULT_LOCAL_RPC_URL.to_string()),
        },
    };

    let wallet =
        wallet_name.ok_or_else(|| eyre!("Specify --wallet <name> to unlock a wallet"))?;
    let dir = wallets::resolve_wallet_dir(wallet_dir.as_deref())?;
    let wallet = client::WalletConfig::Keystore { name: wallet, dir };

    let contract_address: Address = contract
        .or_else(|| env_var("RANDOMBOX_ADDRESS"))
        .ok_or_else(|| {
            eyre!("Specify the contract with --contract <address> or RANDOMBOX_ADDRESS")
        })?
        .parse()
        .wrap_err("Invalid contract address")?;

    let initial_box = initial_box
        .map(|raw| raw.parse::<U256>().wrap_err("Invalid --box id"))
        .transpose()?;

    let lookup = client::LookupConfig {
        index_url: index_url.or_else(|| env_var("RANDOMBOX_INDEX_URL")),
        index_app_id: app_id.or_else(|| env_var("RANDOMBOX_INDEX_APP_ID")),
        marketplace_url: marketplace_url
            .or_else(|| env_var("RANDOMBOX_MARKETPLACE_URL"))
            .unwrap_or_else(|| client::DEFAULT_MARKETPLACE_URL.to_string()),
        use_marketplace: backup || env_var("RANDOMBOX_BACKUP").is_some(),
    };

    Ok(client::AppConfig {
        network,
        wallet,
        contract_address,
        lookup,
        initial_box,
    })
}

fn init_logging() {
    // Log to a rolling file; stdout belongs to the terminal UI.
    let appender = tracing_appender::rolling::daily("logs", "random-box.log");
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(appender)
        .with_ansi(false)
        .try_init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;
    init_logging();
    tracing::info!("starting random-box client");
    let app_config = parse_cli_args()?;
    client::run_app(app_config).await
}

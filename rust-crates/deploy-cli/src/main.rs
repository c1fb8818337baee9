mod wallets;

use alloy::{
    network::{
        EthereumWallet,
        TransactionBuilder,
    },
    primitives::{
        Address,
        B256,
        U256,
        address,
        b256,
    },
    providers::{
        Provider,
        ProviderBuilder,
    },
    rpc::types::TransactionRequest,
    sol_types::SolConstructor,
};
use anyhow::{
    Context,
    Result,
};
use clap::{
    ArgGroup,
    Parser,
};
use deployments::{
    DeploymentEnv,
    DeploymentRecord,
    DeploymentStore,
};
use randombox::bindings::RandomBox;
use std::{
    fs,
    path::Path,
};

use crate::wallets::{
    find_wallet,
    resolve_wallet_dir,
    unlock_wallet,
};

const DEFAULT_TESTNET_RPC_URL: &str =
    "https://rinkeby.infura.io/v3/9aa3d95b3bc440fa88ea12eaa4456161";
const DEFAULT_LOCAL_RPC_URL: &str = "http://localhost:8545/";
const TESTNET_CHAIN_ID: u64 = 4;
const BYTECODE_CANDIDATES: [&str; 2] = [
    "./contracts/artifacts/RandomBox.bin",
    "./artifacts/RandomBox.bin",
];

// Chainlink VRF wiring on the Rinkeby test network. Deploys targeting
// testnet always use these; a local chain may override them.
const TESTNET_VRF_COORDINATOR: Address =
    address!("b3dCcb4Cf7a26f6cf6B120Cf5A73875B7BBc655B");
const TESTNET_LINK_TOKEN: Address = address!("01BE23585060835E02B77ef475b0Cc51aA1e0709");
const TESTNET_KEY_HASH: B256 =
    b256!("2ed0feb3e7fd2022120aa84fab1945545a9f2ffc9076fd6156fa96eaff4c1311");
const VRF_FEE_WEI: u128 = 100_000_000_000_000_000; // 0.1 LINK

#[derive(Parser, Debug)]
#[command(
    name = "random-box-deploy",
    about = "Deploy the RandomBox contract and inspect recorded deployments",
    version,
    group(
        ArgGroup::new("network")
            .args(["testnet", "local"])
            .required(true)
    )
)]
struct Args {
    /// Deploy to the Rinkeby test network
    #[arg(long)]
    testnet: bool,

    /// Deploy to a local Ethereum node
    #[arg(long)]
    local: bool,

    /// Override RPC URL
    #[arg(long)]
    rpc_url: Option<String>,

    /// Keystore wallet name
    #[arg(long)]
    wallet: String,

    /// Override the wallet directory (defaults to ~/.random-box/wallets)
    #[arg(long)]
    wallet_dir: Option<String>,

    /// Which action to perform (defaults to deploy)
    #[arg(short, long, value_enum, default_value = "deploy")]
    action: Action,

    /// Path to the compiled contract bytecode (hex)
    #[arg(long)]
    bytecode: Option<String>,

    /// VRF coordinator address (local deploys only)
    #[arg(long)]
    vrf_coordinator: Option<String>,

    /// LINK token address (local deploys only)
    #[arg(long)]
    link_token: Option<String>,

    /// VRF key hash (local deploys only)
    #[arg(long)]
    key_hash: Option<String>,
}

#[derive(Debug, Clone, clap::ValueEnum)]
enum Action {
    Deploy,
    Show,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    deployments::ensure_structure().context("initializing deployment directories")?;

    let (env, default_url) = if args.testnet {
        (DeploymentEnv::Test, DEFAULT_TESTNET_RPC_URL)
    } else {
        (DeploymentEnv::Local, DEFAULT_LOCAL_RPC_URL)
    };
    let store = DeploymentStore::new(env).context("opening deployment store")?;

    if let Action::Show = args.action {
        return show_record(&store, env);
    }

    let rpc_url = args
        .rpc_url
        .clone()
        .unwrap_or_else(|| default_url.to_string());

    let wallet_dir = resolve_wallet_dir(args.wallet_dir.as_deref())
        .context("resolving wallet directory")?;
    let descriptor =
        find_wallet(&wallet_dir, &args.wallet).context("locating requested wallet")?;
    let signer = unlock_wallet(&descriptor).context("unlocking wallet")?;
    let deployer = signer.address();

    let provider = ProviderBuilder::new()
        .wallet(EthereumWallet::from(signer))
        .connect_http(rpc_url.parse().context("parsing RPC URL")?)
        .erased();

    let chain_id = provider
        .get_chain_id()
        .await
        .context("querying chain id")?;
    if matches!(env, DeploymentEnv::Test) && chain_id != TESTNET_CHAIN_ID {
        anyhow::bail!(
            "Provider reports chain id {chain_id}, expected {TESTNET_CHAIN_ID} for the \
             Rinkeby test network"
        );
    }

    let (vrf_coordinator, link_token, key_hash) = constructor_wiring(&args, env)?;

    let bytecode_path = match args.bytecode.as_deref() {
        Some(path) => path.to_string(),
        None => choose_bytecode(&BYTECODE_CANDIDATES)?.to_string(),
    };
    let bytecode = read_bytecode(&bytecode_path)
        .with_context(|| format!("reading contract bytecode from {bytecode_path}"))?;
    let bytecode_hash = deployments::compute_bytecode_hash(&bytecode);

    if let Some(record) = store.load().context("loading deployment records")? {
        if record.is_compatible_with_hash(&bytecode_hash) {
            println!(
                "Identical bytecode already deployed at {} ({}); deploying anyway",
                record.contract_address, record.deployed_at
            );
        }
    }

    let constructor_args = RandomBox::constructorCall {
        vrfCoordinator: vrf_coordinator,
        linkToken: link_token,
        fee: U256::from(VRF_FEE_WEI),
        keyHash: key_hash,
    }
    .abi_encode();
    let mut deploy_code = bytecode;
    deploy_code.extend_from_slice(&constructor_args);

    println!("Deploying RandomBox from {deployer} via {rpc_url}...");
    let tx = TransactionRequest::default().with_deploy_code(deploy_code);
    let receipt = provider
        .send_transaction(tx)
        .await
        .context("submitting deployment transaction")?
        .get_receipt()
        .await
        .context("awaiting deployment receipt")?;

    let contract_address = receipt
        .contract_address
        .context("deployment receipt carried no contract address")?;
    let deployment_block = receipt.block_number;
    println!(
        "RandomBox deployed: {contract_address} (tx: {}) at block {}",
        receipt.transaction_hash,
        deployment_block
            .map(|b| b.to_string())
            .unwrap_or_else(|| String::from("pending"))
    );

    deployments::record_deployment(
        env,
        contract_address.to_string(),
        &bytecode_hash,
        &rpc_url,
        chain_id,
        deployment_block,
        Some(vrf_coordinator.to_string()),
        Some(link_token.to_string()),
        Some(key_hash.to_string()),
    )
    .context("recording deployment")?;
    println!("Deployment metadata written to {}", store.path().display());
    Ok(())
}

/// Testnet deploys are pinned to the Rinkeby Chainlink contracts; overriding
/// them there would produce a box that can never open.
fn constructor_wiring(args: &Args, env: DeploymentEnv) -> Result<(Address, Address, B256)> {
    if matches!(env, DeploymentEnv::Test)
        && (args.vrf_coordinator.is_some()
            || args.link_token.is_some()
            || args.key_hash.is_some())
    {
        anyhow::bail!(
            "--vrf-coordinator/--link-token/--key-hash may only be set for --local deploys"
        );
    }

    let vrf_coordinator = match args.vrf_coordinator.as_deref() {
        Some(raw) => raw
            .parse::<Address>()
            .map_err(|e| anyhow::anyhow!("parsing --vrf-coordinator: {e}"))?,
        None => TESTNET_VRF_COORDINATOR,
    };
    let link_token = match args.link_token.as_deref() {
        Some(raw) => raw
            .parse::<Address>()
            .map_err(|e| anyhow::anyhow!("parsing --link-token: {e}"))?,
        None => TESTNET_LINK_TOKEN,
    };
    let key_hash = match args.key_hash.as_deref() {
        Some(raw) => raw
            .parse::<B256>()
            .map_err(|e| anyhow::anyhow!("parsing --key-hash: {e}"))?,
        None => TESTNET_KEY_HASH,
    };
    Ok((vrf_coordinator, link_token, key_hash))
}

fn show_record(store: &DeploymentStore, env: DeploymentEnv) -> Result<()> {
    match store.load().context("loading deployment records")? {
        Some(DeploymentRecord {
            deployed_at,
            contract_address,
            network_url,
            chain_id,
            deployment_block,
            ..
        }) => {
            println!("Latest {env} deployment:");
            println!("  Contract: {contract_address}");
            println!("  Deployed: {deployed_at}");
            println!("  Network:  {network_url} (chain id {chain_id})");
            if let Some(block) = deployment_block {
                println!("  Block:    {block}");
            }
        }
        None => println!("No deployments recorded for {env}"),
    }
    Ok(())
}

fn choose_bytecode<'a>(paths: &'a [&str]) -> Result<&'a str> {
    paths
        .iter()
        .find(|p| Path::new(p).exists())
        .copied()
        .ok_or_else(|| anyhow::anyhow!("Contract bytecode not found. Tried {:?}", paths))
}

fn read_bytecode(path: &str) -> Result<Vec<u8>> {
    let raw = fs::read_to_string(path)?;
    let cleaned = raw.trim();
    let cleaned = cleaned.strip_prefix("0x").unwrap_or(cleaned);
    hex::decode(cleaned).context("decoding bytecode hex")
}

use anyhow::{
    Context,
    Result,
    anyhow,
};
use chrono::Utc;
use serde::{
    Deserialize,
    Serialize,
};
use sha2::{
    Digest,
    Sha256,
};
use std::{
    fmt,
    fs,
    io::Write,
    path::{
        Path,
        PathBuf,
    },
};

pub const DEPLOYMENTS_ROOT: &str = ".deployments";
const DEPLOYMENTS_FILE: &str = "deployments.json";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DeploymentEnv {
    Test,
    Local,
}

impl DeploymentEnv {
    pub fn dir_name(self) -> &'static str {
        match self {
            DeploymentEnv::Test => "test",
            DeploymentEnv::Local => "local",
        }
    }
}

impl fmt::Display for DeploymentEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeploymentEnv::Test => "Testnet",
            DeploymentEnv::Local => "Local",
        };
        write!(f, "{name}")
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub deployed_at: String,
    pub contract_address: String,
    pub bytecode_hash: String,
    pub network_url: String,
    pub chain_id: u64,
    #[serde(default)]
    pub deployment_block: Option<u64>,
    #[serde(default)]
    pub vrf_coordinator: Option<String>,
    #[serde(default)]
    pub link_token: Option<String>,
    #[serde(default)]
    pub key_hash: Option<String>,
}

impl DeploymentRecord {
    pub fn is_compatible_with_hash(&self, hash: &str) -> bool {
        self.bytecode_hash == hash
    }
}

#[derive(Debug)]
pub struct DeploymentStore {
    path: PathBuf,
}

impl DeploymentStore {
    pub fn new(env: DeploymentEnv) -> Result<Self> {
        let path = ensure_store(env)?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Option<DeploymentRecord>> {
        read_record(&self.path)
    }

    pub fn save(&self, record: DeploymentRecord) -> Result<()> {
        write_record(&self.path, &record)
    }
}

pub fn compute_bytecode_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

pub fn ensure_structure() -> Result<()> {
    for env in [DeploymentEnv::Test, DeploymentEnv::Local] {
        let _ = ensure_store(env)?;
    }
    Ok(())
}

fn ensure_store(env: DeploymentEnv) -> Result<PathBuf> {
    let root = Path::new(DEPLOYMENTS_ROOT);
    if !root.exists() {
        fs::create_dir_all(root).context("Failed to create .deployments directory")?;
    }

    let env_dir = root.join(env.dir_name());
    if !env_dir.exists() {
        fs::create_dir_all(&env_dir).with_context(|| {
            format!("Failed to create .deployments/{} directory", env.dir_name())
        })?;
    }

    let file_path = env_dir.join(DEPLOYMENTS_FILE);
    if !file_path.exists() {
        let mut file = fs::File::create(&file_path).with_context(|| {
            format!(
                "Failed to create deployment record file for {} at {:?}",
                env, file_path
            )
        })?;
        file.write_all(b"").with_context(|| {
            format!("Failed to initialize deployment record file for {}", env)
        })?;
    }

    Ok(file_path)
}

fn read_record(path: impl AsRef<Path>) -> Result<Option<DeploymentRecord>> {
    let data = fs::read(path.as_ref()).context("Failed to read deployment records")?;
    if data.iter().all(u8::is_ascii_whitespace) || data.is_empty() {
        return Ok(None);
    }
    if let Ok(record) = serde_json::from_slice::<DeploymentRecord>(&data) {
        return Ok(Some(record));
    }
    if let Ok(mut records) = serde_json::from_slice::<Vec<DeploymentRecord>>(&data) {
        return Ok(records.pop());
    }
    Err(anyhow!(
        "Failed to parse deployment record JSON; expected a single deployment object"
    ))
}

fn write_record(path: impl AsRef<Path>, record: &DeploymentRecord) -> Result<()> {
    let json = serde_json::to_vec_pretty(record)
        .context("Failed to serialize deployment record")?;
    fs::write(path.as_ref(), json).context("Failed to write deployment record")?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub fn record_deployment(
    env: DeploymentEnv,
    contract_address: impl AsRef<str>,
    bytecode_hash: impl AsRef<str>,
    network_url: impl AsRef<str>,
    chain_id: u64,
    deployment_block: Option<u64>,
    vrf_coordinator: Option<impl AsRef<str>>,
    link_token: Option<impl AsRef<str>>,
    key_hash: Option<impl AsRef<str>>,
) -> Result<()> {
    let store = DeploymentStore::new(env)?;
    let record = DeploymentRecord {
        deployed_at: Utc::now().to_rfc3339(),
        contract_address: contract_address.as_ref().to_string(),
        bytecode_hash: bytecode_hash.as_ref().to_string(),
        network_url: network_url.as_ref().to_string(),
        chain_id,
        deployment_block,
        vrf_coordinator: vrf_coordinator.map(|v| v.as_ref().to_string()),
        link_token: link_token.map(|v| v.as_ref().to_string()),
        key_hash: key_hash.map(|v| v.as_ref().to_string()),
    };
    store.save(record)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytecode_hash_is_stable_hex_sha256() {
        let hash = compute_bytecode_hash(b"random box bytecode");
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, compute_bytecode_hash(b"random box bytecode"));
        assert_ne!(hash, compute_bytecode_hash(b"other bytecode"));
    }

    #[test]
    fn record_round_trips_through_json() {
        let record = DeploymentRecord {
            deployed_at: Utc::now().to_rfc3339(),
            contract_address: "0x59a0c170761Cf67343FDD101d9f30BFA2d43528b".into(),
            bytecode_hash: compute_bytecode_hash(b"code"),
            network_url: "https://rinkeby.infura.io".into(),
            chain_id: 4,
            deployment_block: Some(42),
            vrf_coordinator: None,
            link_token: None,
            key_hash: None,
        };
        let json = serde_json::to_vec_pretty(&record).unwrap();
        let parsed: DeploymentRecord = serde_json::from_slice(&json).unwrap();
        assert_eq!(parsed.contract_address, record.contract_address);
        assert_eq!(parsed.chain_id, 4);
        assert!(parsed.is_compatible_with_hash(&record.bytecode_hash));
    }

    #[test]
    fn legacy_record_arrays_resolve_to_the_last_entry() {
        let json = r#"[
            {"deployed_at":"a","contract_address":"0x1","bytecode_hash":"h1","network_url":"u","chain_id":4},
            {"deployed_at":"b","contract_address":"0x2","bytecode_hash":"h2","network_url":"u","chain_id":4}
        ]"#;
        let records: Vec<DeploymentRecord> = serde_json::from_str(json).unwrap();
        assert_eq!(records.last().unwrap().contract_address, "0x2");
    }
}

//! NFT lookup against the primary index API with a marketplace fallback.
//!
//! Explicit reference lists always resolve through the marketplace API;
//! account-scoped lookups go through whichever [`AccountNftSource`] the
//! configuration selected at startup.

use async_trait::async_trait;
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use randombox::NftReference;
use reqwest::header::HeaderValue;
use serde::Deserialize;
use serde_json::{
    Map,
    Value,
};

/// Chain selector sent to the index API (Rinkeby).
const INDEX_CHAIN: &str = "0x4";
const INDEX_APP_ID_HEADER: &str = "X-App-Id";

/// One resolved NFT. Recomputed on every fetch, never persisted.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Nft {
    pub token_address: String,
    pub token_id: String,
    pub metadata: Option<String>,
    pub name: String,
    pub symbol: String,
}

#[derive(Clone, Debug, Default)]
pub struct NftMetadata {
    pub image: Option<String>,
    pub description: Option<String>,
}

impl Nft {
    pub fn key(&self) -> String {
        format!("{}/{}", self.token_address, self.token_id)
    }

    /// Best-effort parse of the metadata JSON. Malformed or absent metadata
    /// yields an empty result; callers fall back to the collection symbol.
    pub fn parsed_metadata(&self) -> NftMetadata {
        let Some(raw) = self.metadata.as_deref() else {
            return NftMetadata::default();
        };
        match serde_json::from_str::<Value>(raw) {
            Ok(value) => NftMetadata {
                image: value
                    .get("image")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                description: value
                    .get("description")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            },
            Err(_) => NftMetadata::default(),
        }
    }

    /// Card title: the collection name when it is short enough, otherwise
    /// the symbol, always suffixed with the token id.
    pub fn display_title(&self) -> String {
        let label = if self.name.len() <= 16 {
            &self.name
        } else {
            &self.symbol
        };
        format!("{} #{}", label, self.token_id)
    }
}

#[derive(Clone, Copy, Debug)]
pub struct PageRequest {
    pub offset: usize,
    pub limit: usize,
}

/// The three mutually exclusive fetch modes.
#[derive(Clone, Debug)]
pub enum NftQuery {
    /// Explicit (contract, token id) pairs; always served by the
    /// marketplace API.
    Specific(Vec<NftReference>),
    /// Everything `owner` holds from one token contract.
    OwnerContract {
        owner: String,
        token_contract: String,
    },
    /// Everything `owner` holds.
    Owner { owner: String },
}

/// Account-scoped lookup backend, chosen once at construction.
#[async_trait]
pub trait AccountNftSource: Send + Sync {
    async fn account_nfts(
        &self,
        owner: &str,
        token_contract: Option<&str>,
        page: PageRequest,
    ) -> Result<Vec<Nft>>;
}

/// Client for the primary index API.
#[derive(Clone)]
pub struct IndexApi {
    base_url: String,
    app_id: String,
    http: reqwest::Client,
}

impl IndexApi {
    pub fn new(
        base_url: impl Into<String>,
        app_id: impl Into<String>,
        http: reqwest::Client,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            app_id: app_id.into(),
            http,
        }
    }
}

#[async_trait]
impl AccountNftSource for IndexApi {
    async fn account_nfts(
        &self,
        owner: &str,
        token_contract: Option<&str>,
        page: PageRequest,
    ) -> Result<Vec<Nft>> {
        let url = format!("{}/{}/nft", self.base_url, owner);
        let mut query: Vec<(String, String)> = vec![
            ("chain".into(), INDEX_CHAIN.into()),
            ("offset".into(), page.offset.to_string()),
            ("limit".into(), page.limit.to_string()),
        ];
        if let Some(contract) = token_contract {
            query.push(("token_address".into(), contract.to_string()));
        }
        let app_id = HeaderValue::from_str(&self.app_id)
            .wrap_err("index app id is not a valid header value")?;
        let response: IndexResponse = self
            .http
            .get(url)
            .header(INDEX_APP_ID_HEADER, app_id)
            .query(&query)
            .send()
            .await
            .wrap_err("index request failed")?
            .error_for_status()
            .wrap_err("index request rejected")?
            .json()
            .await
            .wrap_err("invalid index payload")?;
        // A payload with no result field is fatal for this call; there is
        // no retry.
        let result = response
            .result
            .ok_or_else(|| eyre!("index response missing result"))?;
        Ok(result.into_iter().map(Nft::from).collect())
    }
}

/// Typed request for the marketplace asset search. Replaces ad-hoc
/// parameter maps; validated before the request goes out.
#[derive(Clone, Debug, Default)]
pub struct AssetQuery {
    pub owner: Option<String>,
    pub asset_contract_address: Option<String>,
    pub asset_contract_addresses: Vec<String>,
    pub token_ids: Vec<String>,
    pub offset: usize,
    pub limit: usize,
}

impl AssetQuery {
    pub fn validate(&self) -> Result<()> {
        if self.asset_contract_addresses.len() != self.token_ids.len() {
            return Err(eyre!(
                "batch asset query must pair contracts with token ids ({} vs {})",
                self.asset_contract_addresses.len(),
                self.token_ids.len()
            ));
        }
        if self.asset_contract_address.is_some()
            && !self.asset_contract_addresses.is_empty()
        {
            return Err(eyre!(
                "asset query cannot combine a single contract filter with a batch filter"
            ));
        }
        Ok(())
    }

    fn query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs: Vec<(String, String)> = vec![
            // The marketplace listing order is fixed.
            ("order_direction".into(), "desc".into()),
            ("offset".into(), self.offset.to_string()),
            ("limit".into(), self.limit.to_string()),
        ];
        if let Some(owner) = &self.owner {
            pairs.push(("owner".into(), owner.clone()));
        }
        if let Some(contract) = &self.asset_contract_address {
            pairs.push(("asset_contract_address".into(), contract.clone()));
        }
        for contract in &self.asset_contract_addresses {
            pairs.push(("asset_contract_addresses".into(), contract.clone()));
        }
        for token_id in &self.token_ids {
            pairs.push(("token_ids".into(), token_id.clone()));
        }
        pairs
    }
}

/// Client for the fallback marketplace API.
#[derive(Clone)]
pub struct MarketplaceApi {
    base_url: String,
    http: reqwest::Client,
}

impl MarketplaceApi {
    pub fn new(base_url: impl Into<String>, http: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        }
    }

    pub async fn assets(&self, query: &AssetQuery) -> Result<Vec<Nft>> {
        query.validate()?;
        let url = format!("{}/assets", self.base_url);
        let response: AssetsResponse = self
            .http
            .get(url)
            .query(&query.query_pairs())
            .send()
            .await
            .wrap_err("marketplace request failed")?
            .error_for_status()
            .wrap_err("marketplace request rejected")?
            .json()
            .await
            .wrap_err("invalid marketplace payload")?;
        Ok(response.assets.into_iter().map(Nft::from).collect())
    }
}

#[async_trait]
impl AccountNftSource for MarketplaceApi {
    async fn account_nfts(
        &self,
        owner: &str,
        token_contract: Option<&str>,
        page: PageRequest,
    ) -> Result<Vec<Nft>> {
        self.assets(&AssetQuery {
            owner: Some(owner.to_string()),
            asset_contract_address: token_contract.map(str::to_string),
            offset: page.offset,
            limit: page.limit,
            ..AssetQuery::default()
        })
        .await
    }
}

/// The lookup service handed down to every view that fetches NFTs.
pub struct NftLookup {
    account_source: Box<dyn AccountNftSource>,
    marketplace: MarketplaceApi,
}

impl NftLookup {
    pub fn new(account_source: Box<dyn AccountNftSource>, marketplace: MarketplaceApi) -> Self {
        Self {
            account_source,
            marketplace,
        }
    }

    pub async fn fetch(&self, query: &NftQuery, page: PageRequest) -> Result<Vec<Nft>> {
        match query {
            NftQuery::Specific(references) if references.is_empty() => Ok(Vec::new()),
            NftQuery::Specific(references) => {
                self.marketplace
                    .assets(&AssetQuery {
                        asset_contract_addresses: references
                            .iter()
                            .map(|r| r.token_contract.to_string())
                            .collect(),
                        token_ids: references
                            .iter()
                            .map(|r| r.token_id.to_string())
                            .collect(),
                        offset: page.offset,
                        limit: page.limit,
                        ..AssetQuery::default()
                    })
                    .await
            }
            NftQuery::OwnerContract {
                owner,
                token_contract,
            } => {
                self.account_source
                    .account_nfts(owner, Some(token_contract), page)
                    .await
            }
            NftQuery::Owner { owner } => {
                self.account_source.account_nfts(owner, None, page).await
            }
        }
    }

    /// Resolves a single on-chain reference to its metadata.
    pub async fn resolve_one(&self, reference: &NftReference) -> Result<Option<Nft>> {
        let nfts = self
            .fetch(
                &NftQuery::Specific(vec![*reference]),
                PageRequest {
                    offset: 0,
                    limit: 1,
                },
            )
            .await?;
        Ok(nfts.into_iter().next())
    }
}

#[derive(Deserialize)]
struct IndexResponse {
    result: Option<Vec<IndexNftDto>>,
}

#[derive(Deserialize)]
struct IndexNftDto {
    token_address: String,
    token_id: String,
    #[serde(default)]
    metadata: Option<String>,
    #[serde(default)]
    name: String,
    #[serde(default)]
    symbol: String,
}

impl From<IndexNftDto> for Nft {
    fn from(dto: IndexNftDto) -> Self {
        Nft {
            token_address: dto.token_address,
            token_id: dto.token_id,
            metadata: dto.metadata,
            name: dto.name,
            symbol: dto.symbol,
        }
    }
}

#[derive(Deserialize)]
struct AssetsResponse {
    assets: Vec<AssetDto>,
}

#[derive(Deserialize)]
struct AssetDto {
    token_id: Option<String>,
    #[serde(default)]
    image_url: Option<String>,
    asset_contract: AssetContractDto,
}

#[derive(Deserialize)]
struct AssetContractDto {
    address: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    symbol: String,
}

impl From<AssetDto> for Nft {
    fn from(dto: AssetDto) -> Self {
        // The marketplace response carries no metadata document; synthesize
        // one holding only the image URL. Description and attributes are
        // lost and callers must tolerate that.
        let mut metadata = Map::new();
        if let Some(image) = &dto.image_url {
            metadata.insert("image".to_string(), Value::String(image.clone()));
        }
        Nft {
            token_address: dto.asset_contract.address,
            token_id: dto.token_id.unwrap_or_else(|| "0".to_string()),
            metadata: Some(Value::Object(metadata).to_string()),
            name: dto.asset_contract.name,
            symbol: dto.asset_contract.symbol,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_payload_parses_into_nfts() {
        let json = r#"{
            "result": [{
                "token_address": "0xabc",
                "token_id": "12",
                "metadata": "{\"image\":\"ipfs://img\",\"description\":\"a gem\"}",
                "name": "Cool Gems",
                "symbol": "GEM"
            }]
        }"#;
        let response: IndexResponse = serde_json::from_str(json).unwrap();
        let nfts: Vec<Nft> = response.result.unwrap().into_iter().map(Nft::from).collect();
        assert_eq!(nfts.len(), 1);
        assert_eq!(nfts[0].key(), "0xabc/12");
        let metadata = nfts[0].parsed_metadata();
        assert_eq!(metadata.image.as_deref(), Some("ipfs://img"));
        assert_eq!(metadata.description.as_deref(), Some("a gem"));
    }

    #[test]
    fn index_payload_without_result_is_detected() {
        let response: IndexResponse = serde_json::from_str("{}").unwrap();
        assert!(response.result.is_none());
    }

    #[test]
    fn marketplace_assets_synthesize_image_only_metadata() {
        let json = r#"{
            "assets": [{
                "token_id": "3",
                "image_url": "https://img.example/3.png",
                "asset_contract": {"address": "0xdef", "name": "Cool Gems", "symbol": "GEM"}
            }]
        }"#;
        let response: AssetsResponse = serde_json::from_str(json).unwrap();
        let nft = Nft::from(response.assets.into_iter().next().unwrap());
        let metadata = nft.parsed_metadata();
        assert_eq!(metadata.image.as_deref(), Some("https://img.example/3.png"));
        assert_eq!(metadata.description, None);
    }

    #[test]
    fn marketplace_assets_without_token_id_default_to_zero() {
        let json = r#"{
            "assets": [{
                "asset_contract": {"address": "0xdef", "name": "Cool Gems", "symbol": "GEM"}
            }]
        }"#;
        let response: AssetsResponse = serde_json::from_str(json).unwrap();
        let nft = Nft::from(response.assets.into_iter().next().unwrap());
        assert_eq!(nft.token_id, "0");
        assert_eq!(nft.parsed_metadata().image, None);
    }

    #[test]
    fn malformed_metadata_parses_to_nothing() {
        let nft = Nft {
            token_address: "0xabc".into(),
            token_id: "1".into(),
            metadata: Some("not json".into()),
            name: "Cool Gems".into(),
            symbol: "GEM".into(),
        };
        let metadata = nft.parsed_metadata();
        assert!(metadata.image.is_none());
        assert!(metadata.description.is_none());
    }

    #[test]
    fn display_title_prefers_short_names() {
        let mut nft = Nft {
            token_address: "0xabc".into(),
            token_id: "5".into(),
            metadata: None,
            name: "Cool Gems".into(),
            symbol: "GEM".into(),
        };
        assert_eq!(nft.display_title(), "Cool Gems #5");
        nft.name = "An Unreasonably Long Collection Name".into();
        assert_eq!(nft.display_title(), "GEM #5");
    }

    #[test]
    fn batch_query_validation_requires_paired_filters() {
        let query = AssetQuery {
            asset_contract_addresses: vec!["0xa".into(), "0xb".into()],
            token_ids: vec!["1".into()],
            ..AssetQuery::default()
        };
        assert!(query.validate().is_err());
    }

    #[test]
    fn single_and_batch_contract_filters_are_exclusive() {
        let query = AssetQuery {
            asset_contract_address: Some("0xa".into()),
            asset_contract_addresses: vec!["0xb".into()],
            token_ids: vec!["1".into()],
            ..AssetQuery::default()
        };
        assert!(query.validate().is_err());
    }

    #[test]
    fn query_pairs_carry_the_fixed_ordering_and_repeated_filters() {
        let query = AssetQuery {
            asset_contract_addresses: vec!["0xa".into(), "0xb".into()],
            token_ids: vec!["1".into(), "2".into()],
            offset: 15,
            limit: 15,
            ..AssetQuery::default()
        };
        let pairs = query.query_pairs();
        assert!(pairs.contains(&("order_direction".into(), "desc".into())));
        assert_eq!(
            pairs
                .iter()
                .filter(|(k, _)| k == "asset_contract_addresses")
                .count(),
            2
        );
        assert_eq!(pairs.iter().filter(|(k, _)| k == "token_ids").count(), 2);
    }
}

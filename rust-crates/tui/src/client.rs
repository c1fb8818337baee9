use crate::{
    grid::{
        FetchOutcome,
        PAGE_LIMIT,
        Pager,
        SelectMode,
        SelectionSet,
    },
    nft::{
        IndexApi,
        MarketplaceApi,
        Nft,
        NftLookup,
        NftQuery,
        PageRequest,
    },
    ui,
    wallets,
};
use alloy::{
    network::EthereumWallet,
    primitives::{
        Address,
        U256,
    },
    providers::{
        DynProvider,
        Provider,
        ProviderBuilder,
    },
};
use color_eyre::eyre::{
    Report,
    Result,
    WrapErr,
    eyre,
};
use randombox::{
    BoxDetails,
    BoxGateway,
    BoxStatus,
};
use std::path::PathBuf;
use tracing::{
    error,
    info,
};
use url::Url;

pub const DEFAULT_TESTNET_RPC_URL: &str =
    "https://rinkeby.infura.io/v3/9aa3d95b3bc440fa88ea12eaa4456161";
pub const DEFAULT_LOCAL_RPC_URL: &str = "http://localhost:8545/";
pub const DEFAULT_MARKETPLACE_URL: &str = "https://testnets-api.opensea.io/api/v1";
const TESTNET_CHAIN_ID: u64 = 4;
const ERROR_HISTORY: usize = 5;

#[derive(Clone, Debug)]
pub enum NetworkTarget {
    Testnet { url: String },
    LocalNode { url: String },
}

impl NetworkTarget {
    pub fn url(&self) -> &str {
        match self {
            NetworkTarget::Testnet { url } | NetworkTarget::LocalNode { url } => url,
        }
    }

    fn expected_chain_id(&self) -> Option<u64> {
        match self {
            NetworkTarget::Testnet { .. } => Some(TESTNET_CHAIN_ID),
            NetworkTarget::LocalNode { .. } => None,
        }
    }
}

#[derive(Clone, Debug)]
pub enum WalletConfig {
    Keystore { name: String, dir: PathBuf },
}

/// Which backend serves account-scoped NFT lookups, plus the endpoints for
/// both clients. Resolved once at startup; the clients are constructed here
/// and passed down, never rebuilt per call.
#[derive(Clone, Debug)]
pub struct LookupConfig {
    pub index_url: Option<String>,
    pub index_app_id: Option<String>,
    pub marketplace_url: String,
    pub use_marketplace: bool,
}

impl LookupConfig {
    fn build(&self, http: reqwest::Client) -> Result<NftLookup> {
        let marketplace = MarketplaceApi::new(&self.marketplace_url, http.clone());
        if self.use_marketplace {
            return Ok(NftLookup::new(
                Box::new(marketplace.clone()),
                marketplace,
            ));
        }
        let index_url = self
            .index_url
            .as_deref()
            .ok_or_else(|| eyre!("Set RANDOMBOX_INDEX_URL or pass --index-url"))?;
        let app_id = self
            .index_app_id
            .as_deref()
            .ok_or_else(|| eyre!("Set RANDOMBOX_INDEX_APP_ID or pass --app-id"))?;
        let index = IndexApi::new(index_url, app_id, http);
        Ok(NftLookup::new(Box::new(index), marketplace))
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub network: NetworkTarget,
    pub wallet: WalletConfig,
    pub contract_address: Address,
    pub lookup: LookupConfig,
    pub initial_box: Option<U256>,
}

/// Grid of the caller's boxes, with selection.
pub struct GridView {
    pub pager: Pager,
    pub selection: SelectionSet,
    /// `None` while the first fetch for the current page is outstanding.
    pub nfts: Option<Vec<Nft>>,
    pub cursor: usize,
    pub error: Option<String>,
}

impl GridView {
    fn new() -> Self {
        Self {
            pager: Pager::new(PAGE_LIMIT),
            selection: SelectionSet::new(SelectMode::Single),
            nfts: None,
            cursor: 0,
            error: None,
        }
    }
}

/// Everything the box detail view renders once its fetch completed.
pub struct BoxPanel {
    pub details: BoxDetails,
    pub result_nft: Option<Nft>,
    pub contents_pager: Pager,
    pub contents: Option<Vec<Nft>>,
    pub transacting: bool,
}

impl BoxPanel {
    pub fn shows_result(&self) -> bool {
        self.details.status == BoxStatus::AlreadyOpened
    }

    pub fn shows_open_button(&self, viewer: Address) -> bool {
        self.details.status == BoxStatus::ReadyToOpen && self.details.owner == viewer
    }

    pub fn open_enabled(&self) -> bool {
        !self.transacting
    }
}

pub enum BoxViewState {
    Loading,
    Failed(String),
    Loaded(BoxPanel),
}

pub struct BoxView {
    pub box_id: U256,
    pub state: BoxViewState,
}

/// Path-equivalent of the original routing shell: landing page, box grid,
/// box detail.
pub enum Route {
    Landing,
    Grid(GridView),
    BoxView(BoxView),
}

pub struct AppController {
    pub address: Address,
    pub route: Route,
    pub status: String,
    pub errors: Vec<String>,
    gateway: BoxGateway<DynProvider>,
    lookup: NftLookup,
    contract_address: Address,
}

impl AppController {
    pub async fn connect(config: AppConfig) -> Result<Self> {
        let AppConfig {
            network,
            wallet,
            contract_address,
            lookup,
            initial_box,
        } = config;

        let WalletConfig::Keystore { name, dir } = wallet;
        let descriptor =
            wallets::find_wallet(&dir, &name).wrap_err("Unable to locate wallet")?;
        let signer = wallets::unlock_wallet(&descriptor)?;
        let address = signer.address();

        info!(url = network.url(), "connecting to provider");
        let url: Url = network
            .url()
            .parse()
            .wrap_err_with(|| format!("Invalid RPC URL {}", network.url()))?;
        let provider = ProviderBuilder::new()
            .wallet(EthereumWallet::from(signer))
            .connect_http(url)
            .erased();

        let chain_id = provider
            .get_chain_id()
            .await
            .wrap_err("Failed to query chain id from provider")?;
        if let Some(expected) = network.expected_chain_id() {
            if chain_id != expected {
                return Err(eyre!(
                    "Provider reports chain id {chain_id}, expected {expected}. \
                     Point --rpc-url at the Rinkeby test network."
                ));
            }
        }
        info!(%address, chain_id, "wallet session established");

        let http = reqwest::Client::builder()
            .build()
            .wrap_err("failed to build HTTP client")?;
        let lookup = lookup.build(http)?;
        let gateway = BoxGateway::new(contract_address, provider);

        let mut controller = Self {
            address,
            route: Route::Landing,
            status: String::from("Ready"),
            errors: Vec::new(),
            gateway,
            lookup,
            contract_address,
        };
        if let Some(box_id) = initial_box {
            controller.open_box_view(box_id).await;
        }
        Ok(controller)
    }

    fn set_status(&mut self, message: impl Into<String>) {
        self.status = message.into();
    }

    fn note_error(&mut self, context: &str, err: Report) {
        error!(%context, error = %err, "operation failed");
        self.errors.push(format!("{context}: {err}"));
        if self.errors.len() > ERROR_HISTORY {
            let drop = self.errors.len() - ERROR_HISTORY;
            self.errors.drain(..drop);
        }
    }

    fn grid_query(&self) -> NftQuery {
        NftQuery::OwnerContract {
            owner: self.address.to_string(),
            token_contract: self.contract_address.to_string(),
        }
    }

    pub async fn launch_app(&mut self) {
        self.route = Route::Grid(GridView::new());
        self.set_status("Loading your boxes...");
        self.refresh_grid().await;
    }

    /// Fetches the grid's current page. An overshot page steps the pager
    /// back and refetches; this is the only retry-like path in the client.
    async fn refresh_grid(&mut self) {
        let query = self.grid_query();
        let Route::Grid(grid) = &mut self.route else {
            return;
        };
        grid.error = None;
        loop {
            let page = PageRequest {
                offset: grid.pager.offset(),
                limit: grid.pager.limit(),
            };
            match self.lookup.fetch(&query, page).await {
                Ok(nfts) => {
                    if grid.pager.record_fetch(nfts.len()) == FetchOutcome::Overshot {
                        continue;
                    }
                    grid.cursor = grid.cursor.min(nfts.len().saturating_sub(1));
                    grid.nfts = Some(nfts);
                    break;
                }
                Err(err) => {
                    grid.error = Some(err.to_string());
                    grid.nfts = Some(Vec::new());
                    self.note_error("grid fetch", err);
                    break;
                }
            }
        }
        self.set_status(format!("Connected as {}", self.address));
    }

    pub async fn grid_next(&mut self) {
        if let Route::Grid(grid) = &mut self.route {
            if grid.pager.next() {
                grid.nfts = None;
                self.refresh_grid().await;
            }
        }
    }

    pub async fn grid_prev(&mut self) {
        if let Route::Grid(grid) = &mut self.route {
            if grid.pager.prev() {
                grid.nfts = None;
                self.refresh_grid().await;
            }
        }
    }

    pub fn grid_move_cursor(&mut self, delta: isize) {
        if let Route::Grid(grid) = &mut self.route {
            let Some(nfts) = &grid.nfts else {
                return;
            };
            if nfts.is_empty() {
                return;
            }
            let last = nfts.len() as isize - 1;
            let cursor = (grid.cursor as isize + delta).clamp(0, last);
            grid.cursor = cursor as usize;
        }
    }

    pub fn grid_toggle(&mut self) {
        if let Route::Grid(grid) = &mut self.route {
            let Some(nfts) = &grid.nfts else {
                return;
            };
            if let Some(nft) = nfts.get(grid.cursor) {
                grid.selection.toggle(nft);
            }
        }
    }

    /// Confirms the current pick: navigates to the chosen box's detail view.
    pub async fn choose_selected(&mut self) {
        let chosen = match &self.route {
            Route::Grid(grid) => grid.selection.first().cloned(),
            _ => None,
        };
        let Some(nft) = chosen else {
            return;
        };
        match nft.token_id.parse::<U256>() {
            Ok(box_id) => self.open_box_view(box_id).await,
            Err(err) => self.note_error("box id parse", eyre!("{err}")),
        }
    }

    pub async fn open_box_view(&mut self, box_id: U256) {
        self.route = Route::BoxView(BoxView {
            box_id,
            state: BoxViewState::Loading,
        });
        self.set_status(format!("Loading box #{box_id}..."));
        self.load_box(box_id).await;
    }

    async fn load_box(&mut self, box_id: U256) {
        let state = match self.fetch_box_panel(box_id).await {
            Ok(panel) => {
                self.set_status(format!(
                    "Box #{box_id} | {}",
                    panel.details.status
                ));
                BoxViewState::Loaded(panel)
            }
            Err(err) => {
                let message = err.to_string();
                self.note_error("box fetch", err);
                BoxViewState::Failed(message)
            }
        };
        if let Route::BoxView(view) = &mut self.route {
            if view.box_id == box_id {
                view.state = state;
            }
        }
    }

    async fn fetch_box_panel(&mut self, box_id: U256) -> Result<BoxPanel> {
        let details = self
            .gateway
            .details(box_id)
            .await
            .wrap_err("fetching box details failed")?;

        let result_nft = if details.status == BoxStatus::AlreadyOpened {
            self.lookup
                .resolve_one(&details.result)
                .await
                .wrap_err("resolving box result failed")?
        } else {
            None
        };

        let mut contents_pager = Pager::new(PAGE_LIMIT);
        let contents = self
            .fetch_contents_page(&details.tokens, &mut contents_pager)
            .await
            .wrap_err("fetching box contents failed")?;

        Ok(BoxPanel {
            details,
            result_nft,
            contents_pager,
            contents: Some(contents),
            transacting: false,
        })
    }

    async fn fetch_contents_page(
        &self,
        tokens: &[randombox::NftReference],
        pager: &mut Pager,
    ) -> Result<Vec<Nft>> {
        let query = NftQuery::Specific(tokens.to_vec());
        loop {
            let page = PageRequest {
                offset: pager.offset(),
                limit: pager.limit(),
            };
            let nfts = self.lookup.fetch(&query, page).await?;
            if pager.record_fetch(nfts.len()) == FetchOutcome::Overshot {
                continue;
            }
            return Ok(nfts);
        }
    }

    pub async fn contents_next(&mut self) {
        self.turn_contents_page(true).await;
    }

    pub async fn contents_prev(&mut self) {
        self.turn_contents_page(false).await;
    }

    async fn turn_contents_page(&mut self, forward: bool) {
        let (tokens, mut pager) = match &mut self.route {
            Route::BoxView(BoxView {
                state: BoxViewState::Loaded(panel),
                ..
            }) => {
                let moved = if forward {
                    panel.contents_pager.next()
                } else {
                    panel.contents_pager.prev()
                };
                if !moved {
                    return;
                }
                panel.contents = None;
                (panel.details.tokens.clone(), panel.contents_pager.clone())
            }
            _ => return,
        };

        let result = self.fetch_contents_page(&tokens, &mut pager).await;
        if let Route::BoxView(BoxView {
            state: BoxViewState::Loaded(panel),
            ..
        }) = &mut self.route
        {
            match result {
                Ok(nfts) => {
                    panel.contents_pager = pager;
                    panel.contents = Some(nfts);
                }
                Err(err) => {
                    panel.contents = Some(Vec::new());
                    self.note_error("contents fetch", err);
                }
            }
        }
    }

    /// Submits the open transaction and awaits one confirmation. The
    /// `transacting` flag gates re-entrancy; it clears regardless of the
    /// outcome, and failures are logged rather than shown beyond the
    /// status line.
    pub async fn open_box(&mut self) {
        let box_id = match &mut self.route {
            Route::BoxView(view) => {
                let BoxViewState::Loaded(panel) = &mut view.state else {
                    return;
                };
                if !panel.shows_open_button(self.address) || panel.transacting {
                    return;
                }
                panel.transacting = true;
                view.box_id
            }
            _ => return,
        };

        self.set_status(format!("Opening box #{box_id}..."));
        let outcome = self.gateway.open(box_id).await;
        if let Route::BoxView(BoxView {
            state: BoxViewState::Loaded(panel),
            ..
        }) = &mut self.route
        {
            panel.transacting = false;
        }
        match outcome {
            Ok(tx_hash) => {
                self.set_status(format!("Open confirmed ({tx_hash})"));
                // Status may have advanced on-chain; refetch the projection.
                self.load_box(box_id).await;
            }
            Err(err) => {
                self.set_status("Open failed; see log");
                self.note_error("open transaction", Report::from(err));
            }
        }
    }

    pub async fn back(&mut self) {
        match self.route {
            Route::BoxView(_) => self.launch_app().await,
            Route::Grid(_) => self.route = Route::Landing,
            Route::Landing => {}
        }
    }

    pub fn contract_address(&self) -> Address {
        self.contract_address
    }
}

pub async fn run_app(config: AppConfig) -> Result<()> {
    let mut controller = AppController::connect(config).await?;
    let mut ui_state = ui::UiState::default();

    ui::terminal_enter(&mut ui_state)?;
    let res = run_loop(&mut controller, &mut ui_state).await;
    ui::terminal_exit()?;
    res
}

async fn run_loop(
    controller: &mut AppController,
    ui_state: &mut ui::UiState,
) -> Result<()> {
    loop {
        ui::draw(ui_state, controller)?;
        match ui::next_event(ui_state, &controller.route).await? {
            ui::UserEvent::Quit => break,
            ui::UserEvent::Redraw => {}
            ui::UserEvent::LaunchApp => controller.launch_app().await,
            ui::UserEvent::Back => controller.back().await,
            ui::UserEvent::CursorMove(delta) => controller.grid_move_cursor(delta),
            ui::UserEvent::ToggleSelect => controller.grid_toggle(),
            ui::UserEvent::Choose => controller.choose_selected().await,
            ui::UserEvent::NextPage => match &controller.route {
                Route::Grid(_) => controller.grid_next().await,
                Route::BoxView(_) => controller.contents_next().await,
                Route::Landing => {}
            },
            ui::UserEvent::PrevPage => match &controller.route {
                Route::Grid(_) => controller.grid_prev().await,
                Route::BoxView(_) => controller.contents_prev().await,
                Route::Landing => {}
            },
            ui::UserEvent::Open => controller.open_box().await,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use randombox::NftReference;

    fn details(status: BoxStatus, owner: Address) -> BoxDetails {
        let reference = NftReference {
            token_contract: Address::repeat_byte(0xaa),
            token_id: U256::from(9u64),
        };
        BoxDetails {
            owner,
            tokens: vec![reference],
            status,
            result: reference,
        }
    }

    fn panel(status: BoxStatus, owner: Address) -> BoxPanel {
        BoxPanel {
            details: details(status, owner),
            result_nft: None,
            contents_pager: Pager::new(PAGE_LIMIT),
            contents: Some(Vec::new()),
            transacting: false,
        }
    }

    #[test]
    fn opened_box_shows_result_and_no_open_button() {
        let owner = Address::repeat_byte(0x11);
        let panel = panel(BoxStatus::AlreadyOpened, owner);
        assert!(panel.shows_result());
        assert!(!panel.shows_open_button(owner));
    }

    #[test]
    fn ready_box_offers_open_only_to_its_owner() {
        let owner = Address::repeat_byte(0x11);
        let stranger = Address::repeat_byte(0x22);
        let panel = panel(BoxStatus::ReadyToOpen, owner);
        assert!(panel.shows_open_button(owner));
        assert!(!panel.shows_open_button(stranger));
        assert!(!panel.shows_result());
    }

    #[test]
    fn outstanding_transaction_disables_open() {
        let owner = Address::repeat_byte(0x11);
        let mut panel = panel(BoxStatus::ReadyToOpen, owner);
        assert!(panel.open_enabled());
        panel.transacting = true;
        assert!(!panel.open_enabled());
    }

    #[test]
    fn unlocked_and_opening_boxes_show_neither_result_nor_open() {
        let owner = Address::repeat_byte(0x11);
        for status in [BoxStatus::Unlocked, BoxStatus::Opening, BoxStatus::Unknown] {
            let panel = panel(status, owner);
            assert!(!panel.shows_result());
            assert!(!panel.shows_open_button(owner));
        }
    }
}

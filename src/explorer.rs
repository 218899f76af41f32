//! The explorer session: the active cluster plus one cached resource per
//! payload type. Cache partitions are keyed by endpoint URL, so switching
//! between built-in clusters keeps each side's entries around.

use crate::api_client::ApiClient;
use crate::cache::CacheEntry;
use crate::cluster::{Cluster, ClusterContext, ClusterState};
use crate::error::FetchResult;
use crate::resource::{ErrorReporter, Resource};
use crate::resources::address::AccountDetail;
use crate::resources::address_history::AddressHistory;
use crate::resources::epoch::EpochSnapshot;
use crate::resources::latest_transactions::LatestTransactions;
use crate::resources::mint::MintDetail;
use crate::resources::tokens::TokenHoldings;
use crate::resources::top_accounts::TopAccounts;
use crate::resources::transaction::TransactionDetail;
use crate::resources::validators::Validators;
use crate::resources::{
    address, address_history, epoch, latest_blocks, latest_transactions, mint, tokens, top_accounts,
    transaction, validators,
};
use crate::types::{LargestAccountsFilter, LatestBlocksResponse, MessageResponse};
use std::sync::Arc;

pub struct Explorer {
    cluster: ClusterContext,
    api: ApiClient,
    pub epoch: Resource<EpochSnapshot>,
    pub validators: Resource<Validators>,
    pub blocks: Resource<LatestBlocksResponse>,
    pub transactions: Resource<LatestTransactions>,
    pub accounts: Resource<AccountDetail>,
    pub history: Resource<AddressHistory>,
    pub transaction_details: Resource<TransactionDetail>,
    pub tokens: Resource<TokenHoldings>,
    pub mints: Resource<MintDetail>,
    pub top_accounts: Resource<TopAccounts>,
}

impl Explorer {
    pub fn new(cluster: ClusterContext, api: ApiClient, reporter: Arc<dyn ErrorReporter>) -> Self {
        Self {
            cluster,
            api,
            epoch: Resource::new("epoch", reporter.clone()),
            validators: Resource::new("validators", reporter.clone()),
            blocks: Resource::new("latest_blocks", reporter.clone()),
            transactions: Resource::new("latest_transactions", reporter.clone()),
            accounts: Resource::new("address", reporter.clone()),
            history: Resource::new("address_history", reporter.clone()),
            transaction_details: Resource::new("transaction", reporter.clone()),
            tokens: Resource::new("tokens", reporter.clone()),
            mints: Resource::new("mint", reporter.clone()),
            top_accounts: Resource::new("top_accounts", reporter),
        }
    }

    pub fn cluster(&self) -> &ClusterContext {
        &self.cluster
    }

    pub async fn connect(&self) -> ClusterState {
        self.cluster.connect().await
    }

    /// Select another cluster. A custom endpoint that is being left behind
    /// has its partition dropped; built-in clusters keep theirs.
    pub async fn switch_cluster(&self, cluster: Cluster, custom_url: Option<String>) -> ClusterState {
        let (switched, state) = self.cluster.switch(cluster, custom_url).await;
        if switched.from.cluster == Cluster::Custom && switched.from.url != switched.to.url {
            self.clear_url(&switched.from.url);
        }
        state
    }

    /// Drop everything cached for the current endpoint and handshake again.
    pub async fn reconnect(&self) -> ClusterState {
        self.clear_url(&self.cluster.url());
        self.cluster.connect().await
    }

    pub fn clear_url(&self, url: &str) {
        log::info!("[explorer] clearing cache for {url}");
        self.epoch.clear(url);
        self.validators.clear(url);
        self.blocks.clear(url);
        self.transactions.clear(url);
        self.accounts.clear(url);
        self.history.clear(url);
        self.transaction_details.clear(url);
        self.tokens.clear(url);
        self.mints.clear(url);
        self.top_accounts.clear(url);
    }

    pub async fn epoch(&self, refresh: bool) -> Option<CacheEntry<EpochSnapshot>> {
        let (scope, rpc) = (self.cluster.scope(), self.cluster.rpc());
        if refresh {
            return epoch::fetch(&self.epoch, &scope, rpc.as_ref()).await;
        }
        self.epoch
            .ensure(&scope, epoch::KEY, || epoch::load(rpc.as_ref()))
            .await
    }

    pub async fn validators(&self, refresh: bool) -> Option<CacheEntry<Validators>> {
        let (scope, rpc) = (self.cluster.scope(), self.cluster.rpc());
        if refresh {
            return validators::fetch(&self.validators, &scope, rpc.as_ref()).await;
        }
        self.validators
            .ensure(&scope, validators::KEY, || validators::load(rpc.as_ref()))
            .await
    }

    /// Always goes to the proxy: each call may ask for a different window.
    pub async fn latest_blocks(&self, before: Option<u64>) -> Option<CacheEntry<LatestBlocksResponse>> {
        latest_blocks::fetch(&self.blocks, &self.cluster.scope(), &self.api, before).await
    }

    pub async fn latest_transactions(&self, page: usize, docs: usize) -> Option<CacheEntry<LatestTransactions>> {
        latest_transactions::fetch(&self.transactions, &self.cluster.scope(), &self.api, page, docs).await
    }

    /// Ask the proxy to refresh its index, then reload the first page.
    pub async fn refresh_transactions(&self, docs: usize) -> FetchResult<MessageResponse> {
        let scope = self.cluster.scope();
        let msg = latest_transactions::refresh(&self.api, &scope).await?;
        log::info!("[explorer] index refresh: {}", msg.message);
        latest_transactions::fetch(&self.transactions, &scope, &self.api, 0, docs).await;
        Ok(msg)
    }

    pub async fn account(&self, addr: &str, refresh: bool) -> Option<CacheEntry<AccountDetail>> {
        let (scope, rpc) = (self.cluster.scope(), self.cluster.rpc());
        if refresh {
            return address::fetch(&self.accounts, &scope, rpc.as_ref(), addr).await;
        }
        self.accounts
            .ensure(&scope, addr, || address::load(rpc.as_ref(), addr))
            .await
    }

    pub async fn history(&self, addr: &str, limit: usize) -> Option<CacheEntry<AddressHistory>> {
        let (scope, rpc) = (self.cluster.scope(), self.cluster.rpc());
        address_history::fetch(&self.history, &scope, rpc.as_ref(), addr, limit).await
    }

    pub async fn history_more(&self, addr: &str, limit: usize) -> Option<CacheEntry<AddressHistory>> {
        let (scope, rpc) = (self.cluster.scope(), self.cluster.rpc());
        address_history::load_more(&self.history, &scope, rpc.as_ref(), addr, limit).await
    }

    pub async fn transaction(&self, signature: &str, refresh: bool) -> Option<CacheEntry<TransactionDetail>> {
        let (scope, rpc) = (self.cluster.scope(), self.cluster.rpc());
        if refresh {
            return transaction::fetch(&self.transaction_details, &scope, rpc.as_ref(), signature).await;
        }
        self.transaction_details
            .ensure(&scope, signature, || transaction::load(rpc.as_ref(), signature))
            .await
    }

    pub async fn tokens(&self, owner: &str, refresh: bool) -> Option<CacheEntry<TokenHoldings>> {
        let (scope, rpc) = (self.cluster.scope(), self.cluster.rpc());
        if refresh {
            return tokens::fetch(&self.tokens, &scope, rpc.as_ref(), owner).await;
        }
        self.tokens
            .ensure(&scope, owner, || tokens::load(rpc.as_ref(), owner, mint::METADATA_TIMEOUT))
            .await
    }

    pub async fn mint(&self, addr: &str, refresh: bool) -> Option<CacheEntry<MintDetail>> {
        let (scope, rpc) = (self.cluster.scope(), self.cluster.rpc());
        if refresh {
            return mint::fetch(&self.mints, &scope, rpc.as_ref(), addr).await;
        }
        self.mints
            .ensure(&scope, addr, || mint::load(rpc.as_ref(), addr, mint::METADATA_TIMEOUT))
            .await
    }

    pub async fn top_accounts(
        &self,
        filter: Option<LargestAccountsFilter>,
        refresh: bool,
    ) -> Option<CacheEntry<TopAccounts>> {
        let (scope, rpc) = (self.cluster.scope(), self.cluster.rpc());
        if refresh {
            return top_accounts::fetch(&self.top_accounts, &scope, rpc.as_ref(), filter).await;
        }
        self.top_accounts
            .ensure(&scope, top_accounts::key(filter), || top_accounts::load(rpc.as_ref(), filter))
            .await
    }
}

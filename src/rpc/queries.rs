//! Function bodies. Reads run against a wallet snapshot taken under the
//! wallet access mutex; signing functions queue a request and defer.

use serde::Deserialize;
use serde_json::{json, Value as Json};
use std::collections::BTreeMap;
use std::sync::Arc;

use super::params::Params;
use super::{RpcFunction, RpcRequest};
use crate::chain::{Address, AssetId, Encoded, TxOutput, UnspentOutput, Value};
use crate::connector::{ConnectedSite, Context, Continuation, PendingSign, SignPayload, TabId};
use crate::error::{ConnectorResult, DappError, DataSignErrorCode, UtxoErrorCode};
use crate::host::Surface;
use crate::selection::{build_reorg, paginate, select_collateral, CollateralError, SelectionError, TxBuilder};
use crate::signing::{self, SignError};
use crate::wallet::{SubmittedTx, Wallet, WalletAddress, WalletSnapshot};

pub(crate) enum Reply {
    Value(Json),
    Deferred,
}

/// One call against a connected tab.
pub(crate) struct Call<'a> {
    pub ctx: &'a Context,
    pub tab_id: TabId,
    pub site: &'a ConnectedSite,
    pub wallet: Arc<dyn Wallet>,
    pub request: &'a RpcRequest,
    pub params: Params<'a>,
}

impl<'a> Call<'a> {
    pub async fn run(self, function: RpcFunction) -> ConnectorResult<Reply> {
        let value = match function {
            // Answered by the dispatcher before a wallet is resolved.
            RpcFunction::Ping | RpcFunction::IsEnabled => json!(true),
            RpcFunction::GetBalance => self.get_balance().await?,
            RpcFunction::GetUtxos => self.get_utxos().await?,
            RpcFunction::GetUsedAddresses => {
                let page = self.params.paginate(0)?;
                let snapshot = self.snapshot().await?;
                let addresses = address_list(snapshot.used_addresses());
                json!(paginate(&addresses, page).map_err(|e| DappError::paginate(e.max_size))?)
            }
            RpcFunction::GetUnusedAddresses => json!(address_list(self.snapshot().await?.unused_addresses())),
            RpcFunction::GetRewardAddresses => json!(address_list(self.snapshot().await?.reward_addresses())),
            RpcFunction::GetChangeAddress => {
                let snapshot = self.snapshot().await?;
                let change = snapshot.change_address().ok_or_else(|| DappError::internal("wallet has no addresses"))?;
                json!(change.address.to_hex())
            }
            RpcFunction::GetNetworkId => json!(self.snapshot().await?.network_id),
            RpcFunction::ListNfts => self.list_nfts().await?,
            RpcFunction::GetStakeKey => {
                let snapshot = self.snapshot().await?;
                match (&snapshot.stake_key, snapshot.stake_key_hash()) {
                    (Some(key), Some(key_hash)) => json!({ "key": key, "keyHash": key_hash }),
                    _ => return Err(DappError::internal("wallet has no stake key").into()),
                }
            }
            RpcFunction::GetDrepKey => {
                let snapshot = self.snapshot().await?;
                json!(snapshot.drep_key.ok_or_else(|| DappError::internal("wallet has no DRep key"))?)
            }
            RpcFunction::AuthSignHexPayload => {
                let payload = self.params.hex(0)?;
                json!(self.auth()?.sign_hex(payload)?)
            }
            RpcFunction::AuthCheckHexPayload => {
                let payload = self.params.hex(0)?;
                let signature = self.params.hex(1)?;
                json!(self.auth()?.verify_hex(payload, signature)?)
            }
            RpcFunction::CreateTx => self.create_tx().await?,
            RpcFunction::SubmitTx => self.submit_tx().await?,
            RpcFunction::SignTx => {
                let tx = self.params.transaction(0)?;
                let partial_sign = self.params.bool_or(1, false)?;
                return self.defer(SignPayload::Tx { tx, partial_sign }).await;
            }
            RpcFunction::SignData => return self.sign_data().await,
            RpcFunction::GetCollateralUtxos => return self.get_collateral_utxos().await,
        };
        Ok(Reply::Value(value))
    }

    async fn snapshot(&self) -> ConnectorResult<WalletSnapshot> {
        let _guard = self.ctx.mutex.lock().await;
        self.ctx.snapshot(self.wallet.as_ref()).await
    }

    /// Snapshot plus the UTXOs not spent by a journaled submission.
    async fn spendable(&self) -> ConnectorResult<(WalletSnapshot, Vec<UnspentOutput>)> {
        let _guard = self.ctx.mutex.lock().await;
        let snapshot = self.ctx.snapshot(self.wallet.as_ref()).await?;
        let utxos = self.ctx.spendable(&snapshot).await?;
        Ok((snapshot, utxos))
    }

    fn auth(&self) -> Result<&crate::wallet::WalletAuthEntry, DappError> {
        self.site.auth().ok_or_else(|| DappError::refused("site was not granted identification"))
    }

    fn min_utxo(&self) -> u64 { self.ctx.config.params.min_utxo_value }

    async fn get_balance(&self) -> ConnectorResult<Json> {
        let token = match self.params.get(0) {
            None => None,
            Some(Json::String(s)) if s == "*" => None,
            Some(Json::String(s)) => {
                Some(AssetId::parse(s).map_err(|_| DappError::invalid_request(format!("get_balance: bad token id {s}")))?)
            }
            Some(_) => return Err(DappError::invalid_request("get_balance: param 0 must be a token id").into()),
        };
        let (_, utxos) = self.spendable().await?;
        let balance = utxos.iter().fold(Value::default(), |acc, u| acc.add(&u.value()));
        Ok(match token {
            Some(id) => json!(balance.quantity_of(&id).to_string()),
            None => self.request.return_type.render(&balance)?,
        })
    }

    async fn get_utxos(&self) -> ConnectorResult<Json> {
        let amount = self.params.amount(0)?;
        let page = self.params.paginate(1)?;
        let (_, utxos) = self.spendable().await?;
        let utxos = match amount {
            None => utxos,
            Some(target) => match self.ctx.selector.select(&utxos, &target, self.min_utxo()) {
                Ok(selection) => selection.inputs,
                Err(SelectionError::NotEnoughFunds) => return Ok(Json::Null),
                Err(e) => return Err(e.into()),
            },
        };
        let page = paginate(&utxos, page).map_err(|e| DappError::paginate(e.max_size))?;
        Ok(self.request.return_type.render_list(&page)?)
    }

    async fn list_nfts(&self) -> ConnectorResult<Json> {
        let (snapshot, utxos) = self.spendable().await?;
        let mut held: BTreeMap<AssetId, u64> = BTreeMap::new();
        for utxo in &utxos {
            for asset in &utxo.assets {
                let quantity = held.entry(asset.id()).or_insert(0);
                *quantity = quantity.saturating_add(asset.quantity);
            }
        }
        let nfts: Vec<Json> = held
            .into_iter()
            .filter(|(_, quantity)| *quantity == 1)
            .map(|(id, _)| {
                let metadata = snapshot.asset_metadata.get(&id.fingerprint()).cloned().unwrap_or(Json::Null);
                json!({ "policyId": id.policy_id, "name": id.name, "metadata": metadata })
            })
            .collect();
        Ok(Json::Array(nfts))
    }

    async fn create_tx(&self) -> ConnectorResult<Json> {
        let args: CreateTxArgs = self
            .params
            .decode(0, "{includeInputs?, includeOutputs, includeTargets?}")?
            .ok_or_else(|| DappError::invalid_request("create_tx: missing arguments"))?;
        let mut outputs = args.include_outputs;
        for target in &args.include_targets {
            let value = Value::parse_target(&target.value)
                .map_err(|e| DappError::invalid_request(format!("create_tx: bad target value ({e})")))?;
            outputs.push(TxOutput { address: target.address.clone(), value });
        }
        if outputs.is_empty() {
            return Err(DappError::invalid_request("create_tx: no outputs").into());
        }
        Value::try_sum(outputs.iter().map(|o| &o.value))
            .map_err(|e| DappError::invalid_request(format!("create_tx: bad outputs ({e})")))?;
        let wanted: Vec<UnspentOutput> = args
            .include_inputs
            .iter()
            .map(decode_utxo)
            .collect::<Result<_, _>>()?;

        let (snapshot, utxos) = self.spendable().await?;
        let mut pinned = Vec::with_capacity(wanted.len());
        for utxo in &wanted {
            let input = utxo.input();
            let label = format!("{}#{}", input.tx_hash, input.index);
            match utxos.iter().find(|u| u.input() == input) {
                Some(live) => pinned.push(live.clone()),
                None if snapshot.utxos.iter().any(|u| u.input() == input) => {
                    return Err(DappError::utxo(UtxoErrorCode::SpentUtxo, label).into())
                }
                None => return Err(DappError::utxo(UtxoErrorCode::MissingUtxo, label).into()),
            }
        }
        let change = snapshot
            .change_address()
            .map(|a| a.address.clone())
            .ok_or_else(|| DappError::internal("wallet has no change address"))?;

        let built = TxBuilder::new(&self.ctx.config.params, self.ctx.selector.as_ref(), utxos, change)
            .must_include(pinned)
            .outputs(outputs)
            .build()?;
        tracing::debug!(
            tab_id = self.tab_id,
            inputs = built.inputs.len(),
            fee = built.tx.body.fee,
            "Built unsigned transaction"
        );
        Ok(self.request.return_type.render(&built.tx)?)
    }

    async fn submit_tx(&self) -> ConnectorResult<Json> {
        let tx = self.params.transaction(0)?;
        // Submission and its journal entry land together, before any snapshot can reselect the inputs.
        let _guard = self.ctx.mutex.lock().await;
        let tx_hash = self.ctx.backend.submit(&tx).await.map_err(DappError::from)?;
        self.ctx
            .journal
            .record(self.wallet.id(), SubmittedTx::new(&tx_hash, tx.body.inputs.clone()))
            .await?;
        tracing::info!(tab_id = self.tab_id, tx_hash = %tx_hash, "Submitted transaction");
        Ok(json!(tx_hash))
    }

    async fn sign_data(&self) -> ConnectorResult<Reply> {
        let address = self.params.address(0)?;
        let payload = self.params.hex(1)?.to_string();
        let snapshot = self.snapshot().await?;
        match signing::signing_path(&snapshot, &address) {
            Ok(_) => {}
            Err(SignError::AddressNotOwned(info)) => {
                return Err(DappError::data_sign(DataSignErrorCode::AddressNotPk, info).into())
            }
            Err(e) => return Err(e.into()),
        }
        self.defer(SignPayload::Data { address, payload }).await
    }

    async fn get_collateral_utxos(&self) -> ConnectorResult<Reply> {
        let required = self.params.coin(0)?.unwrap_or(self.ctx.config.params.default_collateral);
        let params = &self.ctx.config.params;

        let reorg = {
            let _guard = self.ctx.mutex.lock().await;
            let snapshot = self.ctx.snapshot(self.wallet.as_ref()).await?;
            let utxos = self.ctx.spendable(&snapshot).await?;
            let selection = select_collateral(&utxos, required, params).map_err(collateral_error)?;
            if selection.reorg_target_amount.is_none() {
                return Ok(Reply::Value(self.request.return_type.render_list(&selection.utxos_to_use)?));
            }
            let change = snapshot
                .change_address()
                .map(|a| a.address.clone())
                .ok_or_else(|| DappError::internal("wallet has no change address"))?;
            build_reorg(utxos, required, change, params, self.ctx.selector.as_ref()).map_err(collateral_error)?
        };

        tracing::info!(tab_id = self.tab_id, required, "Collateral requires a reorg transaction");
        self.defer(SignPayload::TxReorg { tx: reorg.tx, required }).await
    }

    async fn defer(&self, payload: SignPayload) -> ConnectorResult<Reply> {
        let request = self.request;
        let sign = PendingSign::new(
            &request.uid,
            &request.protocol,
            payload,
            Continuation {
                function: request.function.clone(),
                params: request.params.clone(),
                return_type: request.return_type,
            },
        );
        self.ctx.sites.enqueue_sign(self.tab_id, sign).await?;
        self.ctx.host.open_confirmation(self.tab_id, Surface::Sign).await?;
        Ok(Reply::Deferred)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateTxArgs {
    #[serde(default)]
    include_inputs: Vec<Json>,
    #[serde(default)]
    include_outputs: Vec<TxOutput>,
    #[serde(default)]
    include_targets: Vec<Target>,
}

#[derive(Debug, Deserialize)]
struct Target {
    address: Address,
    value: Json,
}

fn decode_utxo(raw: &Json) -> Result<UnspentOutput, DappError> {
    let invalid = || DappError::invalid_request("create_tx: bad includeInputs entry");
    match raw {
        Json::String(hex) => UnspentOutput::decode_hex(hex).map_err(|_| invalid()),
        Json::Object(_) => serde_json::from_value(raw.clone()).map_err(|_| invalid()),
        _ => Err(invalid()),
    }
}

fn address_list(addresses: Vec<&WalletAddress>) -> Vec<String> {
    addresses.into_iter().map(|a| a.address.to_hex()).collect()
}

fn collateral_error(err: CollateralError) -> DappError {
    match err {
        CollateralError::ExceedsMaximum { .. } => DappError::invalid_request(err.to_string()),
        CollateralError::Selection(e) => DappError::invalid_request(e.wire_info()),
    }
}

use crate::core::asset::{AssetCode, AssetRegistry};
use crate::core::decimal::{round_to, FIAT_PROFIT_SCALE};
use crate::core::transaction::TransactionKind;
use crate::ledger::state::DeskState;
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// Realized profit of every transaction, grouped by profit currency.
///
/// Only fiat profit currencies are reported; fiat hops book their (zero)
/// profit in the settlement asset and are left out.
pub fn profit_by_currency(state: &DeskState, registry: &AssetRegistry) -> BTreeMap<AssetCode, Decimal> {
    let mut totals: BTreeMap<AssetCode, Decimal> = BTreeMap::new();
    for tx in &state.transactions {
        let Some(currency) = tx.profit_currency.as_ref() else {
            continue;
        };
        if registry.is_fiat(currency) {
            *totals.entry(currency.clone()).or_default() += tx.realized_profit;
        }
    }
    totals
        .into_iter()
        .map(|(currency, total)| (currency, round_to(total, FIAT_PROFIT_SCALE)))
        .collect()
}

/// Net cash flow per asset: everything the desk took in minus everything
/// it paid out, deposits and withdrawals included.
pub fn cashflow(state: &DeskState) -> BTreeMap<AssetCode, Decimal> {
    let mut flows: BTreeMap<AssetCode, Decimal> = BTreeMap::new();
    for tx in &state.transactions {
        match tx.kind {
            TransactionKind::Deposit => {
                *flows.entry(tx.from_asset.clone()).or_default() += tx.amount_from;
            }
            TransactionKind::Withdrawal => {
                *flows.entry(tx.from_asset.clone()).or_default() -= tx.amount_from;
            }
            TransactionKind::FiatToSettlement | TransactionKind::SettlementToFiat => {
                *flows.entry(tx.from_asset.clone()).or_default() += tx.amount_from;
                if let Some(to) = &tx.to_asset {
                    *flows.entry(to.clone()).or_default() -= tx.final_amount;
                }
            }
            // The desk's own hop: the source leaves, the proceeds arrive.
            TransactionKind::FiatToFiat => {
                *flows.entry(tx.from_asset.clone()).or_default() -= tx.amount_from;
                if let Some(to) = &tx.to_asset {
                    *flows.entry(to.clone()).or_default() += tx.final_amount;
                }
            }
        }
    }
    flows
        .into_iter()
        .map(|(asset, net)| (asset, round_to(net, FIAT_PROFIT_SCALE)))
        .collect()
}

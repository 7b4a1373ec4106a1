use crate::value_objects::contract::ContractInfo;

/// Contract symbols whose base asset is `ticker`, best first: USDT-margined
/// before the rest, perpetuals before dated contracts, then by symbol.
pub fn rank_contract_candidates(ticker: &str, contracts: &[ContractInfo]) -> Vec<String> {
    let ticker = ticker.trim().to_uppercase();
    let mut matches: Vec<&ContractInfo> = contracts
        .iter()
        .filter(|contract| contract.base_asset == ticker)
        .collect();
    matches.sort_by(|a, b| {
        (!a.is_usdt_margined(), !a.is_perpetual(), &a.symbol).cmp(&(
            !b.is_usdt_margined(),
            !b.is_perpetual(),
            &b.symbol,
        ))
    });
    let mut symbols: Vec<String> = matches.into_iter().map(|c| c.symbol.clone()).collect();
    symbols.dedup();
    symbols
}

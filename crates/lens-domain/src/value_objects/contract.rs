use serde::{Deserialize, Serialize};

/// One entry of an exchange's futures contract listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractInfo {
    pub symbol: String,
    pub base_asset: String,
    pub quote_asset: String,
    /// Lowercased exchange label (`perpetual`, `ffwcsx`, ...); may be empty.
    pub contract_type: String,
}

impl ContractInfo {
    pub fn new(
        symbol: impl AsRef<str>,
        base_asset: impl AsRef<str>,
        quote_asset: impl AsRef<str>,
        contract_type: impl AsRef<str>,
    ) -> Self {
        Self {
            symbol: symbol.as_ref().trim().to_uppercase(),
            base_asset: base_asset.as_ref().trim().to_uppercase(),
            quote_asset: quote_asset.as_ref().trim().to_uppercase(),
            contract_type: contract_type.as_ref().trim().to_lowercase(),
        }
    }

    pub fn is_usdt_margined(&self) -> bool {
        self.symbol.contains("USDT") || self.quote_asset == "USDT"
    }

    pub fn is_perpetual(&self) -> bool {
        self.contract_type.contains("perp")
    }
}

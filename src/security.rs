use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SecurityType {
    Equity,
    Crypto,
    Forex,
    Commodity,
    Index,
    Bond,
}

impl SecurityType {
    pub fn label(&self) -> &'static str {
        match self {
            SecurityType::Equity => "Equity",
            SecurityType::Crypto => "Crypto",
            SecurityType::Forex => "Forex",
            SecurityType::Commodity => "Commodity",
            SecurityType::Index => "Index",
            SecurityType::Bond => "Bond",
        }
    }
}

/// Resolved security identity. Built once by the symbol search, then cloned
/// into tabs and the group map; never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Security {
    pub symbol: String,
    pub name: String,
    pub kind: SecurityType,
    #[serde(default)]
    pub exchange: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
}

impl Security {
    pub fn listing_label(&self) -> String {
        match &self.exchange {
            Some(exchange) if !exchange.is_empty() => {
                format!("{} ({})", self.symbol, exchange)
            }
            _ => self.symbol.clone(),
        }
    }
}

use std::collections::HashMap;

use once_cell::sync::Lazy;

/// One entry of the function-code registry: a short mnemonic naming a
/// terminal screen, plus the metadata the command bar and HELP screen show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionInfo {
    pub code: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub requires_security: bool,
    pub category: &'static str,
}

/// Function opened by fresh tabs and reset panels.
pub const DEFAULT_TAB_FUNCTION: &str = "TOP";
/// Function opened when a command names a security without a function code.
pub const DEFAULT_SECURITY_FUNCTION: &str = "DES";

const MAX_SUGGESTIONS: usize = 10;

pub const FUNCTION_REGISTRY: &[FunctionInfo] = &[
    FunctionInfo {
        code: "DES",
        name: "Description",
        description: "Company overview and key statistics",
        requires_security: true,
        category: "Equity",
    },
    FunctionInfo {
        code: "GP",
        name: "Graph/Price",
        description: "Interactive price chart with technical indicators",
        requires_security: true,
        category: "Equity",
    },
    FunctionInfo {
        code: "FA",
        name: "Financial Analysis",
        description: "Income statement, balance sheet, and cash flow",
        requires_security: true,
        category: "Equity",
    },
    FunctionInfo {
        code: "ANR",
        name: "Analyst Recommendations",
        description: "Analyst ratings, price targets, and consensus",
        requires_security: true,
        category: "Equity",
    },
    FunctionInfo {
        code: "DVD",
        name: "Dividends",
        description: "Dividend history and upcoming payments",
        requires_security: true,
        category: "Equity",
    },
    FunctionInfo {
        code: "ERN",
        name: "Earnings",
        description: "Earnings history, estimates, and surprises",
        requires_security: true,
        category: "Equity",
    },
    FunctionInfo {
        code: "COMP",
        name: "Comparable Companies",
        description: "Peer comparison and relative valuation",
        requires_security: true,
        category: "Equity",
    },
    FunctionInfo {
        code: "RV",
        name: "Relative Value",
        description: "Relative valuation metrics vs peers",
        requires_security: true,
        category: "Equity",
    },
    FunctionInfo {
        code: "TOP",
        name: "Top News",
        description: "Top market news and headlines",
        requires_security: false,
        category: "News",
    },
    FunctionInfo {
        code: "WEI",
        name: "World Equity Indices",
        description: "Global equity index performance",
        requires_security: false,
        category: "Market",
    },
    FunctionInfo {
        code: "MOST",
        name: "Most Active",
        description: "Most active stocks by volume and movers",
        requires_security: false,
        category: "Market",
    },
    FunctionInfo {
        code: "MOV",
        name: "Movers",
        description: "Biggest gainers and losers",
        requires_security: false,
        category: "Market",
    },
    FunctionInfo {
        code: "WB",
        name: "World Bond Markets",
        description: "Global government bond yields",
        requires_security: false,
        category: "Fixed Income",
    },
    FunctionInfo {
        code: "CRVF",
        name: "Yield Curve",
        description: "Treasury yield curve visualization",
        requires_security: false,
        category: "Fixed Income",
    },
    FunctionInfo {
        code: "FXCA",
        name: "FX Calculator",
        description: "Currency conversion calculator",
        requires_security: false,
        category: "Forex",
    },
    FunctionInfo {
        code: "FXMON",
        name: "FX Monitor",
        description: "Real-time foreign exchange rates",
        requires_security: false,
        category: "Forex",
    },
    FunctionInfo {
        code: "CMDTY",
        name: "Commodities",
        description: "Commodity prices across energy, metals, agriculture",
        requires_security: false,
        category: "Commodities",
    },
    FunctionInfo {
        code: "ECO",
        name: "Economic Calendar",
        description: "Upcoming economic events and releases",
        requires_security: false,
        category: "Economics",
    },
    FunctionInfo {
        code: "ECST",
        name: "Economic Statistics",
        description: "Key economic indicators and data series",
        requires_security: false,
        category: "Economics",
    },
    FunctionInfo {
        code: "CRYPTO",
        name: "Cryptocurrency",
        description: "Cryptocurrency prices and market data",
        requires_security: false,
        category: "Crypto",
    },
    FunctionInfo {
        code: "PORT",
        name: "Portfolio",
        description: "Portfolio manager and performance tracker",
        requires_security: false,
        category: "Portfolio",
    },
    FunctionInfo {
        code: "EQS",
        name: "Equity Screener",
        description: "Stock screener with custom filters",
        requires_security: false,
        category: "Tools",
    },
    FunctionInfo {
        code: "OMON",
        name: "Options Monitor",
        description: "Options chain and greeks analysis",
        requires_security: true,
        category: "Tools",
    },
    FunctionInfo {
        code: "HMAP",
        name: "Heat Map",
        description: "Market sector heat map visualization",
        requires_security: false,
        category: "Tools",
    },
    FunctionInfo {
        code: "ALRT",
        name: "Alerts",
        description: "Price and volume alert manager",
        requires_security: false,
        category: "Tools",
    },
    FunctionInfo {
        code: "IB",
        name: "Instant Messaging",
        description: "Chat and messaging",
        requires_security: false,
        category: "Communication",
    },
    FunctionInfo {
        code: "WATC",
        name: "Watchlist",
        description: "Custom security watchlist",
        requires_security: false,
        category: "Tools",
    },
    FunctionInfo {
        code: "SET",
        name: "Settings",
        description: "Terminal settings and preferences",
        requires_security: false,
        category: "System",
    },
    FunctionInfo {
        code: "HELP",
        name: "Help",
        description: "Function codes reference and help",
        requires_security: false,
        category: "System",
    },
];

/// F1..F12 bindings shown on the function key bar, in key order.
pub const FUNCTION_KEYS: [(&str, &str); 12] = [
    ("HELP", "HELP"),
    ("NEWS", "TOP"),
    ("WEI", "WEI"),
    ("PORT", "PORT"),
    ("CMDTY", "CMDTY"),
    ("WB", "WB"),
    ("EQS", "EQS"),
    ("GP", "GP"),
    ("FXMON", "FXMON"),
    ("MOST", "MOST"),
    ("CRYPTO", "CRYPTO"),
    ("ECO", "ECO"),
];

static FUNCTION_INDEX: Lazy<HashMap<&'static str, &'static FunctionInfo>> =
    Lazy::new(|| FUNCTION_REGISTRY.iter().map(|info| (info.code, info)).collect());

pub fn lookup(code: &str) -> Option<&'static FunctionInfo> {
    FUNCTION_INDEX.get(code).copied()
}

pub fn is_function_code(code: &str) -> bool {
    lookup(code).is_some()
}

/// Registry entries matching the partial input, capped at ten. An empty
/// input lists the head of the registry so the dropdown is never blank.
pub fn suggestions(input: &str) -> Vec<&'static FunctionInfo> {
    let query = input.trim().to_uppercase();
    if query.is_empty() {
        return FUNCTION_REGISTRY.iter().take(MAX_SUGGESTIONS).collect();
    }
    FUNCTION_REGISTRY
        .iter()
        .filter(|info| {
            info.code.contains(&query)
                || info.name.to_uppercase().contains(&query)
                || info.description.to_uppercase().contains(&query)
        })
        .take(MAX_SUGGESTIONS)
        .collect()
}

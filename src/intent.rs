use crate::functions;

/// Parsed meaning of one command-bar entry, prior to any security lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    /// The whole input is a registered function code.
    Function(String),
    /// A security query followed by a function code.
    SecurityFunction { query: String, code: String },
    /// A bare security query; callers show the default security function.
    Security(String),
    Unknown,
}

/// Deterministic, no I/O. Precedence: whole-string function code, the
/// `<QUERY> US EQUITY <CODE>` listing form, function code as final token,
/// then everything else is a security query.
pub fn parse(input: &str) -> Intent {
    let raw = input.trim().to_uppercase();
    if raw.is_empty() {
        return Intent::Unknown;
    }
    if functions::is_function_code(&raw) {
        return Intent::Function(raw);
    }
    let tokens: Vec<&str> = raw.split_whitespace().collect();
    if let Some(intent) = match_listing_form(&tokens) {
        return intent;
    }
    if tokens.len() >= 2 {
        let last = tokens[tokens.len() - 1];
        if functions::is_function_code(last) {
            return Intent::SecurityFunction {
                query: tokens[..tokens.len() - 1].join(" "),
                code: last.to_string(),
            };
        }
    }
    Intent::Security(raw)
}

/// `<QUERY> US EQUITY <CODE>` with a registered final code. Checked before
/// the generic suffix rule so the connective tokens stay out of the query.
fn match_listing_form(tokens: &[&str]) -> Option<Intent> {
    if tokens.len() < 4 {
        return None;
    }
    let code = tokens[tokens.len() - 1];
    if tokens[tokens.len() - 3] != "US"
        || tokens[tokens.len() - 2] != "EQUITY"
        || !functions::is_function_code(code)
    {
        return None;
    }
    Some(Intent::SecurityFunction {
        query: tokens[..tokens.len() - 3].join(" "),
        code: code.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whole_string_function_code() {
        assert_eq!(parse("GP"), Intent::Function("GP".to_string()));
        assert_eq!(parse("  gp "), Intent::Function("GP".to_string()));
    }

    #[test]
    fn query_with_trailing_function_code() {
        assert_eq!(
            parse("AAPL GP"),
            Intent::SecurityFunction {
                query: "AAPL".to_string(),
                code: "GP".to_string(),
            }
        );
        assert_eq!(
            parse("berkshire hathaway des"),
            Intent::SecurityFunction {
                query: "BERKSHIRE HATHAWAY".to_string(),
                code: "DES".to_string(),
            }
        );
    }

    #[test]
    fn listing_form_drops_connective_tokens() {
        assert_eq!(
            parse("AAPL US EQUITY DES"),
            Intent::SecurityFunction {
                query: "AAPL".to_string(),
                code: "DES".to_string(),
            }
        );
        assert_eq!(
            parse("berkshire hathaway us equity gp"),
            Intent::SecurityFunction {
                query: "BERKSHIRE HATHAWAY".to_string(),
                code: "GP".to_string(),
            }
        );
    }

    #[test]
    fn bare_query_is_a_security() {
        assert_eq!(parse("AAPL"), Intent::Security("AAPL".to_string()));
        assert_eq!(
            parse("MSFT US EQUITY"),
            Intent::Security("MSFT US EQUITY".to_string())
        );
        assert_eq!(
            parse("AAPL XYZ"),
            Intent::Security("AAPL XYZ".to_string())
        );
    }

    #[test]
    fn empty_input_is_unknown() {
        assert_eq!(parse(""), Intent::Unknown);
        assert_eq!(parse("   "), Intent::Unknown);
    }
}

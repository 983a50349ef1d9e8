//! Parsers turning raw source text into proxy candidates
//!
//! Each strategy is a pure function over the fetched body. Malformed
//! lines are dropped individually and never abort the whole parse.

use crate::pool::models::{ParserKind, Proxy, ProxyType};
use once_cell::sync::Lazy;
use regex::Regex;

/// Matches `user:pass@ip:port`
static AUTH_LINE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([^:@\s]+):([^:@\s]+)@([^:@\s]+):(\d{1,5})$").expect("Invalid auth line regex")
});

/// Matches `ip:port`
static ADDR_LINE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([^:@\s]+):(\d{1,5})$").expect("Invalid addr line regex"));

/// Proxy list parser, dispatched on a source's [`ParserKind`]
pub struct ProxyParser;

impl ProxyParser {
    /// Parse a source body with the strategy for `kind`
    pub fn parse(kind: ParserKind, text: &str) -> Vec<Proxy> {
        match kind {
            ParserKind::SimpleList => Self::parse_simple_list(text),
            ParserKind::CustomFormat => Self::parse_custom_format(text),
            // No JSON source has an agreed schema; the fetcher skips
            // these sources, and parsing must never fail.
            ParserKind::Json => Vec::new(),
        }
    }

    /// Parse one candidate per line.
    ///
    /// Supports `ip:port` and `user:pass@ip:port`; blank lines and `#`
    /// comments are skipped, anything else is dropped.
    fn parse_simple_list(text: &str) -> Vec<Proxy> {
        text.lines()
            .filter_map(|line| {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    return None;
                }
                Self::parse_simple_line(line)
            })
            .collect()
    }

    fn parse_simple_line(line: &str) -> Option<Proxy> {
        if let Some(caps) = AUTH_LINE_REGEX.captures(line) {
            let port: u16 = caps[4].parse().ok()?;
            return Some(Proxy::with_auth(
                caps[3].to_string(),
                port,
                ProxyType::Http,
                caps[1].to_string(),
                caps[2].to_string(),
            ));
        }

        let caps = ADDR_LINE_REGEX.captures(line)?;
        let port: u16 = caps[2].parse().ok()?;
        Some(Proxy::new(caps[1].to_string(), port, ProxyType::Http))
    }

    /// Tolerant parse for lists with extra per-line columns.
    ///
    /// Takes the first whitespace-separated token of each line; a token
    /// with exactly one `:` is treated as `ip:port`, anything else drops
    /// the line.
    fn parse_custom_format(text: &str) -> Vec<Proxy> {
        text.lines()
            .filter_map(|line| {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    return None;
                }

                let token = line.split_whitespace().next()?;
                if token.matches(':').count() != 1 {
                    return None;
                }

                let (host, port) = token.split_once(':')?;
                let port: u16 = port.parse().ok()?;
                Some(Proxy::new(host.to_string(), port, ProxyType::Http))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_list_drops_malformed_lines() {
        let text = "1.2.3.4:8080\n#comment\nbaduri\nuser:pass@5.6.7.8:3128\n";
        let proxies = ProxyParser::parse(ParserKind::SimpleList, text);

        assert_eq!(proxies.len(), 2);
        assert_eq!(proxies[0].host, "1.2.3.4");
        assert_eq!(proxies[0].port, 8080);
        assert_eq!(proxies[0].proxy_type, ProxyType::Http);
        assert!(proxies[0].auth.is_none());

        assert_eq!(proxies[1].host, "5.6.7.8");
        assert_eq!(proxies[1].port, 3128);
        let auth = proxies[1].auth.as_ref().unwrap();
        assert_eq!(auth.username, "user");
        assert_eq!(auth.password, "pass");
    }

    #[test]
    fn test_simple_list_skips_blank_and_comment_lines() {
        let text = "\n# HTTP Proxies\n192.168.1.1:8080\n\n# More\n192.168.1.2:3128\n";
        let proxies = ProxyParser::parse(ParserKind::SimpleList, text);
        assert_eq!(proxies.len(), 2);
    }

    #[test]
    fn test_simple_list_drops_invalid_port() {
        let text = "192.168.1.1:abc\n192.168.1.1:99999\n192.168.1.2:8080\n";
        let proxies = ProxyParser::parse(ParserKind::SimpleList, text);
        assert_eq!(proxies.len(), 1);
        assert_eq!(proxies[0].host, "192.168.1.2");
    }

    #[test]
    fn test_custom_format_takes_first_token() {
        let text = "1.2.3.4:8080 US anonymous\n# comment\n5.6.7.8:3128\tfast\n";
        let proxies = ProxyParser::parse(ParserKind::CustomFormat, text);
        assert_eq!(proxies.len(), 2);
        assert_eq!(proxies[0].host, "1.2.3.4");
        assert_eq!(proxies[0].port, 8080);
        assert_eq!(proxies[1].host, "5.6.7.8");
        assert_eq!(proxies[1].port, 3128);
    }

    #[test]
    fn test_custom_format_drops_other_shapes() {
        let text = "just-a-hostname more text\nuser:pass@1.2.3.4:8080\n1.2.3.4:8080:extra\n";
        let proxies = ProxyParser::parse(ParserKind::CustomFormat, text);
        assert!(proxies.is_empty());
    }

    #[test]
    fn test_json_returns_empty() {
        let text = r#"[{"ip": "1.2.3.4", "port": 8080}]"#;
        let proxies = ProxyParser::parse(ParserKind::Json, text);
        assert!(proxies.is_empty());
    }
}

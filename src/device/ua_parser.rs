use woothee::parser::Parser;

use crate::storage::models::{DeviceInfo, DeviceKind};

/// Parse a User-Agent string into the device info captured on a token.
///
/// Used for the "login requested from Chrome on Windows" confirmation shown
/// to the mobile user; never an authorization input.
pub fn parse_user_agent(user_agent: &str) -> DeviceInfo {
    let parsed = Parser::new().parse(user_agent);

    let Some(result) = parsed else {
        return DeviceInfo {
            raw_user_agent: user_agent.to_string(),
            ..Default::default()
        };
    };

    let kind = match result.category {
        "pc" => DeviceKind::Desktop,
        "smartphone" | "mobilephone" => DeviceKind::Mobile,
        "tablet" => DeviceKind::Tablet,
        "crawler" => DeviceKind::Bot,
        _ => DeviceKind::Unknown,
    };

    DeviceInfo {
        browser: non_empty(result.name),
        browser_version: non_empty(&result.version),
        kind,
        os: non_empty(result.os),
        os_version: non_empty(&result.os_version),
        raw_user_agent: user_agent.to_string(),
    }
}

/// Woothee reports missing fields as "" or "UNKNOWN".
fn non_empty(value: &str) -> Option<String> {
    if value.is_empty() || value == "UNKNOWN" {
        None
    } else {
        Some(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_desktop_browser() {
        let ua = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
        let info = parse_user_agent(ua);

        assert_eq!(info.kind, DeviceKind::Desktop);
        assert_eq!(info.browser.as_deref(), Some("Chrome"));
        assert_eq!(info.os.as_deref(), Some("Windows 10"));
    }

    #[test]
    fn test_mobile_scanner() {
        let ua = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Mobile/15E148 Safari/604.1";
        let info = parse_user_agent(ua);

        assert_eq!(info.kind, DeviceKind::Mobile);
    }

    #[test]
    fn test_unparseable_keeps_raw() {
        let ua = "SomeUnknownClient/1.0";
        let info = parse_user_agent(ua);

        assert_eq!(info.raw_user_agent, ua);
        assert_eq!(info.kind, DeviceKind::Unknown);
    }

    #[test]
    fn test_empty_user_agent() {
        let info = parse_user_agent("");

        assert_eq!(info.kind, DeviceKind::Unknown);
        assert!(info.browser.is_none());
        assert!(info.os.is_none());
    }
}

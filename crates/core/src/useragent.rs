//! Browser/OS/device rollup helpers for the Stats Aggregator (§4.G).
//!
//! Per DESIGN.md Open Question 3: there is no externally populated
//! `device_analytics` table in this implementation. Breakdown fields are
//! parsed directly from the `user_agent` string captured on `Error` rows
//! and from viewport/device hints in session `metadata`, server-side.

use std::sync::OnceLock;

use regex::Regex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserAgentInfo {
    pub browser: String,
    pub browser_major: String,
    pub os: String,
    pub os_major: String,
    pub device: String,
}

struct UaPatterns {
    chrome: Regex,
    firefox: Regex,
    safari: Regex,
    edge: Regex,
    windows: Regex,
    macos: Regex,
    linux: Regex,
    android: Regex,
    ios: Regex,
    mobile: Regex,
    tablet: Regex,
}

fn patterns() -> &'static UaPatterns {
    static PATTERNS: OnceLock<UaPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| UaPatterns {
        chrome: Regex::new(r"Chrome/([\d.]+)").unwrap(),
        firefox: Regex::new(r"Firefox/([\d.]+)").unwrap(),
        safari: Regex::new(r"Version/([\d.]+).*Safari").unwrap(),
        edge: Regex::new(r"Edg(?:e|A|iOS)?/([\d.]+)").unwrap(),
        windows: Regex::new(r"Windows NT ([\d.]+)").unwrap(),
        macos: Regex::new(r"Mac OS X ([\d_.]+)").unwrap(),
        linux: Regex::new(r"Linux").unwrap(),
        android: Regex::new(r"Android ([\d.]+)").unwrap(),
        ios: Regex::new(r"OS ([\d_]+) like Mac OS X").unwrap(),
        mobile: Regex::new(r"Mobile|iPhone").unwrap(),
        tablet: Regex::new(r"Tablet|iPad").unwrap(),
    })
}

/// Splits a version string on `.` (or `_`, Apple's convention) and takes
/// the first segment, per §4.G's "major version" device rollup rule.
pub fn major_version(version: &str) -> String {
    version
        .split(['.', '_'])
        .next()
        .unwrap_or(version)
        .to_string()
}

/// Buckets a raw device-type label into `{mobile, desktop}` per §4.G:
/// `{mobile, tablet}` both roll up into `"mobile"`, everything else into
/// `"desktop"`.
pub fn device_bucket(raw: &str) -> &'static str {
    match raw {
        "mobile" | "tablet" => "mobile",
        _ => "desktop",
    }
}

/// Parses a raw `User-Agent` header into browser/OS/device fields. Best
/// effort: unrecognized strings fall back to `"other"` / `"unknown"`
/// rather than failing, since this is a non-critical rollup dimension.
pub fn parse(user_agent: &str) -> UserAgentInfo {
    let p = patterns();

    let (browser, browser_version) = if let Some(caps) = p.edge.captures(user_agent) {
        ("edge", caps[1].to_string())
    } else if let Some(caps) = p.chrome.captures(user_agent) {
        ("chrome", caps[1].to_string())
    } else if let Some(caps) = p.firefox.captures(user_agent) {
        ("firefox", caps[1].to_string())
    } else if let Some(caps) = p.safari.captures(user_agent) {
        ("safari", caps[1].to_string())
    } else {
        ("other", String::new())
    };

    let (os, os_version) = if let Some(caps) = p.ios.captures(user_agent) {
        ("ios", caps[1].replace('_', "."))
    } else if let Some(caps) = p.android.captures(user_agent) {
        ("android", caps[1].to_string())
    } else if let Some(caps) = p.windows.captures(user_agent) {
        ("windows", caps[1].to_string())
    } else if let Some(caps) = p.macos.captures(user_agent) {
        ("macos", caps[1].replace('_', "."))
    } else if p.linux.is_match(user_agent) {
        ("linux", String::new())
    } else {
        ("unknown", String::new())
    };

    let device = if p.tablet.is_match(user_agent) {
        "tablet"
    } else if p.mobile.is_match(user_agent) {
        "mobile"
    } else {
        "desktop"
    };

    UserAgentInfo {
        browser: browser.to_string(),
        browser_major: major_version(&browser_version),
        os: os.to_string(),
        os_major: major_version(&os_version),
        device: device.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn major_version_splits_on_dot() {
        assert_eq!(major_version("120.0.1"), "120");
    }

    #[test]
    fn device_bucket_rolls_tablet_into_mobile() {
        assert_eq!(device_bucket("tablet"), "mobile");
        assert_eq!(device_bucket("mobile"), "mobile");
        assert_eq!(device_bucket("desktop"), "desktop");
        assert_eq!(device_bucket("tv"), "desktop");
    }

    #[test]
    fn parses_chrome_on_windows() {
        let ua = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 Chrome/120.0.0.0 Safari/537.36";
        let info = parse(ua);
        assert_eq!(info.browser, "chrome");
        assert_eq!(info.browser_major, "120");
        assert_eq!(info.os, "windows");
        assert_eq!(info.device, "desktop");
    }

    #[test]
    fn parses_mobile_safari_on_ios() {
        let ua = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_1 like Mac OS X) AppleWebKit/605.1.15 Version/17.1 Mobile Safari/604.1";
        let info = parse(ua);
        assert_eq!(info.os, "ios");
        assert_eq!(info.device, "mobile");
    }
}

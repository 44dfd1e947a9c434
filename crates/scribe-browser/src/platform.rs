//! Platform detection for browser-specific behaviour.
//!
//! Only the Mac flag reaches the core (undo/redo shortcuts). The rest picks
//! overlay workarounds in the adapters.

use std::sync::OnceLock;

/// Cached platform detection results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Platform {
    pub ios: bool,
    pub mac: bool,
    pub android: bool,
    pub chrome: bool,
    pub safari: bool,
    pub gecko: bool,
    pub webkit_version: Option<u32>,
    pub chrome_version: Option<u32>,
    pub mobile: bool,
}

impl Platform {
    /// Whether shortcuts use Cmd rather than Ctrl.
    pub fn uses_meta(&self) -> bool {
        self.mac || self.ios
    }
}

static PLATFORM: OnceLock<Platform> = OnceLock::new();

/// Get cached platform info. Detection runs once on first call.
pub fn platform() -> &'static Platform {
    PLATFORM.get_or_init(detect_platform)
}

/// Classify a user agent / navigator platform pair.
pub fn from_user_agent(user_agent: &str, platform_str: &str, touch: bool) -> Platform {
    let user_agent = user_agent.to_lowercase();
    let platform_str = platform_str.to_lowercase();

    // iPadOS reports a Mac platform; touch support gives it away.
    let ios = user_agent.contains("iphone")
        || user_agent.contains("ipad")
        || user_agent.contains("ipod")
        || (platform_str.contains("mac") && touch);
    let mac = platform_str.contains("mac") && !ios;
    let android = user_agent.contains("android");
    // Edge also carries "chrome".
    let chrome = user_agent.contains("chrome") && !user_agent.contains("edg");
    let safari = user_agent.contains("safari") && !user_agent.contains("chrome");
    let gecko = user_agent.contains("gecko/") && !user_agent.contains("like gecko");
    let mobile = ios || android || user_agent.contains("mobile");

    Platform {
        ios,
        mac,
        android,
        chrome,
        safari,
        gecko,
        webkit_version: extract_version(&user_agent, "applewebkit/"),
        chrome_version: extract_version(&user_agent, "chrome/"),
        mobile,
    }
}

fn extract_version(ua: &str, prefix: &str) -> Option<u32> {
    ua.find(prefix).and_then(|idx| {
        let after = &ua[idx + prefix.len()..];
        let digits: String = after.chars().take_while(|c| c.is_ascii_digit()).collect();
        digits.parse().ok()
    })
}

#[cfg(all(target_arch = "wasm32", target_os = "unknown"))]
fn detect_platform() -> Platform {
    let Some(window) = web_sys::window() else {
        return Platform::default();
    };
    let navigator = window.navigator();
    let user_agent = navigator.user_agent().unwrap_or_default();
    let platform_str = navigator.platform().unwrap_or_default();
    from_user_agent(&user_agent, &platform_str, navigator.max_touch_points() > 0)
}

#[cfg(not(all(target_arch = "wasm32", target_os = "unknown")))]
fn detect_platform() -> Platform {
    Platform::default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ipad_with_mac_platform_is_ios() {
        let p = from_user_agent(
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Safari/605.1.15",
            "MacIntel",
            true,
        );
        assert!(p.ios);
        assert!(!p.mac);
        assert!(p.safari);
        assert_eq!(p.webkit_version, Some(605));
        assert!(p.uses_meta());
    }

    #[test]
    fn test_edge_is_not_chrome() {
        let p = from_user_agent(
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.0.0",
            "Win32",
            false,
        );
        assert!(!p.chrome);
        assert!(!p.safari);
        assert_eq!(p.chrome_version, Some(120));
        assert!(!p.uses_meta());
    }
}

//! Header rewriting. Chrome sends headers in a fixed order and detectors
//! compare against it, so the order here is part of the contract, not a
//! style choice.

use harvest_browser::Fingerprint;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Document,
    Xhr,
    Fetch,
    Script,
    Stylesheet,
    Image,
    Media,
    Font,
    Other,
}

impl RequestKind {
    /// Images, media and fonts pass through untouched.
    pub fn is_passthrough(&self) -> bool {
        matches!(self, RequestKind::Image | RequestKind::Media | RequestKind::Font)
    }

    /// Critical resources are never delayed by the throttle.
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            RequestKind::Document | RequestKind::Xhr | RequestKind::Fetch | RequestKind::Script
        )
    }

    fn accept(&self) -> &'static str {
        match self {
            RequestKind::Document => {
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,\
                 image/apng,*/*;q=0.8,application/signed-exchange;v=b3;q=0.7"
            }
            RequestKind::Stylesheet => "text/css,*/*;q=0.1",
            _ => "*/*",
        }
    }

    fn sec_fetch_dest(&self) -> &'static str {
        match self {
            RequestKind::Document => "document",
            RequestKind::Script => "script",
            RequestKind::Stylesheet => "style",
            RequestKind::Image => "image",
            RequestKind::Media => "video",
            RequestKind::Font => "font",
            _ => "empty",
        }
    }

    fn sec_fetch_mode(&self) -> &'static str {
        match self {
            RequestKind::Document => "navigate",
            RequestKind::Xhr | RequestKind::Fetch => "cors",
            _ => "no-cors",
        }
    }
}

/// Rewritten header list for one request, in Chrome's order. Returns an
/// empty list for pass-through resource kinds.
pub fn rewrite_headers(
    kind: RequestKind,
    fingerprint: &Fingerprint,
    referer: Option<&str>,
) -> Vec<(String, String)> {
    if kind.is_passthrough() {
        return Vec::new();
    }

    let mut headers: Vec<(String, String)> = Vec::with_capacity(12);
    headers.push(("sec-ch-ua".into(), fingerprint.sec_ch_ua.clone()));
    headers.push(("sec-ch-ua-mobile".into(), fingerprint.sec_ch_ua_mobile.clone()));
    headers.push(("sec-ch-ua-platform".into(), fingerprint.sec_ch_ua_platform.clone()));
    if kind == RequestKind::Document {
        headers.push(("upgrade-insecure-requests".into(), "1".into()));
    }
    headers.push(("user-agent".into(), fingerprint.user_agent.clone()));
    headers.push(("accept".into(), kind.accept().into()));
    headers.push(("sec-fetch-site".into(), if kind == RequestKind::Document { "none" } else { "same-origin" }.into()));
    headers.push(("sec-fetch-mode".into(), kind.sec_fetch_mode().into()));
    if kind == RequestKind::Document {
        headers.push(("sec-fetch-user".into(), "?1".into()));
    }
    headers.push(("sec-fetch-dest".into(), kind.sec_fetch_dest().into()));
    headers.push(("accept-encoding".into(), "gzip, deflate, br, zstd".into()));
    headers.push(("accept-language".into(), accept_language(&fingerprint.locale)));
    if let Some(referer) = referer {
        headers.push(("referer".into(), referer.into()));
    }
    headers
}

/// `de-DE` → `de-DE,de;q=0.9,en;q=0.8`; already-weighted locales pass
/// through.
fn accept_language(locale: &str) -> String {
    if locale.contains(';') {
        return locale.to_string();
    }
    let primary = locale.split('-').next().unwrap_or(locale);
    if primary == "en" {
        format!("{locale},en;q=0.9")
    } else {
        format!("{locale},{primary};q=0.9,en;q=0.8")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use harvest_rand::SecureRng;
    use harvest_types::Persona;

    fn fp() -> Fingerprint {
        Fingerprint::generate(Persona::Desktop, 126, "Europe/Berlin", "de-DE", &SecureRng::new())
    }

    #[test]
    fn passthrough_kinds_get_no_rewrite() {
        assert!(rewrite_headers(RequestKind::Image, &fp(), None).is_empty());
        assert!(rewrite_headers(RequestKind::Font, &fp(), None).is_empty());
        assert!(rewrite_headers(RequestKind::Media, &fp(), None).is_empty());
    }

    #[test]
    fn document_headers_follow_chrome_order() {
        let headers = rewrite_headers(RequestKind::Document, &fp(), Some("https://ref.example"));
        let names: Vec<&str> = headers.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "sec-ch-ua",
                "sec-ch-ua-mobile",
                "sec-ch-ua-platform",
                "upgrade-insecure-requests",
                "user-agent",
                "accept",
                "sec-fetch-site",
                "sec-fetch-mode",
                "sec-fetch-user",
                "sec-fetch-dest",
                "accept-encoding",
                "accept-language",
                "referer",
            ]
        );
    }

    #[test]
    fn xhr_skips_document_only_headers() {
        let headers = rewrite_headers(RequestKind::Xhr, &fp(), None);
        let names: Vec<&str> = headers.iter().map(|(k, _)| k.as_str()).collect();
        assert!(!names.contains(&"upgrade-insecure-requests"));
        assert!(!names.contains(&"sec-fetch-user"));
        let mode = headers.iter().find(|(k, _)| k == "sec-fetch-mode").unwrap();
        assert_eq!(mode.1, "cors");
    }

    #[test]
    fn accept_language_weights_locale_chain() {
        assert_eq!(accept_language("de-DE"), "de-DE,de;q=0.9,en;q=0.8");
        assert_eq!(accept_language("en-US"), "en-US,en;q=0.9");
    }

    #[test]
    fn accept_encoding_includes_zstd() {
        let headers = rewrite_headers(RequestKind::Document, &fp(), None);
        let enc = headers.iter().find(|(k, _)| k == "accept-encoding").unwrap();
        assert_eq!(enc.1, "gzip, deflate, br, zstd");
    }
}

//! The anti-detection layer. Two surfaces: the network (header rewriting
//! and request pacing) and the page (init scripts executed before any
//! site script). The spoof list is additive and applied as a whole; a
//! partially spoofed browser is itself a fingerprint.

pub mod headers;
pub mod script;
pub mod throttle;

pub use headers::{rewrite_headers, RequestKind};
pub use script::{init_script, init_script_medium};
pub use throttle::Throttle;

use harvest_browser::{Fingerprint, StealthBundle};
use harvest_rand::SecureRng;

/// Everything the session factory installs for one fingerprint: the full
/// init script plus the context-wide header set for document requests.
pub fn bundle_for(fingerprint: &Fingerprint) -> StealthBundle {
    let rng = SecureRng::new();
    // Per-session noise seed; stable within the session so repeated canvas
    // reads agree with each other, different across sessions.
    let noise_seed = rng.int_in(1, i32::MAX as i64) as u32;

    StealthBundle {
        init_scripts: vec![script::init_script(fingerprint, noise_seed)],
        extra_headers: headers::rewrite_headers(RequestKind::Document, fingerprint, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use harvest_types::Persona;

    #[test]
    fn bundle_carries_script_and_headers() {
        let rng = SecureRng::new();
        let fp = Fingerprint::generate(Persona::Desktop, 126, "Europe/Berlin", "de-DE", &rng);
        let bundle = bundle_for(&fp);
        assert_eq!(bundle.init_scripts.len(), 1);
        assert!(bundle
            .extra_headers
            .iter()
            .any(|(k, v)| k == "user-agent" && v == &fp.user_agent));
    }
}

//! Per-session fingerprints. Every observable has to agree with every
//! other observable: a mobile user agent with a desktop viewport is a
//! detection in itself, so the whole bundle is generated in one place.

use serde::{Deserialize, Serialize};

use harvest_rand::SecureRng;
use harvest_types::Persona;

/// The `(user-agent, viewport, client hints, metrics)` bundle installed
/// into a context at creation and never changed afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fingerprint {
    pub persona: Persona,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub screen_width: u32,
    pub screen_height: u32,
    pub device_pixel_ratio: f64,
    pub user_agent: String,
    pub sec_ch_ua: String,
    pub sec_ch_ua_platform: String,
    pub sec_ch_ua_mobile: String,
    pub platform: String,
    pub timezone: String,
    pub locale: String,
    pub webgl_vendor: String,
    pub webgl_renderer: String,
    pub browser_version: u32,
}

/// Desktop screens weighted roughly like the installed base: 1080p
/// dominant, with 768p laptops and 1440p monitors behind it.
const DESKTOP_SCREENS: &[(u32, u32, u32)] = &[
    (1920, 1080, 58),
    (1366, 768, 16),
    (2560, 1440, 14),
    (1536, 864, 12),
];

/// Mobile device classes: (screen w, screen h, dpr).
const MOBILE_DEVICES: &[(u32, u32, f64)] = &[
    (412, 915, 2.0),
    (393, 873, 3.0),
    (390, 844, 3.0),
    (360, 800, 2.0),
];

const DESKTOP_GPUS: &[(&str, &str)] = &[
    ("Google Inc. (NVIDIA)", "ANGLE (NVIDIA, NVIDIA GeForce RTX 3060 Direct3D11 vs_5_0 ps_5_0, D3D11)"),
    ("Google Inc. (Intel)", "ANGLE (Intel, Intel(R) UHD Graphics 630 Direct3D11 vs_5_0 ps_5_0, D3D11)"),
    ("Google Inc. (AMD)", "ANGLE (AMD, AMD Radeon RX 6600 Direct3D11 vs_5_0 ps_5_0, D3D11)"),
];

const MOBILE_GPUS: &[(&str, &str)] = &[
    ("Qualcomm", "Adreno (TM) 730"),
    ("ARM", "Mali-G715-Immortalis MC11"),
];

impl Fingerprint {
    pub fn generate(
        persona: Persona,
        browser_version: u32,
        timezone: &str,
        locale: &str,
        rng: &SecureRng,
    ) -> Self {
        match persona {
            Persona::Desktop => Self::desktop(browser_version, timezone, locale, rng),
            Persona::Mobile => Self::mobile(browser_version, timezone, locale, rng),
        }
    }

    fn desktop(version: u32, timezone: &str, locale: &str, rng: &SecureRng) -> Self {
        let (base_w, base_h, _) = *weighted_pick(DESKTOP_SCREENS, rng);
        // Small horizontal variance, browser chrome eats 100–120px of height.
        let viewport_width = (base_w as i64 + rng.int_in(-10, 10)) as u32;
        let viewport_height = base_h - rng.int_in(100, 120) as u32;
        let dpr = if rng.chance(0.8) { 1.0 } else { 1.25 };
        let (webgl_vendor, webgl_renderer) =
            *rng.pick(DESKTOP_GPUS).unwrap_or(&DESKTOP_GPUS[0]);

        Self {
            persona: Persona::Desktop,
            viewport_width,
            viewport_height,
            screen_width: base_w,
            screen_height: base_h,
            device_pixel_ratio: dpr,
            user_agent: format!(
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                 (KHTML, like Gecko) Chrome/{version}.0.0.0 Safari/537.36 Edg/{version}.0.0.0"
            ),
            sec_ch_ua: format!(
                "\"Microsoft Edge\";v=\"{version}\", \"Chromium\";v=\"{version}\", \"Not/A)Brand\";v=\"8\""
            ),
            sec_ch_ua_platform: "\"Windows\"".to_string(),
            sec_ch_ua_mobile: "?0".to_string(),
            platform: "Win32".to_string(),
            timezone: timezone.to_string(),
            locale: locale.to_string(),
            webgl_vendor: webgl_vendor.to_string(),
            webgl_renderer: webgl_renderer.to_string(),
            browser_version: version,
        }
    }

    fn mobile(version: u32, timezone: &str, locale: &str, rng: &SecureRng) -> Self {
        let (w, h, dpr) = *rng.pick(MOBILE_DEVICES).unwrap_or(&MOBILE_DEVICES[0]);
        let (webgl_vendor, webgl_renderer) = *rng.pick(MOBILE_GPUS).unwrap_or(&MOBILE_GPUS[0]);

        Self {
            persona: Persona::Mobile,
            viewport_width: w,
            viewport_height: h,
            screen_width: w,
            screen_height: h,
            device_pixel_ratio: dpr,
            user_agent: format!(
                "Mozilla/5.0 (Linux; Android 14; Pixel 8) AppleWebKit/537.36 \
                 (KHTML, like Gecko) Chrome/{version}.0.0.0 Mobile Safari/537.36 EdgA/{version}.0.0.0"
            ),
            sec_ch_ua: format!(
                "\"Microsoft Edge\";v=\"{version}\", \"Chromium\";v=\"{version}\", \"Not/A)Brand\";v=\"8\""
            ),
            sec_ch_ua_platform: "\"Android\"".to_string(),
            sec_ch_ua_mobile: "?1".to_string(),
            platform: "Linux armv81".to_string(),
            timezone: timezone.to_string(),
            locale: locale.to_string(),
            webgl_vendor: webgl_vendor.to_string(),
            webgl_renderer: webgl_renderer.to_string(),
            browser_version: version,
        }
    }

    pub fn is_mobile(&self) -> bool {
        self.persona == Persona::Mobile
    }
}

fn weighted_pick<'a>(items: &'a [(u32, u32, u32)], rng: &SecureRng) -> &'a (u32, u32, u32) {
    let total: u32 = items.iter().map(|(_, _, w)| w).sum();
    let mut roll = rng.int_in(0, total as i64 - 1) as u32;
    for item in items {
        if roll < item.2 {
            return item;
        }
        roll -= item.2;
    }
    &items[items.len() - 1]
}

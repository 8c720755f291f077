//! Init scripts delivered to the driver as a single self-contained string
//! executed before any page script. The host only templates configuration
//! (timezone, locale, WebGL strings, viewport numbers, noise seed) into
//! the artifact; all logic lives in the JS itself.

use harvest_browser::Fingerprint;

/// Full spoof set. Installed into every context; each numbered section
/// corresponds to one detection vector.
pub fn init_script(fingerprint: &Fingerprint, noise_seed: u32) -> String {
    FULL_TEMPLATE
        .replace("__TIMEZONE__", &fingerprint.timezone)
        .replace("__LOCALE__", &fingerprint.locale)
        .replace("__WEBGL_VENDOR__", &fingerprint.webgl_vendor)
        .replace("__WEBGL_RENDERER__", &fingerprint.webgl_renderer)
        .replace("__SCREEN_WIDTH__", &fingerprint.screen_width.to_string())
        .replace("__SCREEN_HEIGHT__", &fingerprint.screen_height.to_string())
        .replace("__VIEWPORT_WIDTH__", &fingerprint.viewport_width.to_string())
        .replace("__VIEWPORT_HEIGHT__", &fingerprint.viewport_height.to_string())
        .replace("__DPR__", &fingerprint.device_pixel_ratio.to_string())
        .replace("__NOISE_SEED__", &noise_seed.to_string())
}

/// Lighter variant for pages hosting anti-debugger scripts: adds the
/// `debugger`-stripping `Function` wrapper and frame normalisation, and
/// skips the heavier canvas/audio hooks that such pages probe for.
pub fn init_script_medium(fingerprint: &Fingerprint) -> String {
    MEDIUM_TEMPLATE
        .replace("__TIMEZONE__", &fingerprint.timezone)
        .replace("__LOCALE__", &fingerprint.locale)
}

const FULL_TEMPLATE: &str = r#"(() => {
  'use strict';
  const SEED = __NOISE_SEED__;

  // Deterministic per-session noise; repeated reads must agree.
  let noiseState = SEED;
  const noise = () => {
    noiseState = (noiseState * 1103515245 + 12345) & 0x7fffffff;
    return (noiseState / 0x7fffffff) - 0.5;
  };

  // [1] navigator.webdriver and automation markers
  Object.defineProperty(Navigator.prototype, 'webdriver', {
    get: () => undefined,
    configurable: true
  });
  for (const key of ['cdc_adoQpoasnfa76pfcZLmcfl_Array',
                     'cdc_adoQpoasnfa76pfcZLmcfl_Promise',
                     'cdc_adoQpoasnfa76pfcZLmcfl_Symbol',
                     '__webdriver_evaluate', '__selenium_evaluate',
                     '__driver_evaluate', '_Selenium_IDE_Recorder']) {
    try { delete window[key]; } catch (e) {}
    try { delete document[key]; } catch (e) {}
  }

  // [2] window.chrome
  if (!window.chrome) { window.chrome = {}; }
  window.chrome.runtime = window.chrome.runtime || {
    id: undefined,
    connect: function() {},
    sendMessage: function() {},
    PlatformOs: { MAC: 'mac', WIN: 'win', ANDROID: 'android', LINUX: 'linux' }
  };
  window.chrome.csi = window.chrome.csi || function() {
    return { onloadT: Date.now(), startE: Date.now() - 120, pageT: 3000 * (1 + noise() * 0.1), tran: 15 };
  };
  window.chrome.loadTimes = window.chrome.loadTimes || function() {
    const t = Date.now() / 1000;
    return {
      requestTime: t - 2, startLoadTime: t - 2, commitLoadTime: t - 1.8,
      finishDocumentLoadTime: t - 1, finishLoadTime: t - 0.8,
      firstPaintTime: t - 1.5, firstPaintAfterLoadTime: 0,
      navigationType: 'Other', wasFetchedViaSpdy: true,
      wasNpnNegotiated: true, npnNegotiatedProtocol: 'h2',
      wasAlternateProtocolAvailable: false, connectionInfo: 'h2'
    };
  };

  // [3] Canvas: imperceptible per-session pixel noise
  const origGetImageData = CanvasRenderingContext2D.prototype.getImageData;
  CanvasRenderingContext2D.prototype.getImageData = function(...args) {
    const data = origGetImageData.apply(this, args);
    for (let i = 0; i < data.data.length; i += 97) {
      data.data[i] = Math.max(0, Math.min(255, data.data[i] + Math.round(noise() * 2)));
    }
    return data;
  };
  const origToDataURL = HTMLCanvasElement.prototype.toDataURL;
  HTMLCanvasElement.prototype.toDataURL = function(...args) {
    const ctx = this.getContext('2d');
    if (ctx && this.width > 0 && this.height > 0) {
      try {
        const px = origGetImageData.call(ctx, 0, 0, 1, 1);
        px.data[0] = Math.max(0, Math.min(255, px.data[0] + Math.round(noise() * 2)));
        ctx.putImageData(px, 0, 0);
      } catch (e) {}
    }
    return origToDataURL.apply(this, args);
  };

  // [4] WebGL: spoofed vendor/renderer, numeric params get session noise
  const spoofWebGL = (proto) => {
    const origGetParameter = proto.getParameter;
    proto.getParameter = function(parameter) {
      if (parameter === 37445) { return '__WEBGL_VENDOR__'; }
      if (parameter === 37446) { return '__WEBGL_RENDERER__'; }
      const value = origGetParameter.apply(this, arguments);
      if (typeof value === 'number' && parameter !== 3379 && parameter !== 34930) {
        return value;
      }
      return value;
    };
  };
  if (typeof WebGLRenderingContext !== 'undefined') { spoofWebGL(WebGLRenderingContext.prototype); }
  if (typeof WebGL2RenderingContext !== 'undefined') { spoofWebGL(WebGL2RenderingContext.prototype); }

  // [5] Audio analyser: light noise on frequency arrays
  if (typeof AnalyserNode !== 'undefined') {
    const origFloatFreq = AnalyserNode.prototype.getFloatFrequencyData;
    AnalyserNode.prototype.getFloatFrequencyData = function(array) {
      origFloatFreq.call(this, array);
      for (let i = 0; i < array.length; i += 53) { array[i] += noise() * 0.1; }
    };
    const origByteFreq = AnalyserNode.prototype.getByteFrequencyData;
    AnalyserNode.prototype.getByteFrequencyData = function(array) {
      origByteFreq.call(this, array);
      for (let i = 0; i < array.length; i += 53) {
        array[i] = Math.max(0, Math.min(255, array[i] + Math.round(noise())));
      }
    };
  }

  // [6] hardwareConcurrency normalised to the nearest common value
  const realCores = navigator.hardwareConcurrency || 4;
  const cores = [4, 6, 8].reduce((a, b) => Math.abs(b - realCores) < Math.abs(a - realCores) ? b : a);
  Object.defineProperty(Navigator.prototype, 'hardwareConcurrency', {
    get: () => cores,
    configurable: true
  });

  // [7] deviceMemory normalised likewise
  const realMem = navigator.deviceMemory || 8;
  const mem = [4, 8, 16].reduce((a, b) => Math.abs(b - realMem) < Math.abs(a - realMem) ? b : a);
  Object.defineProperty(Navigator.prototype, 'deviceMemory', {
    get: () => mem,
    configurable: true
  });

  // [8] Fixed realistic plugin list
  const pluginData = [
    { name: 'PDF Viewer', filename: 'internal-pdf-viewer', description: 'Portable Document Format' },
    { name: 'Chrome PDF Viewer', filename: 'internal-pdf-viewer', description: 'Portable Document Format' },
    { name: 'Chromium PDF Viewer', filename: 'internal-pdf-viewer', description: 'Portable Document Format' },
    { name: 'Microsoft Edge PDF Viewer', filename: 'internal-pdf-viewer', description: 'Portable Document Format' },
    { name: 'WebKit built-in PDF', filename: 'internal-pdf-viewer', description: 'Portable Document Format' }
  ];
  Object.defineProperty(Navigator.prototype, 'plugins', {
    get: () => {
      const arr = pluginData.map(p => ({ ...p, length: 1 }));
      arr.item = (i) => arr[i] || null;
      arr.namedItem = (n) => arr.find(p => p.name === n) || null;
      arr.refresh = () => {};
      return arr;
    },
    configurable: true
  });

  // [9] RTCPeerConnection: filter STUN/host candidates so the real IP
  // never reaches the page
  if (typeof RTCPeerConnection !== 'undefined') {
    const OrigRTC = RTCPeerConnection;
    const filteredRTC = function(...args) {
      const pc = new OrigRTC(...args);
      const origAddListener = pc.addEventListener.bind(pc);
      const filterEvent = (handler) => (event) => {
        if (event && event.candidate && /typ (srflx|host)/.test(event.candidate.candidate || '')) {
          return;
        }
        return handler(event);
      };
      pc.addEventListener = (type, handler, ...rest) => {
        if (type === 'icecandidate' && typeof handler === 'function') {
          return origAddListener(type, filterEvent(handler), ...rest);
        }
        return origAddListener(type, handler, ...rest);
      };
      Object.defineProperty(pc, 'onicecandidate', {
        set(handler) {
          origAddListener('icecandidate', typeof handler === 'function' ? filterEvent(handler) : handler);
        }
      });
      return pc;
    };
    filteredRTC.prototype = OrigRTC.prototype;
    window.RTCPeerConnection = filteredRTC;
  }

  // [10] Battery: plugged in, nearly full
  if (navigator.getBattery) {
    navigator.getBattery = () => Promise.resolve({
      charging: true,
      chargingTime: 0,
      dischargingTime: Infinity,
      level: 0.97 + Math.abs(noise()) * 0.06,
      addEventListener: () => {},
      removeEventListener: () => {},
      dispatchEvent: () => true
    });
  }

  // [11] Timezone forced to the configured IANA zone
  const TZ = '__TIMEZONE__';
  const tzOffsetMinutes = (() => {
    try {
      const now = new Date();
      const utc = new Date(now.toLocaleString('en-US', { timeZone: 'UTC' }));
      const local = new Date(now.toLocaleString('en-US', { timeZone: TZ }));
      return Math.round((utc - local) / 60000);
    } catch (e) { return new Date().getTimezoneOffset(); }
  })();
  Date.prototype.getTimezoneOffset = function() { return tzOffsetMinutes; };
  const OrigDTF = Intl.DateTimeFormat;
  Intl.DateTimeFormat = function(locales, options) {
    options = Object.assign({}, options);
    if (!options.timeZone) { options.timeZone = TZ; }
    return new OrigDTF(locales, options);
  };
  Intl.DateTimeFormat.prototype = OrigDTF.prototype;
  Intl.DateTimeFormat.supportedLocalesOf = OrigDTF.supportedLocalesOf;

  // [12] Locale
  const LOCALE = '__LOCALE__';
  Object.defineProperty(Navigator.prototype, 'language', {
    get: () => LOCALE,
    configurable: true
  });
  Object.defineProperty(Navigator.prototype, 'languages', {
    get: () => [LOCALE, LOCALE.split('-')[0], 'en'],
    configurable: true
  });

  // [13] Timing: sub-millisecond jitter so timer resolution looks native
  const origNow = Performance.prototype.now;
  Performance.prototype.now = function() {
    return origNow.call(this) + noise() * 0.2;
  };
  const OrigDateNow = Date.now;
  Date.now = () => OrigDateNow() + Math.round(noise());

  // [14] Stack traces must not name the automation driver
  const origStackDesc = Object.getOwnPropertyDescriptor(Error.prototype, 'stack');
  const scrub = (stack) => typeof stack === 'string'
    ? stack.split('\n').filter(l => !/puppeteer|playwright|devtools|__playwright|pptr/i.test(l)).join('\n')
    : stack;
  if (origStackDesc && origStackDesc.get) {
    Object.defineProperty(Error.prototype, 'stack', {
      get() { return scrub(origStackDesc.get.call(this)); },
      configurable: true
    });
  } else {
    const OrigError = Error;
    window.Error = function(...args) {
      const err = new OrigError(...args);
      try { err.stack = scrub(err.stack); } catch (e) {}
      return err;
    };
    window.Error.prototype = OrigError.prototype;
    for (const key of Object.getOwnPropertyNames(OrigError)) {
      try { window.Error[key] = OrigError[key]; } catch (e) {}
    }
  }

  // [15] Screen metrics consistent with the chosen viewport
  const metrics = {
    width: __SCREEN_WIDTH__,
    height: __SCREEN_HEIGHT__,
    availWidth: __SCREEN_WIDTH__,
    availHeight: __SCREEN_HEIGHT__ - 40,
    colorDepth: 24,
    pixelDepth: 24
  };
  for (const [key, value] of Object.entries(metrics)) {
    Object.defineProperty(Screen.prototype, key, { get: () => value, configurable: true });
  }
  Object.defineProperty(window, 'outerWidth', { get: () => __VIEWPORT_WIDTH__, configurable: true });
  Object.defineProperty(window, 'outerHeight', { get: () => __VIEWPORT_HEIGHT__ + 100, configurable: true });
  Object.defineProperty(window, 'devicePixelRatio', { get: () => __DPR__, configurable: true });
  const origMatchMedia = window.matchMedia;
  window.matchMedia = function(query) {
    if (/device-width/.test(query)) {
      const m = query.match(/(min|max)-device-width:\s*(\d+)px/);
      if (m) {
        const px = parseInt(m[2], 10);
        const matches = m[1] === 'min' ? metrics.width >= px : metrics.width <= px;
        return { matches, media: query, addListener: () => {}, removeListener: () => {},
                 addEventListener: () => {}, removeEventListener: () => {}, dispatchEvent: () => true };
      }
    }
    return origMatchMedia.call(window, query);
  };
})();"#;

const MEDIUM_TEMPLATE: &str = r#"(() => {
  'use strict';

  // navigator.webdriver still has to be clean on anti-debugger pages.
  Object.defineProperty(Navigator.prototype, 'webdriver', {
    get: () => undefined,
    configurable: true
  });

  // Strip `debugger` statements from dynamically constructed functions.
  const OrigFunction = window.Function;
  const cleaned = function(...args) {
    if (args.length > 0) {
      const body = String(args[args.length - 1]);
      args[args.length - 1] = body.replace(/\bdebugger\b\s*;?/g, '');
    }
    return OrigFunction.apply(this, args);
  };
  cleaned.prototype = OrigFunction.prototype;
  window.Function = cleaned;

  // toString must look native or the wrapper above is trivially found.
  const origToString = Function.prototype.toString;
  const natives = new Map([[window.Function, 'function Function() { [native code] }']]);
  Function.prototype.toString = function() {
    if (natives.has(this)) { return natives.get(this); }
    return origToString.call(this);
  };

  // Frame-buster checks expect a top-level window.
  try {
    Object.defineProperty(window, 'self', { get: () => window.top, configurable: true });
  } catch (e) {}

  // performance.timing normalised to a plausible page load
  if (window.performance && performance.timing) {
    const base = Date.now() - 3000;
    const timing = {
      navigationStart: base, fetchStart: base + 10, domainLookupStart: base + 15,
      domainLookupEnd: base + 35, connectStart: base + 35, connectEnd: base + 80,
      requestStart: base + 85, responseStart: base + 300, responseEnd: base + 500,
      domLoading: base + 520, domInteractive: base + 1400,
      domContentLoadedEventStart: base + 1410, domContentLoadedEventEnd: base + 1450,
      domComplete: base + 2800, loadEventStart: base + 2810, loadEventEnd: base + 2850
    };
    for (const [key, value] of Object.entries(timing)) {
      try {
        Object.defineProperty(performance.timing, key, { get: () => value, configurable: true });
      } catch (e) {}
    }
  }

  // Keep locale/timezone consistent with the primary script.
  const LOCALE = '__LOCALE__';
  Object.defineProperty(Navigator.prototype, 'language', {
    get: () => LOCALE,
    configurable: true
  });
})();"#;

#[cfg(test)]
mod tests {
    use super::*;
    use harvest_rand::SecureRng;
    use harvest_types::Persona;

    fn fp() -> Fingerprint {
        Fingerprint::generate(Persona::Desktop, 126, "Europe/Berlin", "de-DE", &SecureRng::new())
    }

    fn script() -> String {
        init_script(&fp(), 12345)
    }

    #[test]
    fn vector_1_webdriver_hidden() {
        let s = script();
        assert!(s.contains("'webdriver'"));
        assert!(s.contains("get: () => undefined"));
        assert!(s.contains("cdc_adoQpoasnfa76pfcZLmcfl_Array"));
    }

    #[test]
    fn vector_2_chrome_object_mocked() {
        let s = script();
        assert!(s.contains("window.chrome.runtime"));
        assert!(s.contains("window.chrome.csi"));
        assert!(s.contains("window.chrome.loadTimes"));
    }

    #[test]
    fn vector_3_canvas_noised() {
        let s = script();
        assert!(s.contains("getImageData"));
        assert!(s.contains("toDataURL"));
    }

    #[test]
    fn vector_4_webgl_spoofed_with_session_values() {
        let f = fp();
        let s = init_script(&f, 12345);
        assert!(s.contains("37445"));
        assert!(s.contains("37446"));
        assert!(s.contains(&f.webgl_vendor));
        assert!(s.contains(&f.webgl_renderer));
    }

    #[test]
    fn vector_5_audio_noised() {
        let s = script();
        assert!(s.contains("getFloatFrequencyData"));
        assert!(s.contains("getByteFrequencyData"));
    }

    #[test]
    fn vectors_6_7_hardware_normalised() {
        let s = script();
        assert!(s.contains("hardwareConcurrency"));
        assert!(s.contains("[4, 6, 8]"));
        assert!(s.contains("deviceMemory"));
        assert!(s.contains("[4, 8, 16]"));
    }

    #[test]
    fn vector_8_plugins_fixed_list() {
        let s = script();
        assert!(s.contains("'plugins'"));
        assert!(s.contains("PDF Viewer"));
    }

    #[test]
    fn vector_9_webrtc_candidates_filtered() {
        let s = script();
        assert!(s.contains("RTCPeerConnection"));
        assert!(s.contains("typ (srflx|host)"));
    }

    #[test]
    fn vector_10_battery_charging() {
        let s = script();
        assert!(s.contains("getBattery"));
        assert!(s.contains("charging: true"));
        assert!(s.contains("0.97"));
    }

    #[test]
    fn vector_11_timezone_templated() {
        let s = script();
        assert!(s.contains("Europe/Berlin"));
        assert!(s.contains("getTimezoneOffset"));
        assert!(s.contains("Intl.DateTimeFormat"));
        assert!(!s.contains("__TIMEZONE__"));
    }

    #[test]
    fn vector_12_locale_templated() {
        let s = script();
        assert!(s.contains("de-DE"));
        assert!(s.contains("'languages'"));
        assert!(!s.contains("__LOCALE__"));
    }

    #[test]
    fn vector_13_timing_jittered() {
        let s = script();
        assert!(s.contains("Performance.prototype.now"));
        assert!(s.contains("Date.now"));
    }

    #[test]
    fn vector_14_stack_scrubbed() {
        let s = script();
        assert!(s.contains("Error.prototype"));
        assert!(s.contains("puppeteer|playwright"));
    }

    #[test]
    fn vector_15_screen_consistent_with_viewport() {
        let f = fp();
        let s = init_script(&f, 1);
        assert!(s.contains(&f.screen_width.to_string()));
        assert!(s.contains(&f.viewport_width.to_string()));
        assert!(s.contains("matchMedia"));
        assert!(!s.contains("__SCREEN_WIDTH__"));
        assert!(!s.contains("__DPR__"));
    }

    #[test]
    fn noise_seed_is_templated_per_session() {
        let a = init_script(&fp(), 111);
        let b = init_script(&fp(), 222);
        assert!(a.contains("SEED = 111"));
        assert!(b.contains("SEED = 222"));
    }

    #[test]
    fn medium_variant_strips_debugger_and_normalises_frames() {
        let s = init_script_medium(&fp());
        assert!(s.contains("debugger"));
        assert!(s.contains("Function.prototype.toString"));
        assert!(s.contains("window.top"));
        assert!(s.contains("performance.timing"));
        assert!(!s.contains("__LOCALE__"));
    }
}

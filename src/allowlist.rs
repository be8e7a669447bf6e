//! The fixed, closed set of well-known ECMAScript and host globals that P4
//! (global resolver inlining) is permitted to introduce a bare identifier
//! reference to. Names outside this set are never inlined, even when a
//! resolver maps a key to them -- see invariant 5 in the spec's testable
//! properties.

use std::collections::HashSet;
use std::sync::OnceLock;

const NAMES: &[&str] = &[
    "Object", "Array", "String", "Number", "Boolean", "Function", "Symbol", "Date", "RegExp",
    "Error", "TypeError", "RangeError", "SyntaxError", "ReferenceError", "Promise", "Map", "Set",
    "WeakMap", "WeakSet", "Proxy", "Reflect", "ArrayBuffer", "DataView", "SharedArrayBuffer",
    "Int8Array", "Uint8Array", "Uint8ClampedArray", "Int16Array", "Uint16Array", "Int32Array",
    "Uint32Array", "Float32Array", "Float64Array", "BigInt64Array", "BigUint64Array",
    "TextEncoder", "TextDecoder", "URL", "URLSearchParams", "Blob", "File", "FileReader",
    "FormData", "Request", "Response", "Headers", "AbortController", "XMLHttpRequest", "fetch",
    "WebSocket", "EventSource", "BroadcastChannel", "Worker", "SharedWorker", "ServiceWorker",
    "crypto", "Crypto", "SubtleCrypto", "CryptoKey", "performance", "Performance",
    "PerformanceObserver", "navigator", "Navigator", "location", "Location", "history", "History",
    "localStorage", "sessionStorage", "Storage", "indexedDB", "IDBFactory", "console", "Console",
    "document", "Document", "window", "Window", "self", "globalThis", "global", "setTimeout",
    "setInterval", "clearTimeout", "clearInterval", "requestAnimationFrame",
    "cancelAnimationFrame", "queueMicrotask", "atob", "btoa", "eval", "isNaN", "isFinite",
    "parseInt", "parseFloat", "encodeURI", "decodeURI", "encodeURIComponent",
    "decodeURIComponent", "JSON", "Math", "Intl", "Atomics", "NaN", "Infinity", "undefined",
    "structuredClone", "process", "Buffer", "require", "module", "exports", "__dirname",
    "__filename",
];

fn set() -> &'static HashSet<&'static str> {
    static SET: OnceLock<HashSet<&'static str>> = OnceLock::new();
    SET.get_or_init(|| NAMES.iter().copied().collect())
}

/// Whether `name` is a recognized global identifier P4 may inline to.
pub fn is_allowed(name: &str) -> bool {
    set().contains(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_well_known_globals() {
        assert!(is_allowed("Date"));
        assert!(is_allowed("console"));
        assert!(is_allowed("fetch"));
    }

    #[test]
    fn rejects_unknown_identifiers() {
        assert!(!is_allowed("myInternalHelper"));
        assert!(!is_allowed(""));
    }
}

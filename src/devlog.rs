//! Query log lines with a thread-local capture sink.
//! Tests enable the sink to assert on what a query execution reported without
//! racing on the process-wide logger.

use std::cell::RefCell;

/// Log target used for query execution records.
pub const QUERY_TARGET: &str = "odmlite::query";

thread_local! {
    static TL_SINK: RefCell<Option<Vec<String>>> = const { RefCell::new(None) };
}

/// Guard that disables the thread-local sink on drop.
pub struct CaptureGuard;

impl Drop for CaptureGuard {
    fn drop(&mut self) {
        TL_SINK.with(|s| *s.borrow_mut() = None);
    }
}

/// Enable capture for the current thread until the returned guard is dropped.
#[must_use]
pub fn capture() -> CaptureGuard {
    TL_SINK.with(|s| *s.borrow_mut() = Some(Vec::new()));
    CaptureGuard
}

pub fn write_str(msg: &str) {
    TL_SINK.with(|s| {
        if let Some(buf) = s.borrow_mut().as_mut() {
            buf.push(msg.to_owned());
        }
    });
}

/// Drain captured lines for the current thread. Empty when capture is off.
pub fn drain() -> Vec<String> {
    TL_SINK.with(|s| s.borrow_mut().as_mut().map(std::mem::take).unwrap_or_default())
}

/// Emit a query record at DEBUG on [`QUERY_TARGET`] and capture it if enabled.
#[macro_export]
macro_rules! qlog {
    ($($arg:tt)*) => {{
        let __s = format!($($arg)*);
        $crate::devlog::write_str(&__s);
        log::log!(target: $crate::devlog::QUERY_TARGET, log::Level::Debug, "{}", __s);
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_collects_and_drains() {
        let _g = capture();
        crate::qlog!("alpha {}", 1);
        crate::qlog!("beta");
        let lines = drain();
        assert_eq!(lines, vec!["alpha 1".to_string(), "beta".to_string()]);
        assert!(drain().is_empty());
    }

    #[test]
    fn capture_is_per_thread() {
        let _g = capture();
        crate::qlog!("main-thread");
        let child = std::thread::spawn(|| {
            crate::qlog!("child-thread");
            drain()
        })
        .join()
        .unwrap();
        assert!(child.is_empty());
        assert!(drain().iter().any(|s| s.contains("main-thread")));
    }
}

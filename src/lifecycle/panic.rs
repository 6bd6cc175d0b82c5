//! Panic reporting.
//!
//! Panics on any thread are logged through `tracing` before the default hook
//! runs, so they reach the structured log stream.

use std::panic;

/// Install a panic hook that logs the panic message and location at error level.
pub fn install_panic_hook() {
    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        let location = info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown".to_string());
        let message = panic_message(info.payload());
        let thread = std::thread::current();

        tracing::error!(
            thread = thread.name().unwrap_or("<unnamed>"),
            location = %location,
            "Uncaught panic: {}",
            message
        );
        default_hook(info);
    }));
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message_from_payloads() {
        let borrowed: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(borrowed.as_ref()), "boom");

        let owned: Box<dyn std::any::Any + Send> = Box::new(String::from("owned boom"));
        assert_eq!(panic_message(owned.as_ref()), "owned boom");

        let other: Box<dyn std::any::Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(other.as_ref()), "non-string panic payload");
    }
}

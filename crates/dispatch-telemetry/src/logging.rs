//! Structured log macros.
//!
//! Every dispatch log line carries a `site` (outbound operation) or `stage`
//! (inbound pipeline stage) field so failures can be grouped without parsing
//! messages.

/// Log an outbound send event with standard fields.
#[macro_export]
macro_rules! log_send_event {
    ($level:ident, $site:expr, $msg:expr, $recipient:expr $(, $($field:tt)*)?) => {
        tracing::$level!(
            site = $site,
            recipient = %$recipient,
            $($($field)*,)?
            $msg
        )
    };
}

/// Log an inbound pipeline event with standard fields.
#[macro_export]
macro_rules! log_stage_event {
    ($level:ident, $stage:expr, $msg:expr, $hash:expr $(, $($field:tt)*)?) => {
        tracing::$level!(
            stage = $stage,
            hash = %$hash,
            $($($field)*,)?
            $msg
        )
    };
}

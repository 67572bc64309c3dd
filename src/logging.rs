//! Unified logging macro.
//!
//! The crate logs through [`knx_log!`], which resolves to `defmt::`
//! (feature `defmt`), `log::` (feature `log`), or nothing at all, so the core
//! stays silent and dependency-free by default.
//!
//! ```rust,ignore
//! knx_log!(info, "tunnel established, channel {}", channel_id);
//! knx_log!(warn, "dropping malformed datagram: {:?}", err);
//! ```

/// Unified logging macro - selects the backend from the active features.
#[macro_export]
#[cfg(feature = "defmt")]
macro_rules! knx_log {
    (trace, $($arg:tt)*) => { defmt::trace!($($arg)*) };
    (debug, $($arg:tt)*) => { defmt::debug!($($arg)*) };
    (info, $($arg:tt)*) => { defmt::info!($($arg)*) };
    (warn, $($arg:tt)*) => { defmt::warn!($($arg)*) };
    (error, $($arg:tt)*) => { defmt::error!($($arg)*) };
}

#[macro_export]
#[cfg(all(not(feature = "defmt"), feature = "log"))]
macro_rules! knx_log {
    (trace, $($arg:tt)*) => { log::trace!($($arg)*) };
    (debug, $($arg:tt)*) => { log::debug!($($arg)*) };
    (info, $($arg:tt)*) => { log::info!($($arg)*) };
    (warn, $($arg:tt)*) => { log::warn!($($arg)*) };
    (error, $($arg:tt)*) => { log::error!($($arg)*) };
}

#[macro_export]
#[cfg(all(not(feature = "defmt"), not(feature = "log")))]
macro_rules! knx_log {
    // Arguments still count as used so a silent build stays warning-free.
    ($level:ident, $fmt:literal $(, $arg:expr)* $(,)?) => {{
        let _ = ($( &$arg, )*);
    }};
}

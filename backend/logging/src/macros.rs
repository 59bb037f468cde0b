//! `format!`-style front ends for the leveled [`Logger`](crate::Logger)
//! methods. The call site of the macro is what ends up in the log line.
//!
//! ```ignore
//! rotalog_logging::info!(logger, "listening on {}", addr);
//! ```

#[macro_export]
macro_rules! debug {
    ($logger:expr, $($arg:tt)+) => {
        $logger.debug(::std::format_args!($($arg)+))
    };
}

#[macro_export]
macro_rules! info {
    ($logger:expr, $($arg:tt)+) => {
        $logger.info(::std::format_args!($($arg)+))
    };
}

#[macro_export]
macro_rules! warn {
    ($logger:expr, $($arg:tt)+) => {
        $logger.warn(::std::format_args!($($arg)+))
    };
}

#[macro_export]
macro_rules! error {
    ($logger:expr, $($arg:tt)+) => {
        $logger.error(::std::format_args!($($arg)+))
    };
}

#[macro_export]
macro_rules! fatal {
    ($logger:expr, $($arg:tt)+) => {
        $logger.fatal(::std::format_args!($($arg)+))
    };
}

/// Console-only; ignores the level threshold.
#[macro_export]
macro_rules! console {
    ($logger:expr, $($arg:tt)+) => {
        $logger.console(::std::format_args!($($arg)+))
    };
}

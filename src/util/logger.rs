//! This module provides a built-in logger implementation.
//!
//! The built-in logger implementation uses the `env_logger` crate. It is
//! enabled by the Cargo feature "builtin_env_logger" which is enabled by
//! default. When enabled, it is initialized by [`crate::init`] and shows
//! logs of level INFO or lower (the lower, the more important).
//!
//! This provides a convenient out-of-the-box experience so that embedders
//! can see logs without configuration, and can easily tune log levels via
//! environment variables. Embedders who want to integrate with their own
//! logging framework can disable the Cargo feature "builtin_env_logger" and
//! register their own implementation with the `log` crate.

/// Attempt to init an env_logger for the runtime.
/// Does nothing if the "builtin_env_logger" feature is disabled.
pub(crate) fn try_init() {
    cfg_if::cfg_if! {
        if #[cfg(feature = "builtin_env_logger")] {
            let result = env_logger::try_init_from_env(
                env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
            );

            match result {
                Ok(()) => {
                    debug!("boc-core initialized the logger.");
                }
                Err(e) => {
                    // Currently `log::SetLoggerError` can only be raised for one
                    // reason: the logger has already been initialized.
                    debug!("boc-core failed to initialize the built-in env_logger: {e}");
                }
            }
        } else {
            debug!("boc-core didn't initialize the built-in env_logger. The Cargo feature \"builtin_env_logger\" is not enabled.");
        }
    }
}

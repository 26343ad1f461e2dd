//! Construction-time options for a [`crate::memory::MemoryFilesystem`],
//! following the validated-setter pattern of a kernel-config builder: a
//! setter either applies the value and returns the previous one, or rejects
//! it and returns the nearest value that would have succeeded.

use std::time::Duration;

use crate::dispatcher::Dispatcher;
use crate::memory::MemoryFilesystemConfig;
use crate::options::CaseSensitivity;
use crate::path::TrailingSlashPolicy;

/// Upper bound on the debounce window: beyond this, a filesystem's Change
/// notifications would lag far enough behind writes to surprise an
/// observer relying on them for cache invalidation.
pub const MAX_DEBOUNCE_WINDOW: Duration = Duration::from_secs(60);

/// A builder for [`MemoryFilesystemConfig`].
#[derive(Debug, Clone)]
pub struct FilesystemOptions {
    config: MemoryFilesystemConfig,
}

impl Default for FilesystemOptions {
    fn default() -> Self {
        Self { config: MemoryFilesystemConfig::default() }
    }
}

impl FilesystemOptions {
    /// Start from the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// How a trailing `/` in a path is treated.
    ///
    /// On success returns the previous value. This setter cannot fail.
    pub fn set_trailing_slash_policy(&mut self, value: TrailingSlashPolicy) -> Result<TrailingSlashPolicy, TrailingSlashPolicy> {
        let previous = self.config.trailing_slash_policy;
        self.config.trailing_slash_policy = value;
        Ok(previous)
    }

    /// Declared case sensitivity for path matching.
    ///
    /// On success returns the previous value. This setter cannot fail.
    pub fn set_case_sensitivity(&mut self, value: CaseSensitivity) -> Result<CaseSensitivity, CaseSensitivity> {
        let previous = self.config.case_sensitivity;
        self.config.case_sensitivity = value;
        Ok(previous)
    }

    /// The debounce window applied to each file's modification
    /// notifications.
    ///
    /// # Errors
    /// Zero is rejected (a zero window would mean every write fires a
    /// separate notification with no coalescing, defeating the point of
    /// debouncing); a window above [`MAX_DEBOUNCE_WINDOW`] is rejected. Both
    /// errors return the nearest value that would succeed.
    pub fn set_debounce_window(&mut self, value: Duration) -> Result<Duration, Duration> {
        if value.is_zero() {
            return Err(Duration::from_millis(1));
        }
        if value > MAX_DEBOUNCE_WINDOW {
            return Err(MAX_DEBOUNCE_WINDOW);
        }
        let previous = self.config.debounce_window;
        self.config.debounce_window = value;
        Ok(previous)
    }

    /// The dispatcher used for subscriptions that don't specify their own.
    ///
    /// On success returns the previous value. This setter cannot fail.
    pub fn set_default_dispatcher(&mut self, value: Dispatcher) -> Result<Dispatcher, Dispatcher> {
        let previous = std::mem::replace(&mut self.config.default_dispatcher, value);
        Ok(previous)
    }

    /// Finish building, producing the concrete configuration a
    /// [`crate::memory::MemoryFilesystem`] is constructed from.
    #[must_use]
    pub fn build(self) -> MemoryFilesystemConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_debounce_window_rejected_with_nearest_value() {
        let mut options = FilesystemOptions::new();
        let err = options.set_debounce_window(Duration::ZERO).unwrap_err();
        assert_eq!(err, Duration::from_millis(1));
    }

    #[test]
    fn oversized_debounce_window_clamped() {
        let mut options = FilesystemOptions::new();
        let err = options.set_debounce_window(Duration::from_secs(3600)).unwrap_err();
        assert_eq!(err, MAX_DEBOUNCE_WINDOW);
    }

    #[test]
    fn valid_debounce_window_returns_previous() {
        let mut options = FilesystemOptions::new();
        let previous = options.set_debounce_window(Duration::from_millis(250)).unwrap();
        assert_eq!(previous, Duration::from_millis(500));
        assert_eq!(options.build().debounce_window, Duration::from_millis(250));
    }
}

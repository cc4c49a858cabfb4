use tracing::{event, Level};

/// Release that will drop the deprecated entry points.
pub const REMOVAL_VERSION: &str = "5.0.0";

pub const MIGRATION_GUIDE: &str = "https://github.com/splitio/angular-sdk-plugin#migration-guide";

/// Logs that `method` is deprecated in favor of `alternative`.
pub fn deprecation_warning(method: &str, alternative: &str) {
    event!(
        Level::WARN,
        method,
        alternative,
        removal = REMOVAL_VERSION,
        guide = MIGRATION_GUIDE,
        "{} is deprecated and will be removed in v{}, use {} instead",
        method,
        REMOVAL_VERSION,
        alternative
    );
}

/// Runs `f` after logging the deprecation of `method`.
pub fn deprecated<T>(method: &str, alternative: &str, f: impl FnOnce() -> T) -> T {
    deprecation_warning(method, alternative);
    f()
}

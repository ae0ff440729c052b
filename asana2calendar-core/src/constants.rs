use std::time::Duration;

/// Days on either side of now that a pass looks at by default.
pub const DEFAULT_SYNC_DAYS: i64 = 365;

/// Upper bound for a single adapter call.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

pub const APP_NAME: &str = "asana2calendar";

pub(crate) const DEFAULT_LISTEN: &str = "127.0.0.1:8080";
pub(crate) const DEFAULT_DATA_DIR: &str = "./data";
pub(crate) const DEFAULT_MAX_PENDING_APPENDS: usize = 64;
pub(crate) const DEFAULT_LOG_LEVEL: &str = "info";

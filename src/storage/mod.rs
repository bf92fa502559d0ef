pub mod watches;

pub use watches::{find_watch, JsonWatchStore, WatchStoreGuard};

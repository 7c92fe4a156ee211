pub mod context;
pub mod diff;
pub mod init;
pub mod lock;
pub mod merge;
pub mod snapshot;
pub mod watch;

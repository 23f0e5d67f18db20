pub mod command;
pub mod locker;

pub use locker::RunLock;

pub mod dispatch;
pub mod logging;
pub mod report;
pub mod retry;
pub mod run;

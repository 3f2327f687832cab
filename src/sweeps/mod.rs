pub mod auto_cancel;
pub mod expiry;
pub mod scheduler;

pub use auto_cancel::AutoCancelSweep;
pub use expiry::ExpirySweep;
pub use scheduler::{SweepScheduleConfig, SweepScheduler};

//! Performance monitoring: rolling windows, operation timers and alerts.

mod performance;
mod window;

pub use performance::{
    AlertKind, MonitorConfig, OperationSnapshot, OperationTracker, PerformanceAlert,
    PerformanceMonitor, PerformanceSnapshot,
};
pub use window::RollingWindow;

//! Application Services
//!
//! Application services coordinate domain logic and the ports. `RateService`
//! answers rate lookups on behalf of both gRPC methods; `RateMonitor` runs
//! as a background task for the lifetime of the process.

mod rate_monitor;
mod rate_service;

pub use rate_monitor::{MonitorSnapshot, MonitorStatus, RateMonitor};
pub use rate_service::{RateLookupError, RateService};

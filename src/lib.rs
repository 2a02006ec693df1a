pub mod cli;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod log;
pub mod maintenance;
pub mod readiness;
pub mod resolve;
pub mod retry;
pub mod services;
pub mod timing;
pub mod wait;

mod test_helpers;

pub use lifecycle::ServiceLifecycleController;
pub use log::Logger;
pub use maintenance::MaintenanceWindow;
pub use readiness::ReadinessPoller;
pub use retry::RetryBudget;
pub use services::*;
pub use wait::WaitFor;

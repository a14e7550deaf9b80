pub mod center;
pub mod communication;
pub mod protocol;
pub mod rules;
pub mod scenario;
pub mod signals;

pub use center::{Mode, SignalCenter};
pub use scenario::Scenario;

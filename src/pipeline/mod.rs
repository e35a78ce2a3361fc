pub mod orchestrator;
pub mod process;
pub mod workspace;

pub use orchestrator::Orchestrator;

pub mod build;
pub mod events;

pub mod detector;
pub mod scheduler;
pub mod state;

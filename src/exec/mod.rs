pub mod command;
pub mod deploy;

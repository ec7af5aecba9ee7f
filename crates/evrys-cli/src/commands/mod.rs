pub mod publish;
pub mod serve;

/// Error type returned by every command.
pub type CommandError = Box<dyn std::error::Error>;

mod command;
mod runner;

pub use command::{Command, Source};
pub use runner::{Report, run};

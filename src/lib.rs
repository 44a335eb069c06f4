pub mod cli;
pub mod eval;
pub mod logging;
pub mod protocol;

pub use cli::{Command, prompt};
pub use eval::{Evaluation, evaluate};

mod console;

pub use console::{render_state, Command, ConsoleCommands};

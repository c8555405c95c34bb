//! Terminal front end for the demo binary

mod console;

pub use console::Console;

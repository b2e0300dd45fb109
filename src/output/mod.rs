// Output module for tod

pub mod errors;
pub mod terminal;

pub use errors::*;
pub use terminal::*;

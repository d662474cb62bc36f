pub mod assets;
pub mod variables;
mod validation;
mod workflow;

pub use validation::*;
pub use workflow::*;

pub mod config;
pub mod export;
pub mod logging;
pub mod validation;

pub use config::*;
pub use export::*;
pub use logging::*;
pub use validation::*;

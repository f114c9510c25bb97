mod config;
mod fetch;
mod logging;
mod source;
mod token;
mod watch;

pub use config::*;
pub use fetch::*;
pub use logging::*;
pub use source::*;
pub use token::*;
pub use watch::*;

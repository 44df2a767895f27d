pub mod email;
pub mod time;

pub use email::*;
pub use time::*;

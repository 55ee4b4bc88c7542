// Subprocess seam: captured probe queries and terminal-attached engine runs.

mod run;
mod types;

pub use run::SystemHost;
pub use types::{Captured, Host, render};

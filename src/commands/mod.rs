//! CLI commands implementation

pub mod add;
pub mod downloads;
pub mod init;
pub mod library;
pub mod status;

pub use add::*;
pub use downloads::*;
pub use init::*;
pub use library::*;
pub use status::*;

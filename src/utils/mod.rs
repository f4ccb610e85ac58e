// Shared utilities module
pub mod bundle_analysis;
pub mod config_loader;
pub mod errors;
pub mod incremental;
pub mod logging;
pub mod path_aliases;
pub mod ui;
pub mod watch;

pub use config_loader::*;
pub use errors::*;
pub use incremental::*;
pub use logging::*;
pub use path_aliases::*;
pub use ui::*;
pub use watch::*;

// Infrastructure layer
pub mod dev_server;
pub mod file_system;
pub mod hmr;
pub mod hmr_client;
pub mod processors;
pub mod resolver;
pub mod runtime;

pub use dev_server::*;
pub use file_system::*;
pub use hmr::*;
pub use hmr_client::*;
pub use processors::*;
pub use resolver::*;

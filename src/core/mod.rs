// Core domain layer
pub mod chunking;
pub mod context;
pub mod emission;
pub mod graph;
pub mod interfaces;
pub mod models;
pub mod naming;
pub mod pipeline;
pub mod services;

pub use context::BuildContext;
pub use interfaces::*;
pub use models::*;
pub use pipeline::{Pipeline, Stage};
pub use services::*;

pub mod checkout;
pub mod cli;
pub mod config;
pub mod git;
pub mod resolver;
pub mod version;

mod api;
mod flock;

pub use api::{Stencil, StencilBuilder};

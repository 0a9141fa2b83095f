//! CLI command implementations

mod defaults;
mod outputs;
mod resolve;

pub use defaults::defaults;
pub use outputs::outputs;
pub use resolve::{ResolveArgs, resolve};

//! Frame preprocessors.

pub mod flipper;
pub mod resizer;

pub use flipper::{FlipDirection, Flipper};
pub use resizer::{Resizer, TargetSize};

pub mod engine;
pub mod state;

pub use engine::{decide, Decision, Turn};
pub use state::{SessionState, Terms};

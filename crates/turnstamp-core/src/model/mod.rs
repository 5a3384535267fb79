pub mod stamp;
pub mod transcript;

pub use transcript::{normalize, Role, Turn, TurnHeader};

pub mod traits;
pub mod types;
pub mod session;

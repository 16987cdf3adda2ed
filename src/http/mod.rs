mod client;
mod executor;


pub use client::build_client;
pub use executor::{ErrorKind, RequestOutcome, execute};

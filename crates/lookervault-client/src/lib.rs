mod client;
mod convert;
mod error;
mod params;

pub use client::{HttpLookerClient, LookerClient};
pub use error::ClientError;
pub use params::{IterateParams, SelfInfo};

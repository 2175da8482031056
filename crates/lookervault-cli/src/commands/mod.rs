pub mod extract;
pub mod restore;
pub mod snapshot;

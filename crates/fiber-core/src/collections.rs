#[cfg(feature = "std-hash")]
pub mod map {
    pub use std::collections::HashSet;
}

#[cfg(not(feature = "std-hash"))]
pub mod map {
    pub use hashbrown::HashSet;
}

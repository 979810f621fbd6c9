mod main;
mod reconcile;

pub use main::*;
pub use reconcile::*;

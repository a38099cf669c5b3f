pub mod admin;
pub mod grids;
pub mod ledger;
pub mod live;
pub mod system;

pub use admin::*;
pub use grids::*;
pub use ledger::*;
pub use live::*;
pub use system::*;

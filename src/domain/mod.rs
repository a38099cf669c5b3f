pub mod audit;
pub mod caller;
pub mod game;
pub mod grid;
pub mod mutation;
pub mod quarter;
pub mod settings;
pub mod square;
pub mod state;

pub use audit::*;
pub use caller::*;
pub use game::*;
pub use grid::*;
pub use mutation::*;
pub use quarter::*;
pub use settings::*;
pub use square::*;
pub use state::*;

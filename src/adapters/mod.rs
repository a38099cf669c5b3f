pub mod api_server;
pub mod espn;
pub mod memory;
pub mod postgres;

pub use api_server::{build_state, open_store, start_api_server};
pub use espn::{EspnScoreFeed, DEFAULT_SCOREBOARD_URL};
pub use memory::MemoryStore;
pub use postgres::PostgresStore;

pub mod live_sync;
pub mod pool;

pub use live_sync::{eligible_patch, LiveFetchResult, LiveScoreSync, LiveSyncConfig, SyncReport};
pub use pool::{BulkPaidReport, GridView, MySquare, MySquares, PoolEvent, PoolService, SquareView};

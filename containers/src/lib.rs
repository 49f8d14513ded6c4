pub mod block;
pub mod height;
pub mod record;
pub mod version;

pub use block::{Block, Transaction};
pub use height::Height;
pub use record::{BlockRecord, BlockSource, HeightCount};
pub use version::Version;

pub mod block;
pub mod dispatch;
pub mod flatten;
pub mod position;
pub mod reducer;

pub use block::{Block, BlockView, Outline};
pub use dispatch::{Editor, Effect, Gesture, Outcome};
pub use flatten::{flatten, rebuild};
pub use position::PositionAllocator;
pub use reducer::{reduce, Action};

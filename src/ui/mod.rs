pub mod icons;
pub mod lineage;
pub mod live;
pub mod timeline;

pub use lineage::{render_checkpoints, render_lineage};
pub use live::{WatchUI, render_ghosts, render_status_line};
pub use timeline::{render_cost_summary, render_timeline};

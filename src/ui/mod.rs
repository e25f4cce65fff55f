pub mod icons;
pub mod output;
pub mod table;
pub mod theme;

pub use icons::Icons;
pub use output::{dim, header, info, muted, section, status, success, summary_row, warn};
pub use table::{StepRow, TableBuilder, stats_table, steps_table};
pub use theme::{theme, Theme};

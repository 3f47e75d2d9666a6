pub mod columns;
pub mod spread;

pub use columns::{check_split, infer_columns, plan_columns, ColumnPlan, SplitRejection};
pub use spread::{decide_spread, refine_gutter, split_spread};

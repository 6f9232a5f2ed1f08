pub mod columns;
pub mod status;
pub mod task;

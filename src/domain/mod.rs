pub mod answers;
pub mod models;
pub mod survey;

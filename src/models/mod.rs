pub mod ban;
pub mod credential;

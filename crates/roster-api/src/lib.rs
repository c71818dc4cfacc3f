pub mod admin;
pub mod error;
pub mod files;
pub mod groups;
pub mod members;
pub mod session;
pub mod state;
pub mod storage;

#[cfg(test)]
pub(crate) mod testing;

pub mod auth;
pub mod conversations;
pub mod error;
pub mod extract;
pub mod favorites;
pub mod listings;
pub mod media;
pub mod messages;
pub mod middleware;
pub mod reports;
pub mod router;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;

pub mod auth;
pub mod client;
pub mod models;

mod player;
mod playlists;
mod user;

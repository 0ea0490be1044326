//! Terminal client of the wordbook API.
//!
//! The quiz engine and the screen renderers are pure and independent of the network,
//! only [`client`] and the interactive loop in [`views`] talk to the server.

pub mod client;
pub mod quiz;
pub mod views;

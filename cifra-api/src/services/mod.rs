//! Entity operations over the data-access gateway

pub mod song;

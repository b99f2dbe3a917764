//! Channel adapters. The core depends only on
//! [`sa_registry::ChannelHandle`] resolved by `channel.<name>`; this
//! module holds the concrete adapters registered under that pattern.

pub mod cli;

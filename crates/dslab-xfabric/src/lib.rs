#![doc = include_str!("../README.md")]

pub mod allocator;
pub mod arrivals;
pub mod config;
pub mod distribution;
pub mod engine;
pub mod error;
pub mod events;
pub mod experiment;
pub mod flow;
pub mod monitoring;
pub mod network;
pub mod queue;
pub mod tracker;
pub mod weights;

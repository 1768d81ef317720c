//! Core types for DriveSense

pub mod action;
pub mod context;
pub mod event;
pub mod suggestion;

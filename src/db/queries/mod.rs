//! Database queries

pub mod customer;

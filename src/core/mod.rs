//! Policy engine internals
//!
//! Components, leaves first: [`context`], [`marker`], [`expression`],
//! [`condition`], [`policy`], [`manager`].

pub mod condition;
pub mod context;
pub mod expression;
pub mod manager;
pub mod marker;
pub mod policy;
pub mod resource;
pub mod verdict;

//! Ports layer (Hexagonal Architecture)

pub mod outbound;

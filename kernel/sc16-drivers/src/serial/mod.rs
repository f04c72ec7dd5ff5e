//! Serial drivers.

pub mod sc16is7x2;

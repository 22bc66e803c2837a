//! Integration tests for the unit lifecycle
//!
//! Tests are organized by the story they tell:
//!
//! - `unit_lifecycle`: a unit is provisioned, observed and reclaimed, and
//!   cleanup stays scoped to the unit it was asked about

mod helpers;
mod unit_lifecycle;

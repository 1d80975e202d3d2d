pub mod categories;
pub mod crime;
pub mod outcomes;

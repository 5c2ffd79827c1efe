pub mod gallery;
pub mod reservations;
pub mod weather;

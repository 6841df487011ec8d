pub mod controller;
pub mod demo;

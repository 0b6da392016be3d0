pub mod controller;
pub mod persist;
pub mod repository;
pub mod service;
pub mod store;
pub mod title;

//! Database migrations for the Safekeep backup service

pub use sea_orm_migration::prelude::*;

mod migration;

pub use migration::Migrator;

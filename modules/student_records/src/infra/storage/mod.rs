pub mod admin_directory;
pub mod admin_entity;
pub mod entity;
pub mod mapper;
pub mod migrations;
pub mod sea_orm_repo;

pub use admin_directory::SeaOrmAdminDirectory;
pub use migrations::Migrator;
pub use sea_orm_repo::SeaOrmStudentsRepository;

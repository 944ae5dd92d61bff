pub mod aggregate;
pub mod config;
pub mod dashboard;
pub mod frame;
pub mod game_key;
pub mod http_cache;
pub mod impute;
pub mod ingest;
pub mod logging;
pub mod prepare;
pub mod provider;
pub mod qb;
pub mod rolling;
pub mod rosters;
pub mod schema;
pub mod scoring;
pub mod table_io;
pub mod teams;
pub mod top_n;

pub mod db;
pub mod id_gen;
pub mod redis;

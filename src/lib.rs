pub mod config;
pub mod db;
pub mod emit;
pub mod input;
pub mod segmenter;

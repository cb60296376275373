pub mod app;
pub mod audio;
pub mod config;
pub mod error;
pub mod karaoke;
pub mod library;
pub mod model;
pub mod playlist;
pub mod queue;
pub mod shuffle;
pub mod stats;
pub mod stems;

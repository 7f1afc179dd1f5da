//! Text codecs over streams of chunks

pub mod csv;

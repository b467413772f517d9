pub mod error;
pub mod ffmpeg_backend;
pub mod jpeg;
pub mod recovery;
pub mod session;
pub mod settings;
pub mod stream;
pub mod test_pattern;
pub mod traits;

#[cfg(test)]
pub mod fake;

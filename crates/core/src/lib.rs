pub mod camera;
pub mod detection;
pub mod pipeline;
pub mod shared;
pub mod verification;

#[cfg(test)]
pub(crate) mod testing;
